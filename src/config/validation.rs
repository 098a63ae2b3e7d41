//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (places reference declared parents)
//! - Validate value ranges (event capacity > 0, known log levels)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use serde_json::Value;
use thiserror::Error;

use crate::config::schema::RouterConfig;
use crate::observability::logging::is_valid_level;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("place '{0}' is declared more than once")]
    DuplicatePlace(String),

    #[error("invalid place name '{0}'")]
    InvalidPlaceName(String),

    #[error("place '{place}' references unknown parent '{parent}'")]
    UnknownParent { place: String, parent: String },

    #[error("view '{view}' of place '{place}' has no template or template_url")]
    ViewWithoutTemplate { place: String, view: String },

    #[error("data of place '{0}' must be a table")]
    DataNotObject(String),

    #[error("invalid log level '{0}'")]
    InvalidLogLevel(String),

    #[error("transitions.event_capacity must be greater than zero")]
    ZeroEventCapacity,
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !is_valid_level(&config.observability.log_level) {
        errors.push(ValidationError::InvalidLogLevel(
            config.observability.log_level.clone(),
        ));
    }
    if config.transitions.event_capacity == 0 {
        errors.push(ValidationError::ZeroEventCapacity);
    }

    let mut seen = HashSet::new();
    for place in &config.places {
        if place.name.is_empty() || place.name.contains('@') {
            errors.push(ValidationError::InvalidPlaceName(place.name.clone()));
        } else if !seen.insert(place.name.as_str()) {
            errors.push(ValidationError::DuplicatePlace(place.name.clone()));
        }
    }

    for place in &config.places {
        let parent = place.to_definition().parent_name();
        if !parent.is_empty() && !seen.contains(parent.as_str()) {
            errors.push(ValidationError::UnknownParent {
                place: place.name.clone(),
                parent,
            });
        }
        for (view, declared) in &place.views {
            if declared.template.is_none() && declared.template_url.is_none() {
                errors.push(ValidationError::ViewWithoutTemplate {
                    place: place.name.clone(),
                    view: view.clone(),
                });
            }
        }
        if let Some(data) = &place.data {
            if !matches!(data, Value::Object(_)) {
                errors.push(ValidationError::DataNotObject(place.name.clone()));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
