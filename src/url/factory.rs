//! Matcher factory: the type registry and process-wide URL settings.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::schema::UrlConfig;
use crate::url::error::{PatternError, PatternResult};
use crate::url::matcher::{MatcherConfig, UrlMatcher};
use crate::url::types::{builtin_types, ParamType};

/// Compiles patterns against a shared set of parameter types.
#[derive(Debug)]
pub struct UrlMatcherFactory {
    types: DashMap<String, Arc<ParamType>>,
    settings: UrlConfig,
}

impl UrlMatcherFactory {
    pub fn new(settings: UrlConfig) -> Self {
        let types: HashMap<_, _> = builtin_types();
        Self {
            types: types.into_iter().collect(),
            settings,
        }
    }

    pub fn settings(&self) -> &UrlConfig {
        &self.settings
    }

    /// Register a custom parameter type. Names are unique, built-ins included.
    pub fn register_type(&self, param_type: ParamType) -> PatternResult<()> {
        let name = param_type.name().to_string();
        if self.types.contains_key(&name) {
            return Err(PatternError::DuplicateType(name));
        }
        tracing::debug!(type_name = %name, "Registered parameter type");
        self.types.insert(name, Arc::new(param_type));
        Ok(())
    }

    pub fn get_type(&self, name: &str) -> Option<Arc<ParamType>> {
        self.types.get(name).map(|t| t.value().clone())
    }

    /// Compile a pattern with the factory defaults.
    pub fn compile(&self, pattern: &str) -> PatternResult<UrlMatcher> {
        self.compile_with(pattern, &MatcherConfig::default())
    }

    pub fn compile_with(&self, pattern: &str, config: &MatcherConfig) -> PatternResult<UrlMatcher> {
        UrlMatcher::new(pattern, config, None, self)
    }
}

impl Default for UrlMatcherFactory {
    fn default() -> Self {
        Self::new(UrlConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_custom_type() {
        let factory = UrlMatcherFactory::default();
        let upper = ParamType::new("upper", "[A-Z]+")
            .unwrap()
            .with_is(|v| v.as_str().map_or(false, |s| s.chars().all(|c| c.is_ascii_uppercase())));
        factory.register_type(upper).unwrap();

        let matcher = factory.compile("/code/{code:upper}").unwrap();
        assert!(matcher.exec("/code/ABC", &Default::default()).is_some());
        assert!(matcher.exec("/code/abc", &Default::default()).is_none());
        assert_eq!(
            matcher.format(&[("code".to_string(), json!("XY"))].into_iter().collect()),
            Some("/code/XY".to_string())
        );
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let factory = UrlMatcherFactory::default();
        let err = factory
            .register_type(ParamType::new("int", r"\d+").unwrap())
            .unwrap_err();
        assert_eq!(err, PatternError::DuplicateType("int".into()));
    }
}
