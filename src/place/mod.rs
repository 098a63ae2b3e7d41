//! Place tree.
//!
//! # Data Flow
//! ```text
//! PlaceDefinition
//!     → registry.rs (name checks, queue until the parent exists)
//!     → place.rs (derivation: parent → data → url → navigable → own params
//!                 → params → views → path → includes; plans studied)
//!     → Arc<Place> stored by name and as a URL rule
//! ```
//!
//! # Design Decisions
//! - The root is implicit, abstract and always active
//! - A child's parameter set is always a superset of its parent's
//! - Registration errors are returned synchronously

pub mod definition;
pub mod error;
pub mod glob;
pub mod place;
pub mod registry;
pub mod template;

pub use definition::{Hook, HookContext, PlaceDefinition, ViewDeclaration};
pub use error::{RegistrationError, RegistrationResult};
pub use place::{Place, PlaceLocals, View, ViewLocals, PARAMS_KEY, TEMPLATE_KEY};
pub use registry::PlaceRegistry;
pub use template::{FileTemplates, InlineTemplates, TemplateLoader, TemplateRequest};
