//! Waypoint: a hierarchical place router.
//!
//! Places form a tree. Each place may carry a URL fragment, typed parameters,
//! asynchronous dependencies and views. The router moves between places with
//! cancellable transitions that keep the shared, unchanged prefix of the tree.

pub mod config;
pub mod observability;
pub mod place;
pub mod resolve;
pub mod transition;
pub mod url;

pub use config::{load_config, RouterConfig};
pub use place::{Place, PlaceDefinition, ViewDeclaration};
pub use resolve::{Invocable, Services};
pub use transition::{
    HrefOptions, LocationMode, Reload, Router, RouterEvent, TransitionError, TransitionOptions,
};
pub use url::{ParamConfig, ParamType, Params, UrlMatcher, UrlMatcherFactory};
