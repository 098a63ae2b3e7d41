//! URL subsystem: pattern matching and typed parameters.
//!
//! # Data Flow
//! ```text
//! Pattern string + MatcherConfig
//!     → factory.rs (type registry, settings)
//!     → matcher.rs (placeholders → regex + ParamSet)
//!     → param.rs (per-parameter default, array, squash, replace)
//!     → types.rs (codec: is / encode / decode / equals)
//!
//! Incoming URL:  exec_url → exec → typed Params
//! Outgoing URL:  Params → validates → format → string
//! ```
//!
//! # Design Decisions
//! - Patterns compile once, at place registration
//! - Encode/decode is bijective for valid values (`/` in strings becomes `~2F`)
//! - Child matchers share parameter objects with their parent

pub mod encoding;
pub mod error;
pub mod factory;
pub mod matcher;
pub mod param;
pub mod types;

pub use error::{PatternError, PatternResult};
pub use factory::UrlMatcherFactory;
pub use matcher::{MatcherConfig, UrlMatcher};
pub use param::{
    DefaultValue, Location, Param, ParamConfig, ParamDeclaration, ParamSet, Params, Replacement,
    Squash,
};
pub use types::{ArrayMode, Codec, ParamType};
