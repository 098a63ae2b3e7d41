//! Dependency resolver.
//!
//! # Data Flow
//! ```text
//! Invocables (name → ByName | Function{deps, body})
//!     → plan.rs::study (three-colour DFS, cycle check, topological order)
//!     → Plan (immutable, stored on the place)
//!
//! Plan::resolve(locals, parent, context, services)
//!     → one Shared future per producer, started eagerly
//!     → resolution.rs (record: handles + known values + failure cell)
//!     → Resolution (await → flat name → value map)
//! ```
//!
//! # Design Decisions
//! - Precedence: local > sibling > inherited > services
//! - First failure wins; a failed parent fails the child without running it
//! - Every producer receives an explicit `InvokeContext`

pub mod error;
pub mod invocable;
pub mod plan;
pub mod resolution;

pub use error::{BoxError, CycleError, ResolveError, ResolveResult};
pub use invocable::{Deps, Invocable, Invocables, InvokeContext, ProducerFn, Services, Values};
pub use plan::{study, Plan};
pub use resolution::{Resolution, ResolutionRecord};
