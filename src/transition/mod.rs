//! Transition engine.
//!
//! # Data Flow
//! ```text
//! go_to(target, params, options)
//!     → find target (not-found observers may prevent, rewrite or defer)
//!     → abstract check → inherit → validate → normalize
//!     → keep-point (shared prefix with equal own params, bounded by reload)
//!     → no-op? commit parameters only
//!     → start observers (may prevent)
//!     → claim sequence number, spawn:
//!         resolve entered places root-to-leaf, views after their place
//!         → still current? exit leaf-to-root, enter root-to-leaf
//!         → store active, sync location, notify success
//! ```
//!
//! # Design Decisions
//! - The active place lives in an `ArcSwap`; readers never block
//! - A transition is current while its sequence number is stored; any newer
//!   request replaces it, so stale transitions settle as superseded
//! - Passive notifications go out on a broadcast channel, active ones
//!   (prevent, redirect) through `TransitionObserver`

pub mod error;
pub mod events;
pub mod handle;
pub mod location;
pub mod options;
pub mod router;

pub use error::{TransitionError, TransitionResult};
pub use events::{
    NotFoundDecision, PlaceRef, Redirect, RouterEvent, StartDecision, TransitionInfo,
    TransitionObserver,
};
pub use handle::TransitionHandle;
pub use location::{LocationSync, MemoryLocation};
pub use options::{HrefOptions, LocationMode, Reload, TransitionOptions};
pub use router::Router;
