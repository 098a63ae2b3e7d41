//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Registry, resolver and transition engine produce:
//!     → logging.rs (structured tracing events, subscriber setup)
//!     → metrics.rs (counters, gauges, histograms via the `metrics` facade)
//!
//! Consumers:
//!     → stdout (fmt layer, filtered by RUST_LOG or the configured level)
//!     → whatever metrics recorder the host application installs
//! ```
//!
//! # Design Decisions
//! - The library never installs a recorder or exporter itself
//! - Every transition event carries its transition id
//! - Metrics are cheap no-ops when no recorder is installed

pub mod logging;
pub mod metrics;
