//! Observability setup for the authorization services
//!
//! - `init_tracing` installs the global `tracing` subscriber (pretty or JSON)
//! - `CacheMetricsExporter` samples cache counters into the `metrics` facade
//! - `install_prometheus_recorder` exposes those metrics for scraping
//!
//! # Example
//!
//! ```rust
//! use telemetry::{init_tracing, LogConfig, LogFormat};
//!
//! init_tracing(&LogConfig {
//!     level: "info,spicedb=debug".to_string(),
//!     format: LogFormat::Json,
//! })
//! .ok();
//! tracing::info!("ready");
//! ```

pub mod error;
pub mod logging;
pub mod metrics;

pub use crate::metrics::{install_prometheus_recorder, record, CacheMetricsExporter};
pub use error::*;
pub use logging::*;
