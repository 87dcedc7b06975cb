//! Configuration loading for the authorization services
//!
//! `AppConfig` gathers the graph backend connection, cache, audit pool and
//! logging sections. Values come from an optional YAML file and are
//! overridden by `REBAC__`-prefixed environment variables, with `__`
//! separating nested keys (`REBAC__CACHE__MAX_COST=2048`). Missing sections
//! and fields fall back to their defaults.
//!
//! # Example
//!
//! ```rust
//! use config_engine::AppConfig;
//!
//! let config = AppConfig::from_yaml_str("spicedb:\n  host: spicedb.internal\n").unwrap();
//! assert_eq!(config.spicedb.endpoint(), "spicedb.internal:50051");
//! ```

pub mod engine;
pub mod error;

pub use engine::*;
pub use error::*;
