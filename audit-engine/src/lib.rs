//! Activity audit logging for the authorization services
//!
//! This crate provides best-effort audit capabilities:
//! - An `ActivityService` capability turning actions into audit entries
//! - Pluggable sinks (tracing/stdout, in-memory, no-op)
//! - A bounded worker pool that delivers events off the request path
//! - A dead-letter log for events that cannot be queued
//!
//! Audit logging is never transactional with the operation it records:
//! failures are logged and never reach the caller.
//!
//! # Example
//!
//! ```rust
//! use audit_engine::{ActivityLogger, AuditConfig, AuditDispatcher, TracingAuditSink};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let logger = Arc::new(ActivityLogger::new(TracingAuditSink));
//!     let dispatcher = AuditDispatcher::start(&AuditConfig::default(), logger);
//!
//!     dispatcher.log("group.create", "actor-id", json!({ "entity": "group", "id": "g1" }));
//!
//!     dispatcher.shutdown().await;
//! }
//! ```

pub mod dispatcher;
pub mod entry;
pub mod error;
pub mod service;

pub use dispatcher::*;
pub use entry::*;
pub use error::*;
pub use service::*;
