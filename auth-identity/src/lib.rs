//! Group lifecycle and identity lookups for the authorization services
//!
//! This module provides:
//! - Group and user records with free-form metadata
//! - Repository and user-lookup capabilities with in-memory implementations
//! - A cost-bounded cache and a read-through slug repository on top of it
//! - `GroupService`, which links new groups to their organization in the
//!   relation graph and emits audit events
//!
//! # Example
//!
//! ```rust
//! use audit_engine::{ActivityLogger, AuditConfig, AuditDispatcher, TracingAuditSink};
//! use auth_identity::{Group, GroupService, InMemoryGroupRepository, InMemoryUserService, RequestContext, User};
//! use auth_zanzibar::{InMemoryGraphClient, RelationStore};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let graph = InMemoryGraphClient::from_namespaces(&auth_zanzibar::predefined_system_namespaces())?;
//! let users = InMemoryUserService::new();
//! users.insert(User::new("u1", "Alice", "alice@example.com"));
//!
//! let audit = AuditDispatcher::start(
//!     &AuditConfig::default(),
//!     Arc::new(ActivityLogger::new(TracingAuditSink)),
//! );
//! let service = GroupService::new(
//!     Arc::new(InMemoryGroupRepository::new()),
//!     Arc::new(RelationStore::new(Arc::new(graph))),
//!     Arc::new(users),
//!     Arc::new(audit),
//! );
//!
//! let ctx = RequestContext::new("req-1").with_email("alice@example.com");
//! let group = service.create(&ctx, &Group::new("Platform", "platform", "org-1")).await?;
//! assert_eq!(service.get("platform").await?.id, group.id);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cached_repository;
pub mod error;
pub mod models;
pub mod repository;
pub mod service;

pub use cache::{CacheConfig, CacheMetrics, CacheValue, Cacheable, InMemoryCache};
pub use cached_repository::{
    CachedGroupRepository, CachedRepository, CachedSlugRepository, SlugSource, GROUP_KEY_PREFIX,
};
pub use error::*;
pub use models::*;
pub use repository::*;
pub use service::*;
