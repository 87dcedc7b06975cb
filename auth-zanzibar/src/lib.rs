//! Zanzibar-style relationship authorization core
//!
//! This crate provides the graph side of the authorization subsystem:
//! - A schema compiler turning namespace/role/permission models into
//!   backend schema definitions
//! - A relation store adapter translating domain relation operations into
//!   graph backend protocol calls with explicit consistency semantics
//! - An in-memory graph backend implementing the same protocol for
//!   development and tests
//!
//! # Core Concepts
//!
//! - **Namespace**: a type of object with roles (who may hold them) and
//!   permissions (which roles grant them)
//! - **Object**: an instance of a namespace (e.g. `group:g1`)
//! - **Subject**: a principal holding a role on an object; group subjects
//!   are linked through their `membership` permission
//! - **Relationship**: the backend edge `resource#relation@subject`
//!
//! # Example
//!
//! ```rust
//! use auth_zanzibar::{
//!     predefined_system_namespaces, AuthzRepository, InMemoryGraphClient, Object, RelationStore,
//!     RelationV2, Subject,
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let client = InMemoryGraphClient::from_namespaces(&predefined_system_namespaces()).unwrap();
//! let store = RelationStore::new(Arc::new(client));
//!
//! let membership = RelationV2::new(Object::new("group", "g1"), Subject::user("alice", "group:member"));
//! store.add_v2(&membership).await.unwrap();
//!
//! let ids = store.lookup_resources("group", "membership", "user", "alice").await.unwrap();
//! assert_eq!(ids, vec!["g1"]);
//! # }
//! ```

pub mod backend;
pub mod check;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod repository;
pub mod schema;
pub mod store;

pub use backend::GraphClient;
pub use compiler::{compile, generate_schema, Definition};
pub use config::{namespaces_from_resource_config, parse_config_yaml, ResourceConfig};
pub use engine::InMemoryGraphClient;
pub use error::*;
pub use models::*;
pub use schema::*;
pub use store::{AuthzRepository, RelationStore};
