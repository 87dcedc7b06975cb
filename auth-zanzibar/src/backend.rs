//! Graph backend protocol.
//!
//! Request/response shapes mirror a SpiceDB-style permissions service: a
//! relationship write/delete API, single and bulk permission checks, and a
//! streaming resource lookup. Implementations return `tonic::Status` so a
//! gRPC client can surface backend failures verbatim.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectReference {
    pub object_type: String,
    pub object_id: String,
}

impl ObjectReference {
    pub fn new(object_type: &str, object_id: &str) -> Self {
        Self {
            object_type: object_type.to_string(),
            object_id: object_id.to_string(),
        }
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.object_id)
    }
}

/// Subject of a relationship. An empty `optional_relation` means the object
/// itself rather than a userset on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectReference {
    pub object: ObjectReference,
    pub optional_relation: String,
}

impl SubjectReference {
    pub fn new(object_type: &str, object_id: &str) -> Self {
        Self {
            object: ObjectReference::new(object_type, object_id),
            optional_relation: String::new(),
        }
    }
}

impl fmt::Display for SubjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.optional_relation.is_empty() {
            write!(f, "{}", self.object)
        } else {
            write!(f, "{}#{}", self.object, self.optional_relation)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub resource: ObjectReference,
    pub relation: String,
    pub subject: SubjectReference,
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.resource, self.relation, self.subject)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOperation {
    Create,
    /// Upsert: refreshes an existing edge instead of failing.
    Touch,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipUpdate {
    pub operation: UpdateOperation,
    pub relationship: Relationship,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRelationshipsRequest {
    pub updates: Vec<RelationshipUpdate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRelationshipsResponse {
    pub written_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectFilter {
    pub subject_type: String,
    pub optional_subject_id: String,
}

/// Empty optional fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipFilter {
    pub resource_type: String,
    pub optional_resource_id: String,
    pub optional_relation: String,
    pub optional_subject_filter: Option<SubjectFilter>,
}

impl RelationshipFilter {
    pub fn matches(&self, relationship: &Relationship) -> bool {
        if relationship.resource.object_type != self.resource_type {
            return false;
        }
        if !self.optional_resource_id.is_empty()
            && relationship.resource.object_id != self.optional_resource_id
        {
            return false;
        }
        if !self.optional_relation.is_empty() && relationship.relation != self.optional_relation {
            return false;
        }
        if let Some(ref subject) = self.optional_subject_filter {
            if relationship.subject.object.object_type != subject.subject_type {
                return false;
            }
            if !subject.optional_subject_id.is_empty()
                && relationship.subject.object.object_id != subject.optional_subject_id
            {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRelationshipsRequest {
    pub relationship_filter: RelationshipFilter,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRelationshipsResponse {
    pub deleted_at: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Consistency {
    #[default]
    MinimizeLatency,
    FullyConsistent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permissionship {
    Unspecified,
    NoPermission,
    HasPermission,
    ConditionalPermission,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckPermissionRequest {
    pub consistency: Consistency,
    pub resource: ObjectReference,
    pub permission: String,
    pub subject: SubjectReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckPermissionResponse {
    pub permissionship: Permissionship,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckBulkPermissionsRequestItem {
    pub resource: ObjectReference,
    pub permission: String,
    pub subject: SubjectReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckBulkPermissionsRequest {
    pub consistency: Consistency,
    pub items: Vec<CheckBulkPermissionsRequestItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckBulkPermissionsResult {
    Item { permissionship: Permissionship },
    Error { code: i32, message: String },
}

/// One answered item; the backend echoes the request it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckBulkPermissionsPair {
    pub request: CheckBulkPermissionsRequestItem,
    pub response: CheckBulkPermissionsResult,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckBulkPermissionsResponse {
    pub pairs: Vec<CheckBulkPermissionsPair>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupResourcesRequest {
    pub consistency: Consistency,
    pub resource_object_type: String,
    pub permission: String,
    pub subject: SubjectReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupResourcesResponse {
    pub resource_object_id: String,
}

pub type LookupResourcesStream = BoxStream<'static, Result<LookupResourcesResponse, tonic::Status>>;

/// Client for the remote permissions service.
///
/// Implementations must be safe for concurrent multiplexed calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GraphClient: Send + Sync {
    async fn write_relationships(
        &self,
        request: WriteRelationshipsRequest,
    ) -> Result<WriteRelationshipsResponse, tonic::Status>;

    async fn delete_relationships(
        &self,
        request: DeleteRelationshipsRequest,
    ) -> Result<DeleteRelationshipsResponse, tonic::Status>;

    async fn check_permission(
        &self,
        request: CheckPermissionRequest,
    ) -> Result<CheckPermissionResponse, tonic::Status>;

    async fn check_bulk_permissions(
        &self,
        request: CheckBulkPermissionsRequest,
    ) -> Result<CheckBulkPermissionsResponse, tonic::Status>;

    async fn lookup_resources(
        &self,
        request: LookupResourcesRequest,
    ) -> Result<LookupResourcesStream, tonic::Status>;
}
