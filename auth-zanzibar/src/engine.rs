use crate::{
    backend::*,
    check::PermissionChecker,
    compiler::{compile, Definition},
    error::{SchemaError, ZanzibarError},
    repository::{InMemoryRelationshipRepository, RelationshipRepository},
    schema::NamespaceConfigMap,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// In-process graph backend speaking the same protocol as the remote
/// permissions service. Used for development and tests.
pub struct InMemoryGraphClient {
    /// Storage for relationships
    repository: Arc<dyn RelationshipRepository>,

    /// Compiled schema, keyed by definition name
    definitions: Arc<HashMap<String, Definition>>,

    /// Permission checker for authorization queries
    checker: Arc<PermissionChecker>,

    /// Monotonic revision handed out as the write token
    revision: AtomicU64,
}

impl InMemoryGraphClient {
    pub fn new(definitions: Vec<Definition>) -> Self {
        Self::with_repository(Arc::new(InMemoryRelationshipRepository::new()), definitions)
    }

    pub fn with_repository(
        repository: Arc<dyn RelationshipRepository>,
        definitions: Vec<Definition>,
    ) -> Self {
        let definitions: Arc<HashMap<String, Definition>> = Arc::new(
            definitions
                .into_iter()
                .map(|definition| (definition.name.clone(), definition))
                .collect(),
        );
        let checker = Arc::new(PermissionChecker::new(
            repository.clone(),
            definitions.clone(),
        ));

        Self {
            repository,
            definitions,
            checker,
            revision: AtomicU64::new(0),
        }
    }

    /// Compile the namespaces and serve them.
    pub fn from_namespaces(namespaces: &NamespaceConfigMap) -> Result<Self, SchemaError> {
        let definitions = compile(namespaces)?;
        info!(definitions = definitions.len(), "Loaded in-memory graph schema");
        Ok(Self::new(definitions))
    }

    pub fn definitions(&self) -> impl Iterator<Item = &Definition> {
        self.definitions.values()
    }

    fn next_revision(&self) -> String {
        (self.revision.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn current_revision(&self) -> String {
        self.revision.load(Ordering::SeqCst).to_string()
    }

    /// Reject relationships the schema does not allow.
    fn validate_relationship(&self, relationship: &Relationship) -> Result<(), tonic::Status> {
        let resource_type = &relationship.resource.object_type;
        let definition = self.definitions.get(resource_type).ok_or_else(|| {
            tonic::Status::failed_precondition(format!(
                "object definition `{}` not found",
                resource_type
            ))
        })?;

        let relation = definition.relation(&relationship.relation).ok_or_else(|| {
            tonic::Status::failed_precondition(format!(
                "relation `{}` not found under definition `{}`",
                relationship.relation, resource_type
            ))
        })?;

        let subject = &relationship.subject;
        let subject_relation = if subject.optional_relation.is_empty() {
            None
        } else {
            Some(subject.optional_relation.as_str())
        };
        if !relation.allows(&subject.object.object_type, subject_relation) {
            return Err(tonic::Status::invalid_argument(format!(
                "subjects of type `{}` are not allowed on relation `{}#{}`",
                subject, resource_type, relationship.relation
            )));
        }

        Ok(())
    }

    async fn check_one(
        &self,
        resource: &ObjectReference,
        permission: &str,
        subject: &SubjectReference,
    ) -> Result<Permissionship, tonic::Status> {
        let allowed = self
            .checker
            .check(resource, permission, subject)
            .await
            .map_err(to_status)?;

        Ok(if allowed {
            Permissionship::HasPermission
        } else {
            Permissionship::NoPermission
        })
    }
}

fn to_status(err: ZanzibarError) -> tonic::Status {
    match err {
        ZanzibarError::InvalidDetail(msg) | ZanzibarError::InvalidRelation(msg) => {
            tonic::Status::failed_precondition(msg)
        }
        ZanzibarError::MaxRecursionDepthExceeded => {
            tonic::Status::resource_exhausted("max depth exceeded")
        }
        ZanzibarError::Backend(status) => status,
        other => tonic::Status::internal(other.to_string()),
    }
}

#[async_trait]
impl GraphClient for InMemoryGraphClient {
    async fn write_relationships(
        &self,
        request: WriteRelationshipsRequest,
    ) -> Result<WriteRelationshipsResponse, tonic::Status> {
        // Validate the whole batch before touching storage
        for update in &request.updates {
            self.validate_relationship(&update.relationship)?;
            if update.operation == UpdateOperation::Create
                && self
                    .repository
                    .exists(&update.relationship)
                    .await
                    .map_err(to_status)?
            {
                return Err(tonic::Status::already_exists(format!(
                    "relationship `{}` already exists",
                    update.relationship
                )));
            }
        }

        for update in request.updates {
            debug!(operation = ?update.operation, relationship = %update.relationship, "Applying update");
            match update.operation {
                UpdateOperation::Create | UpdateOperation::Touch => {
                    self.repository
                        .insert(update.relationship)
                        .await
                        .map_err(to_status)?;
                }
                UpdateOperation::Delete => {
                    self.repository
                        .remove(&update.relationship)
                        .await
                        .map_err(to_status)?;
                }
            }
        }

        Ok(WriteRelationshipsResponse {
            written_at: self.next_revision(),
        })
    }

    async fn delete_relationships(
        &self,
        request: DeleteRelationshipsRequest,
    ) -> Result<DeleteRelationshipsResponse, tonic::Status> {
        let filter = &request.relationship_filter;
        if !self.definitions.contains_key(&filter.resource_type) {
            return Err(tonic::Status::failed_precondition(format!(
                "object definition `{}` not found",
                filter.resource_type
            )));
        }

        // Deleting nothing is not an error
        let removed = self
            .repository
            .remove_matching(filter)
            .await
            .map_err(to_status)?;
        debug!(removed, resource_type = %filter.resource_type, "Deleted relationships");

        Ok(DeleteRelationshipsResponse {
            deleted_at: self.next_revision(),
        })
    }

    async fn check_permission(
        &self,
        request: CheckPermissionRequest,
    ) -> Result<CheckPermissionResponse, tonic::Status> {
        let permissionship = self
            .check_one(&request.resource, &request.permission, &request.subject)
            .await?;

        Ok(CheckPermissionResponse { permissionship })
    }

    async fn check_bulk_permissions(
        &self,
        request: CheckBulkPermissionsRequest,
    ) -> Result<CheckBulkPermissionsResponse, tonic::Status> {
        let mut pairs = Vec::with_capacity(request.items.len());

        for item in request.items {
            let response = match self
                .check_one(&item.resource, &item.permission, &item.subject)
                .await
            {
                Ok(permissionship) => CheckBulkPermissionsResult::Item { permissionship },
                Err(status) => CheckBulkPermissionsResult::Error {
                    code: status.code() as i32,
                    message: status.message().to_string(),
                },
            };
            pairs.push(CheckBulkPermissionsPair {
                request: item,
                response,
            });
        }

        Ok(CheckBulkPermissionsResponse { pairs })
    }

    async fn lookup_resources(
        &self,
        request: LookupResourcesRequest,
    ) -> Result<LookupResourcesStream, tonic::Status> {
        let definition = self
            .checker
            .definition(&request.resource_object_type)
            .map_err(to_status)?;
        if !definition.has_member(&request.permission) {
            return Err(tonic::Status::failed_precondition(format!(
                "relation or permission `{}` not found under definition `{}`",
                request.permission, request.resource_object_type
            )));
        }

        let candidates = self
            .repository
            .resource_ids(&request.resource_object_type)
            .await
            .map_err(to_status)?;

        let mut results = Vec::new();
        for object_id in candidates {
            let resource = ObjectReference::new(&request.resource_object_type, &object_id);
            match self
                .check_one(&resource, &request.permission, &request.subject)
                .await
            {
                Ok(Permissionship::HasPermission) => results.push(Ok(LookupResourcesResponse {
                    resource_object_id: object_id,
                })),
                Ok(_) => {}
                Err(status) => {
                    results.push(Err(status));
                    break;
                }
            }
        }
        debug!(revision = %self.current_revision(), found = results.len(), "Lookup resources");

        Ok(futures::stream::iter(results).boxed())
    }
}
