//! Relation store adapter.
//!
//! Translates domain relation operations into graph backend calls. Writes
//! use TOUCH so they are idempotent, every read is fully consistent, and
//! backend errors are surfaced as-is. The adapter holds no state besides
//! the client handle.

use crate::backend::{
    CheckBulkPermissionsRequest, CheckBulkPermissionsRequestItem, CheckBulkPermissionsResult,
    CheckPermissionRequest, Consistency, DeleteRelationshipsRequest, GraphClient,
    LookupResourcesRequest, Permissionship, Relationship, RelationshipFilter, RelationshipUpdate,
    SubjectFilter, SubjectReference, UpdateOperation, WriteRelationshipsRequest,
};
use crate::error::{Result, ZanzibarError};
use crate::models::{Action, Permission, Relation, RelationV2};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info_span, Instrument};

/// Product name tagged on every backend span.
pub const STORE_PRODUCT_NAME: &str = "spicedb";

/// Relation operations consumed by the services.
#[async_trait]
pub trait AuthzRepository: Send + Sync {
    /// Upsert one legacy-form edge.
    async fn add(&self, relation: &Relation) -> Result<()>;

    /// Upsert one edge. Group subjects are linked through `membership`.
    async fn add_v2(&self, relation: &RelationV2) -> Result<()>;

    async fn delete(&self, relation: &Relation) -> Result<()>;

    async fn delete_v2(&self, relation: &RelationV2) -> Result<()>;

    /// Remove every edge on a resource type, optionally narrowed to one resource.
    async fn delete_subject_relations(
        &self,
        resource_type: &str,
        optional_resource_id: &str,
    ) -> Result<()>;

    async fn check(&self, relation: &Relation, action: &Action) -> Result<bool>;

    /// One result per input pair, in input order.
    async fn bulk_check(&self, relations: &[Relation], actions: &[Action])
        -> Result<Vec<Permission>>;

    async fn lookup_resources(
        &self,
        resource_type: &str,
        permission: &str,
        subject_type: &str,
        subject_id: &str,
    ) -> Result<Vec<String>>;
}

pub struct RelationStore<C: GraphClient> {
    client: Arc<C>,
    request_timeout: Option<Duration>,
}

impl<C: GraphClient> Clone for RelationStore<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

impl<C: GraphClient> RelationStore<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            request_timeout: None,
        }
    }

    /// Bound every backend call by `timeout`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    async fn with_deadline<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, tonic::Status>>,
    {
        let result = match self.request_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(tonic::Status::deadline_exceeded(format!(
                    "{} did not complete within {:?}",
                    operation, timeout
                ))),
            },
            None => call.await,
        };
        result.map_err(ZanzibarError::from)
    }

    async fn touch(&self, relationship: Relationship) -> Result<()> {
        let request = WriteRelationshipsRequest {
            updates: vec![RelationshipUpdate {
                operation: UpdateOperation::Touch,
                relationship,
            }],
        };
        self.with_deadline("write_relationships", self.client.write_relationships(request))
            .await?;
        Ok(())
    }

    async fn delete_relationship(&self, relationship: Relationship) -> Result<()> {
        let request = DeleteRelationshipsRequest {
            relationship_filter: RelationshipFilter {
                resource_type: relationship.resource.object_type,
                optional_resource_id: relationship.resource.object_id,
                optional_relation: relationship.relation,
                optional_subject_filter: Some(SubjectFilter {
                    subject_type: relationship.subject.object.object_type,
                    optional_subject_id: relationship.subject.object.object_id,
                }),
            },
        };
        self.with_deadline(
            "delete_relationships",
            self.client.delete_relationships(request),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl<C: GraphClient + 'static> AuthzRepository for RelationStore<C> {
    async fn add(&self, relation: &Relation) -> Result<()> {
        let relationship = relation.to_relationship()?;
        let span = info_span!(
            target: "spicedb",
            "upsert_relation",
            product = STORE_PRODUCT_NAME,
            relation = %relationship.relation,
            subject_namespace = %relation.subject_namespace_id,
            object_namespace = %relation.object_namespace_id,
        );
        self.touch(relationship).instrument(span).await
    }

    async fn add_v2(&self, relation: &RelationV2) -> Result<()> {
        let relationship = relation.to_relationship()?;
        let span = info_span!(
            target: "spicedb",
            "upsert_relation",
            product = STORE_PRODUCT_NAME,
            relation = %relation.subject.role_id,
            subject_namespace = %relation.subject.namespace,
            object_namespace = %relation.object.namespace_id,
        );
        self.touch(relationship).instrument(span).await
    }

    async fn delete(&self, relation: &Relation) -> Result<()> {
        let relationship = relation.to_relationship()?;
        let span = info_span!(
            target: "spicedb",
            "delete_relation",
            product = STORE_PRODUCT_NAME,
            relation = %relationship.relation,
            subject_namespace = %relation.subject_namespace_id,
            object_namespace = %relation.object_namespace_id,
        );
        self.delete_relationship(relationship).instrument(span).await
    }

    async fn delete_v2(&self, relation: &RelationV2) -> Result<()> {
        let relationship = relation.to_relationship()?;
        let span = info_span!(
            target: "spicedb",
            "delete_relation",
            product = STORE_PRODUCT_NAME,
            relation = %relation.subject.role_id,
            subject_namespace = %relation.subject.namespace,
            object_namespace = %relation.object.namespace_id,
        );
        self.delete_relationship(relationship).instrument(span).await
    }

    async fn delete_subject_relations(
        &self,
        resource_type: &str,
        optional_resource_id: &str,
    ) -> Result<()> {
        let request = DeleteRelationshipsRequest {
            relationship_filter: RelationshipFilter {
                resource_type: resource_type.to_string(),
                optional_resource_id: optional_resource_id.to_string(),
                ..Default::default()
            },
        };
        let span = info_span!(
            target: "spicedb",
            "delete_subject_relations",
            product = STORE_PRODUCT_NAME,
            object_namespace = %resource_type,
            object_id = %optional_resource_id,
        );
        self.with_deadline(
            "delete_relationships",
            self.client.delete_relationships(request),
        )
        .instrument(span)
        .await?;
        Ok(())
    }

    async fn check(&self, relation: &Relation, action: &Action) -> Result<bool> {
        let (resource, subject) = relation.to_check_references()?;
        let span = info_span!(
            target: "spicedb",
            "check",
            product = STORE_PRODUCT_NAME,
            collection = %format!("object:{}::subject:{}", resource.object_type, subject.object.object_type),
            permission = %action.id,
        );
        let request = CheckPermissionRequest {
            consistency: Consistency::FullyConsistent,
            resource,
            permission: action.id.clone(),
            subject,
        };

        let response = self
            .with_deadline("check_permission", self.client.check_permission(request))
            .instrument(span)
            .await?;

        Ok(response.permissionship == Permissionship::HasPermission)
    }

    async fn bulk_check(
        &self,
        relations: &[Relation],
        actions: &[Action],
    ) -> Result<Vec<Permission>> {
        if relations.len() != actions.len() {
            return Err(ZanzibarError::InvalidDetail(format!(
                "bulk check needs one action per relation, got {} relations and {} actions",
                relations.len(),
                actions.len()
            )));
        }

        let items = relations
            .iter()
            .zip(actions)
            .map(|(relation, action)| {
                let (resource, subject) = relation.to_check_references()?;
                Ok(CheckBulkPermissionsRequestItem {
                    resource,
                    permission: action.id.clone(),
                    subject,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let span = info_span!(
            target: "spicedb",
            "bulk_check",
            product = STORE_PRODUCT_NAME,
            items = items.len(),
        );
        let request = CheckBulkPermissionsRequest {
            consistency: Consistency::FullyConsistent,
            items: items.clone(),
        };
        let response = self
            .with_deadline(
                "check_bulk_permissions",
                self.client.check_bulk_permissions(request),
            )
            .instrument(span)
            .await?;

        // Pairs may come back in any order; key them by the echoed request
        let mut answers: HashMap<CheckBulkPermissionsRequestItem, bool> =
            HashMap::with_capacity(response.pairs.len());
        for pair in response.pairs {
            let allowed = match pair.response {
                CheckBulkPermissionsResult::Item { permissionship } => {
                    permissionship == Permissionship::HasPermission
                }
                CheckBulkPermissionsResult::Error { code, message } => {
                    debug!(target: "spicedb", code, %message, item = %pair.request.resource, "Bulk check item failed");
                    false
                }
            };
            answers.insert(pair.request, allowed);
        }

        Ok(items
            .into_iter()
            .map(|item| {
                let allowed = answers.get(&item).copied().unwrap_or(false);
                Permission {
                    object_id: item.resource.object_id,
                    object_namespace: item.resource.object_type,
                    permission: item.permission,
                    allowed,
                }
            })
            .collect())
    }

    async fn lookup_resources(
        &self,
        resource_type: &str,
        permission: &str,
        subject_type: &str,
        subject_id: &str,
    ) -> Result<Vec<String>> {
        let request = LookupResourcesRequest {
            consistency: Consistency::FullyConsistent,
            resource_object_type: resource_type.to_string(),
            permission: permission.to_string(),
            subject: SubjectReference::new(subject_type, subject_id),
        };
        let span = info_span!(
            target: "spicedb",
            "lookup_resources",
            product = STORE_PRODUCT_NAME,
            collection = %format!("object:{}::subject:{}", resource_type, subject_type),
        );

        let drain = async {
            let mut stream = self.client.lookup_resources(request).await?;
            let mut resource_ids = Vec::new();
            while let Some(item) = stream.next().await {
                resource_ids.push(item?.resource_object_id);
            }
            Ok::<_, tonic::Status>(resource_ids)
        };

        self.with_deadline("lookup_resources", drain)
            .instrument(span)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        CheckBulkPermissionsPair, CheckBulkPermissionsResponse, CheckPermissionResponse,
        DeleteRelationshipsResponse, LookupResourcesResponse, LookupResourcesStream,
        MockGraphClient, ObjectReference, WriteRelationshipsResponse,
    };
    use crate::models::{Object, Subject};
    use mockall::predicate::*;

    fn legacy_relation(object_id: &str, subject_id: &str) -> Relation {
        Relation {
            subject_namespace_id: "user".to_string(),
            subject_id: subject_id.to_string(),
            object_namespace_id: "project".to_string(),
            object_id: object_id.to_string(),
            role_id: "project:viewer".to_string(),
            ..Default::default()
        }
    }

    fn bulk_pair(item: &CheckBulkPermissionsRequestItem, allowed: bool) -> CheckBulkPermissionsPair {
        let permissionship = if allowed {
            Permissionship::HasPermission
        } else {
            Permissionship::NoPermission
        };
        CheckBulkPermissionsPair {
            request: item.clone(),
            response: CheckBulkPermissionsResult::Item { permissionship },
        }
    }

    #[tokio::test]
    async fn test_add_v2_touches_with_membership_qualifier() {
        let mut client = MockGraphClient::new();
        client
            .expect_write_relationships()
            .withf(|request| {
                let [update] = request.updates.as_slice() else {
                    return false;
                };
                update.operation == UpdateOperation::Touch
                    && update.relationship.resource == ObjectReference::new("project", "p1")
                    && update.relationship.relation == "viewer"
                    && update.relationship.subject.object == ObjectReference::new("group", "g1")
                    && update.relationship.subject.optional_relation == "membership"
            })
            .times(1)
            .returning(|_| Ok(WriteRelationshipsResponse::default()));

        let store = RelationStore::new(Arc::new(client));
        let relation = RelationV2::new(
            Object::new("project", "p1"),
            Subject::group("g1", "project:viewer"),
        );
        store.add_v2(&relation).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_relation_never_reaches_backend() {
        let mut client = MockGraphClient::new();
        client.expect_write_relationships().never();
        client.expect_delete_relationships().never();

        let store = RelationStore::new(Arc::new(client));
        let relation = RelationV2::new(Object::new("", "p1"), Subject::user("u1", "viewer"));

        assert!(matches!(
            store.add_v2(&relation).await,
            Err(ZanzibarError::InvalidRelation(_))
        ));
        assert!(matches!(
            store.delete_v2(&relation).await,
            Err(ZanzibarError::InvalidRelation(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_uses_single_filter_call() {
        let mut client = MockGraphClient::new();
        client
            .expect_delete_relationships()
            .withf(|request| {
                let filter = &request.relationship_filter;
                let subject = filter.optional_subject_filter.as_ref();
                filter.resource_type == "project"
                    && filter.optional_resource_id == "p1"
                    && filter.optional_relation == "viewer"
                    && subject.map(|s| s.subject_type.as_str()) == Some("user")
                    && subject.map(|s| s.optional_subject_id.as_str()) == Some("u1")
            })
            .times(1)
            .returning(|_| Ok(DeleteRelationshipsResponse::default()));

        let store = RelationStore::new(Arc::new(client));
        store.delete(&legacy_relation("p1", "u1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_subject_relations_filters_by_resource_only() {
        let mut client = MockGraphClient::new();
        client
            .expect_delete_relationships()
            .with(eq(DeleteRelationshipsRequest {
                relationship_filter: RelationshipFilter {
                    resource_type: "group".to_string(),
                    optional_resource_id: "g1".to_string(),
                    ..Default::default()
                },
            }))
            .times(1)
            .returning(|_| Ok(DeleteRelationshipsResponse::default()));

        let store = RelationStore::new(Arc::new(client));
        store.delete_subject_relations("group", "g1").await.unwrap();
    }

    #[tokio::test]
    async fn test_check_is_fully_consistent_and_surfaces_errors() {
        let mut client = MockGraphClient::new();
        let mut calls = 0;
        client
            .expect_check_permission()
            .withf(|request| {
                request.consistency == Consistency::FullyConsistent
                    && request.permission == "view"
                    && request.subject.optional_relation.is_empty()
            })
            .times(2)
            .returning(move |_| {
                calls += 1;
                if calls == 1 {
                    Ok(CheckPermissionResponse {
                        permissionship: Permissionship::HasPermission,
                    })
                } else {
                    Err(tonic::Status::unavailable("backend down"))
                }
            });

        let store = RelationStore::new(Arc::new(client));
        let relation = legacy_relation("p1", "u1");
        let action = Action::new("view");

        assert!(store.check(&relation, &action).await.unwrap());

        let err = store.check(&relation, &action).await.unwrap_err();
        assert_eq!(err.backend_code(), Some(tonic::Code::Unavailable));
    }

    #[tokio::test]
    async fn test_bulk_check_length_mismatch_before_io() {
        let mut client = MockGraphClient::new();
        client.expect_check_bulk_permissions().never();

        let store = RelationStore::new(Arc::new(client));
        let relations = vec![legacy_relation("p1", "u1"), legacy_relation("p2", "u1")];
        let actions = vec![Action::new("view")];

        assert!(matches!(
            store.bulk_check(&relations, &actions).await,
            Err(ZanzibarError::InvalidDetail(_))
        ));
    }

    #[tokio::test]
    async fn test_bulk_check_aligns_reordered_pairs_and_degrades_errors() {
        let mut client = MockGraphClient::new();
        client
            .expect_check_bulk_permissions()
            .withf(|request| {
                request.consistency == Consistency::FullyConsistent && request.items.len() == 3
            })
            .times(1)
            .returning(|request| {
                let first = &request.items[0];
                let second = &request.items[1];
                // third item is missing from the response entirely
                Ok(CheckBulkPermissionsResponse {
                    pairs: vec![
                        CheckBulkPermissionsPair {
                            request: second.clone(),
                            response: CheckBulkPermissionsResult::Error {
                                code: tonic::Code::Internal as i32,
                                message: "boom".to_string(),
                            },
                        },
                        bulk_pair(first, true),
                    ],
                })
            });

        let store = RelationStore::new(Arc::new(client));
        let relations = vec![
            legacy_relation("p1", "u1"),
            legacy_relation("p2", "u1"),
            legacy_relation("p3", "u1"),
        ];
        let actions = vec![Action::new("view"), Action::new("edit"), Action::new("view")];

        let permissions = store.bulk_check(&relations, &actions).await.unwrap();

        assert_eq!(permissions.len(), 3);
        assert_eq!(permissions[0].object_id, "p1");
        assert!(permissions[0].allowed);
        assert_eq!(permissions[1].object_id, "p2");
        assert_eq!(permissions[1].permission, "edit");
        assert!(!permissions[1].allowed);
        assert_eq!(permissions[2].object_id, "p3");
        assert!(!permissions[2].allowed);
    }

    #[tokio::test]
    async fn test_lookup_resources_drains_stream() {
        let mut client = MockGraphClient::new();
        client
            .expect_lookup_resources()
            .withf(|request| {
                request.consistency == Consistency::FullyConsistent
                    && request.resource_object_type == "project"
                    && request.subject == SubjectReference::new("user", "u1")
            })
            .times(1)
            .returning(|_| {
                let items = ["p1", "p2", "p3"].map(|id| {
                    Ok(LookupResourcesResponse {
                        resource_object_id: id.to_string(),
                    })
                });
                Ok(futures::stream::iter(items).boxed())
            });

        let store = RelationStore::new(Arc::new(client));
        let ids = store
            .lookup_resources("project", "view", "user", "u1")
            .await
            .unwrap();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn test_lookup_resources_stream_error_aborts() {
        let mut client = MockGraphClient::new();
        client.expect_lookup_resources().times(1).returning(|_| {
            let items = vec![
                Ok(LookupResourcesResponse {
                    resource_object_id: "p1".to_string(),
                }),
                Err(tonic::Status::aborted("stream reset")),
            ];
            Ok(futures::stream::iter(items).boxed())
        });

        let store = RelationStore::new(Arc::new(client));
        let err = store
            .lookup_resources("project", "view", "user", "u1")
            .await
            .unwrap_err();
        assert_eq!(err.backend_code(), Some(tonic::Code::Aborted));
    }

    struct StalledClient;

    #[async_trait]
    impl GraphClient for StalledClient {
        async fn write_relationships(
            &self,
            _request: WriteRelationshipsRequest,
        ) -> std::result::Result<WriteRelationshipsResponse, tonic::Status> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(WriteRelationshipsResponse::default())
        }

        async fn delete_relationships(
            &self,
            _request: DeleteRelationshipsRequest,
        ) -> std::result::Result<DeleteRelationshipsResponse, tonic::Status> {
            Err(tonic::Status::unimplemented("delete"))
        }

        async fn check_permission(
            &self,
            _request: CheckPermissionRequest,
        ) -> std::result::Result<CheckPermissionResponse, tonic::Status> {
            Err(tonic::Status::unimplemented("check"))
        }

        async fn check_bulk_permissions(
            &self,
            _request: CheckBulkPermissionsRequest,
        ) -> std::result::Result<CheckBulkPermissionsResponse, tonic::Status> {
            Err(tonic::Status::unimplemented("bulk check"))
        }

        async fn lookup_resources(
            &self,
            _request: LookupResourcesRequest,
        ) -> std::result::Result<LookupResourcesStream, tonic::Status> {
            Err(tonic::Status::unimplemented("lookup"))
        }
    }

    #[tokio::test]
    async fn test_request_timeout_maps_to_deadline_exceeded() {
        let store =
            RelationStore::new(Arc::new(StalledClient)).with_request_timeout(Duration::from_millis(50));
        let relation = RelationV2::new(Object::new("group", "g1"), Subject::user("u1", "member"));

        let err = store.add_v2(&relation).await.unwrap_err();
        assert_eq!(err.backend_code(), Some(tonic::Code::DeadlineExceeded));
    }
}
