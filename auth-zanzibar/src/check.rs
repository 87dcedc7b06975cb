use crate::{
    backend::{ObjectReference, SubjectReference},
    compiler::{Definition, Userset},
    error::ZanzibarError,
    repository::RelationshipRepository,
};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_MAX_DEPTH: u32 = 50;

/// Permission checker evaluating compiled definitions against stored relationships:
/// - Direct relationships
/// - Userset subjects (e.g. `group:eng#membership`)
/// - Unions of relations and permissions
/// - Tuple-to-userset arrows (e.g. `organization->admin`)
pub struct PermissionChecker {
    repository: Arc<dyn RelationshipRepository>,
    definitions: Arc<HashMap<String, Definition>>,
    max_depth: u32,
}

impl PermissionChecker {
    pub fn new(
        repository: Arc<dyn RelationshipRepository>,
        definitions: Arc<HashMap<String, Definition>>,
    ) -> Self {
        Self {
            repository,
            definitions,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn definition(&self, object_type: &str) -> Result<&Definition, ZanzibarError> {
        self.definitions.get(object_type).ok_or_else(|| {
            ZanzibarError::InvalidDetail(format!("object definition '{}' not found", object_type))
        })
    }

    /// Check whether `subject` reaches `permission` on `resource`.
    pub async fn check(
        &self,
        resource: &ObjectReference,
        permission: &str,
        subject: &SubjectReference,
    ) -> Result<bool, ZanzibarError> {
        let definition = self.definition(&resource.object_type)?;
        if !definition.has_member(permission) {
            return Err(ZanzibarError::InvalidDetail(format!(
                "relation or permission '{}' not found under definition '{}'",
                permission, resource.object_type
            )));
        }
        self.check_recursive(resource.clone(), permission.to_string(), subject.clone(), 0)
            .await
    }

    fn check_recursive(
        &self,
        resource: ObjectReference,
        permission: String,
        subject: SubjectReference,
        depth: u32,
    ) -> BoxFuture<'_, Result<bool, ZanzibarError>> {
        async move {
            if depth > self.max_depth {
                return Err(ZanzibarError::MaxRecursionDepthExceeded);
            }

            // The subject itself as a userset, e.g. group:eng#membership on group:eng
            if subject.object == resource && subject.optional_relation == permission {
                return Ok(true);
            }

            let Some(definition) = self.definitions.get(&resource.object_type) else {
                return Ok(false);
            };

            debug!("Checking: {}#{}@{}", resource, permission, subject);

            if definition.relation(&permission).is_some() {
                return self
                    .check_relation(resource, permission, subject, depth)
                    .await;
            }

            let Some(permission_def) = definition.permission(&permission) else {
                return Ok(false);
            };

            for userset in &permission_def.union {
                let found = match userset {
                    Userset::Computed(name) => {
                        self.check_recursive(
                            resource.clone(),
                            name.clone(),
                            subject.clone(),
                            depth + 1,
                        )
                        .await?
                    }
                    Userset::TupleToUserset { tupleset, computed } => {
                        self.check_arrow(&resource, tupleset, computed, &subject, depth)
                            .await?
                    }
                };
                if found {
                    return Ok(true);
                }
            }

            Ok(false)
        }
        .boxed()
    }

    async fn check_relation(
        &self,
        resource: ObjectReference,
        relation: String,
        subject: SubjectReference,
        depth: u32,
    ) -> Result<bool, ZanzibarError> {
        let relationships = self.repository.read(&resource, &relation).await?;

        if relationships.iter().any(|r| r.subject == subject) {
            debug!("Direct relationship found");
            return Ok(true);
        }

        for relationship in relationships {
            if relationship.subject.optional_relation.is_empty() {
                continue;
            }
            if self
                .check_recursive(
                    relationship.subject.object,
                    relationship.subject.optional_relation,
                    subject.clone(),
                    depth + 1,
                )
                .await?
            {
                return Ok(true);
            }
        }

        Ok(false)
    }

    async fn check_arrow(
        &self,
        resource: &ObjectReference,
        tupleset: &str,
        computed: &str,
        subject: &SubjectReference,
        depth: u32,
    ) -> Result<bool, ZanzibarError> {
        let relationships = self.repository.read(resource, tupleset).await?;

        for relationship in relationships {
            let target = relationship.subject.object;
            let has_member = self
                .definitions
                .get(&target.object_type)
                .is_some_and(|d| d.has_member(computed));
            if !has_member {
                continue;
            }
            if self
                .check_recursive(target, computed.to_string(), subject.clone(), depth + 1)
                .await?
            {
                return Ok(true);
            }
        }

        Ok(false)
    }
}
