use crate::backend::{ObjectReference, Relationship, RelationshipFilter};
use crate::error::ZanzibarError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Storage for relationships held by the in-memory graph backend.
#[async_trait]
pub trait RelationshipRepository: Send + Sync {
    /// Insert a relationship. Returns `false` when it already existed.
    async fn insert(&self, relationship: Relationship) -> Result<bool, ZanzibarError>;

    /// Remove a single relationship. Returns `false` when it was absent.
    async fn remove(&self, relationship: &Relationship) -> Result<bool, ZanzibarError>;

    /// Remove every relationship matching the filter, returning how many went.
    async fn remove_matching(&self, filter: &RelationshipFilter) -> Result<usize, ZanzibarError>;

    /// Relationships on `resource` through `relation`.
    async fn read(
        &self,
        resource: &ObjectReference,
        relation: &str,
    ) -> Result<Vec<Relationship>, ZanzibarError>;

    async fn exists(&self, relationship: &Relationship) -> Result<bool, ZanzibarError>;

    /// Distinct IDs of stored resources of the given type, in sorted order.
    async fn resource_ids(&self, resource_type: &str) -> Result<Vec<String>, ZanzibarError>;
}

/// In-memory relationship repository for testing and development
pub struct InMemoryRelationshipRepository {
    relationships: Arc<DashMap<String, Relationship>>,
}

impl InMemoryRelationshipRepository {
    pub fn new() -> Self {
        Self {
            relationships: Arc::new(DashMap::new()),
        }
    }

    fn relationship_key(relationship: &Relationship) -> String {
        relationship.to_string()
    }

    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }
}

impl Default for InMemoryRelationshipRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelationshipRepository for InMemoryRelationshipRepository {
    async fn insert(&self, relationship: Relationship) -> Result<bool, ZanzibarError> {
        let key = Self::relationship_key(&relationship);
        Ok(self.relationships.insert(key, relationship).is_none())
    }

    async fn remove(&self, relationship: &Relationship) -> Result<bool, ZanzibarError> {
        let key = Self::relationship_key(relationship);
        Ok(self.relationships.remove(&key).is_some())
    }

    async fn remove_matching(&self, filter: &RelationshipFilter) -> Result<usize, ZanzibarError> {
        let before = self.relationships.len();
        self.relationships
            .retain(|_, relationship| !filter.matches(relationship));
        Ok(before.saturating_sub(self.relationships.len()))
    }

    async fn read(
        &self,
        resource: &ObjectReference,
        relation: &str,
    ) -> Result<Vec<Relationship>, ZanzibarError> {
        let relationships = self
            .relationships
            .iter()
            .filter(|entry| {
                let relationship = entry.value();
                relationship.resource == *resource && relationship.relation == relation
            })
            .map(|entry| entry.value().clone())
            .collect();

        Ok(relationships)
    }

    async fn exists(&self, relationship: &Relationship) -> Result<bool, ZanzibarError> {
        let key = Self::relationship_key(relationship);
        Ok(self.relationships.contains_key(&key))
    }

    async fn resource_ids(&self, resource_type: &str) -> Result<Vec<String>, ZanzibarError> {
        let ids: BTreeSet<String> = self
            .relationships
            .iter()
            .filter(|entry| entry.value().resource.object_type == resource_type)
            .map(|entry| entry.value().resource.object_id.clone())
            .collect();

        Ok(ids.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SubjectFilter, SubjectReference};

    fn membership(group: &str, user: &str) -> Relationship {
        Relationship {
            resource: ObjectReference::new("group", group),
            relation: "member".to_string(),
            subject: SubjectReference::new("user", user),
        }
    }

    #[tokio::test]
    async fn test_in_memory_repository() {
        let repo = InMemoryRelationshipRepository::new();
        let relationship = membership("g1", "alice");

        assert!(repo.insert(relationship.clone()).await.unwrap());
        assert!(!repo.insert(relationship.clone()).await.unwrap());
        assert!(repo.exists(&relationship).await.unwrap());

        let found = repo
            .read(&ObjectReference::new("group", "g1"), "member")
            .await
            .unwrap();
        assert_eq!(found, vec![relationship.clone()]);

        assert!(repo.remove(&relationship).await.unwrap());
        assert!(!repo.remove(&relationship).await.unwrap());
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_remove_matching_filter() {
        let repo = InMemoryRelationshipRepository::new();
        repo.insert(membership("g1", "alice")).await.unwrap();
        repo.insert(membership("g1", "bob")).await.unwrap();
        repo.insert(membership("g2", "alice")).await.unwrap();

        let filter = RelationshipFilter {
            resource_type: "group".to_string(),
            optional_resource_id: "g1".to_string(),
            optional_relation: String::new(),
            optional_subject_filter: Some(SubjectFilter {
                subject_type: "user".to_string(),
                optional_subject_id: "alice".to_string(),
            }),
        };
        assert_eq!(repo.remove_matching(&filter).await.unwrap(), 1);
        assert_eq!(repo.len(), 2);

        let ids = repo.resource_ids("group").await.unwrap();
        assert_eq!(ids, vec!["g1", "g2"]);
    }
}
