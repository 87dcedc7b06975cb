use crate::{error::*, models::*};
use async_trait::async_trait;
use auth_zanzibar::{role_name, RelationV2, GROUP_NAMESPACE};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

/// Persistence of group records and the relation edges attached to them.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GroupRepository: Send + Sync {
    async fn create(&self, group: &Group) -> Result<Group>;
    async fn get_by_id(&self, id: &str) -> Result<Group>;
    async fn get_by_slug(&self, slug: &str) -> Result<Group>;
    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Group>>;
    async fn list(&self, filter: &GroupFilter) -> Result<Vec<Group>>;
    async fn update_by_id(&self, group: &Group) -> Result<Group>;
    async fn update_by_slug(&self, group: &Group) -> Result<Group>;
    /// Groups on which `user_id` holds `role_id`; any role when blank.
    async fn list_user_groups(&self, user_id: &str, role_id: &str) -> Result<Vec<Group>>;
    /// Edges whose object is the given group, optionally narrowed by subject
    /// type and role (blank matches all).
    async fn list_group_relations(
        &self,
        object_id: &str,
        subject_type: &str,
        role: &str,
    ) -> Result<Vec<RelationV2>>;
}

/// User lookups the group service depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserService: Send + Sync {
    async fn fetch_current_user(&self, ctx: &RequestContext) -> Result<User>;
    async fn get_by_id(&self, id: &str) -> Result<User>;
    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<User>>;
}

fn role_matches(edge_role: &str, wanted: &str) -> bool {
    wanted.is_empty() || role_name(edge_role) == role_name(wanted)
}

// In-memory implementation for development/testing
#[derive(Default, Clone)]
pub struct InMemoryGroupRepository {
    groups: Arc<DashMap<String, Group>>,
    relations: Arc<RwLock<Vec<RelationV2>>>,
}

impl InMemoryGroupRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an edge so it shows up in relation listings.
    pub fn add_relation(&self, relation: RelationV2) {
        let mut relations = self.relations.write();
        if !relations
            .iter()
            .any(|r| r.object == relation.object && r.subject == relation.subject)
        {
            relations.push(relation);
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    fn find_id_by_slug(&self, slug: &str) -> Option<String> {
        self.groups
            .iter()
            .find(|entry| entry.value().slug == slug)
            .map(|entry| entry.key().clone())
    }

    fn validate(group: &Group) -> Result<()> {
        if group.name.trim().is_empty() {
            return Err(IdentityError::InvalidDetail("group name is empty".to_string()));
        }
        if group.slug.trim().is_empty() {
            return Err(IdentityError::InvalidDetail("group slug is empty".to_string()));
        }
        Ok(())
    }

    fn apply_update(&self, id: &str, update: &Group) -> Result<Group> {
        if let Some(owner) = self.find_id_by_slug(&update.slug) {
            if owner != id {
                return Err(IdentityError::SlugConflict(update.slug.clone()));
            }
        }

        let mut stored = self.groups.get_mut(id).ok_or(IdentityError::GroupNotFound)?;
        stored.name = update.name.clone();
        stored.slug = update.slug.clone();
        if !update.organization_id.is_empty() {
            stored.organization_id = update.organization_id.clone();
        }
        stored.metadata = update.metadata.clone();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }
}

#[async_trait]
impl GroupRepository for InMemoryGroupRepository {
    async fn create(&self, group: &Group) -> Result<Group> {
        Self::validate(group)?;
        if self.find_id_by_slug(&group.slug).is_some() {
            return Err(IdentityError::SlugConflict(group.slug.clone()));
        }

        let now = Utc::now();
        let mut created = group.clone();
        created.id = Uuid::new_v4().to_string();
        created.created_at = now;
        created.updated_at = now;

        self.groups.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: &str) -> Result<Group> {
        self.groups
            .get(id)
            .map(|g| g.clone())
            .ok_or(IdentityError::GroupNotFound)
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Group> {
        self.groups
            .iter()
            .find(|entry| entry.value().slug == slug)
            .map(|entry| entry.value().clone())
            .ok_or(IdentityError::GroupNotFound)
    }

    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Group>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.groups.get(id).map(|g| g.clone()))
            .collect())
    }

    async fn list(&self, filter: &GroupFilter) -> Result<Vec<Group>> {
        let mut groups: Vec<Group> = self
            .groups
            .iter()
            .filter(|entry| match &filter.organization_id {
                Some(org) => &entry.value().organization_id == org,
                None => true,
            })
            .map(|entry| entry.value().clone())
            .collect();
        groups.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(groups)
    }

    async fn update_by_id(&self, group: &Group) -> Result<Group> {
        Self::validate(group)?;
        self.apply_update(&group.id, group)
    }

    async fn update_by_slug(&self, group: &Group) -> Result<Group> {
        Self::validate(group)?;
        let id = self
            .find_id_by_slug(&group.slug)
            .ok_or(IdentityError::GroupNotFound)?;
        self.apply_update(&id, group)
    }

    async fn list_user_groups(&self, user_id: &str, role_id: &str) -> Result<Vec<Group>> {
        let mut ids: Vec<String> = self
            .relations
            .read()
            .iter()
            .filter(|r| {
                r.object.namespace_id == GROUP_NAMESPACE
                    && r.subject.namespace == auth_zanzibar::USER_PRINCIPAL
                    && r.subject.id == user_id
                    && role_matches(&r.subject.role_id, role_id)
            })
            .map(|r| r.object.id.clone())
            .collect();
        ids.sort();
        ids.dedup();

        self.get_by_ids(&ids).await
    }

    async fn list_group_relations(
        &self,
        object_id: &str,
        subject_type: &str,
        role: &str,
    ) -> Result<Vec<RelationV2>> {
        Ok(self
            .relations
            .read()
            .iter()
            .filter(|r| {
                r.object.namespace_id == GROUP_NAMESPACE
                    && r.object.id == object_id
                    && (subject_type.is_empty() || r.subject.namespace == subject_type)
                    && role_matches(&r.subject.role_id, role)
            })
            .cloned()
            .collect())
    }
}

/// Users keyed by ID; the current user is resolved from the request email.
#[derive(Default, Clone)]
pub struct InMemoryUserService {
    users: Arc<DashMap<String, User>>,
}

impl InMemoryUserService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) {
        self.users.insert(user.id.clone(), user);
    }
}

#[async_trait]
impl UserService for InMemoryUserService {
    async fn fetch_current_user(&self, ctx: &RequestContext) -> Result<User> {
        let email = ctx
            .email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or(IdentityError::UserNotFound)?;

        self.users
            .iter()
            .find(|entry| entry.value().email == email)
            .map(|entry| entry.value().clone())
            .ok_or(IdentityError::UserNotFound)
    }

    async fn get_by_id(&self, id: &str) -> Result<User> {
        self.users
            .get(id)
            .map(|u| u.clone())
            .ok_or(IdentityError::UserNotFound)
    }

    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<User>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.users.get(id).map(|u| u.clone()))
            .collect())
    }
}
