use crate::{cached_repository::CachedRepository, error::*, models::*, repository::*};
use audit_engine::AuditDispatcher;
use auth_zanzibar::{
    AuthzRepository, Object, RelationV2, Subject, GROUP_NAMESPACE, GROUP_PRINCIPAL,
    ORGANIZATION_NAMESPACE, ORGANIZATION_RELATION_NAME, USER_PRINCIPAL,
};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const AUDIT_KEY_GROUP_CREATE: &str = "group.create";
pub const AUDIT_KEY_GROUP_UPDATE: &str = "group.update";

/// Group lifecycle: persistence, organization linkage and audit.
pub struct GroupService {
    repository: Arc<dyn GroupRepository>,
    relations: Arc<dyn AuthzRepository>,
    users: Arc<dyn UserService>,
    audit: Arc<AuditDispatcher>,
    cached: Option<Arc<dyn CachedRepository<Group>>>,
}

impl GroupService {
    pub fn new(
        repository: Arc<dyn GroupRepository>,
        relations: Arc<dyn AuthzRepository>,
        users: Arc<dyn UserService>,
        audit: Arc<AuditDispatcher>,
    ) -> Self {
        Self {
            repository,
            relations,
            users,
            audit,
            cached: None,
        }
    }

    /// Serve slug lookups through a read-through cache.
    pub fn with_cache(mut self, cached: Arc<dyn CachedRepository<Group>>) -> Self {
        self.cached = Some(cached);
        self
    }

    pub async fn create(&self, ctx: &RequestContext, group: &Group) -> Result<Group> {
        let actor = self
            .users
            .fetch_current_user(ctx)
            .await
            .map_err(|e| IdentityError::InvalidActor(e.to_string()))?;

        let created = self.repository.create(group).await?;

        // The group stays persisted if linking fails; the caller sees the error.
        if let Err(e) = self.add_group_to_organization(&created).await {
            error!(
                group_id = %created.id,
                org_id = %created.organization_id,
                error = %e,
                "Group created but organization relation failed"
            );
            return Err(IdentityError::RelationWrite(e));
        }

        info!(group_id = %created.id, slug = %created.slug, "Group created");
        self.emit(AUDIT_KEY_GROUP_CREATE, &actor.id, &created);
        Ok(created)
    }

    /// Update by ID when one is set, otherwise by slug. Only slug updates
    /// are audited.
    pub async fn update(&self, ctx: &RequestContext, group: &Group) -> Result<Group> {
        if !group.id.trim().is_empty() {
            return self.repository.update_by_id(group).await;
        }

        let updated = self.repository.update_by_slug(group).await?;

        let actor_id = match self.users.fetch_current_user(ctx).await {
            Ok(user) => user.id,
            Err(e) => {
                debug!(error = %e, "Actor unresolved for group update audit");
                String::new()
            }
        };
        self.emit(AUDIT_KEY_GROUP_UPDATE, &actor_id, &updated);
        Ok(updated)
    }

    /// Look up by ID when the input is a UUID, otherwise by slug.
    pub async fn get(&self, id_or_slug: &str) -> Result<Group> {
        if Uuid::parse_str(id_or_slug).is_ok() {
            return self.repository.get_by_id(id_or_slug).await;
        }
        self.get_by_slug(id_or_slug).await
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Group> {
        match &self.cached {
            Some(cached) => cached.get_by_slug(slug).await,
            None => self.repository.get_by_slug(slug).await,
        }
    }

    pub async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Group>> {
        self.repository.get_by_ids(ids).await
    }

    pub async fn list(&self, filter: &GroupFilter) -> Result<Vec<Group>> {
        self.repository.list(filter).await
    }

    pub async fn list_user_groups(&self, user_id: &str, role_id: &str) -> Result<Vec<Group>> {
        self.repository.list_user_groups(user_id, role_id).await
    }

    /// Users and groups related to a group, with their roles in edge order.
    pub async fn list_group_relations(
        &self,
        object_id: &str,
        subject_type: &str,
        role: &str,
    ) -> Result<GroupRelations> {
        let edges = self
            .repository
            .list_group_relations(object_id, subject_type, role)
            .await
            .map_err(|e| IdentityError::ListingGroupRelations(Box::new(e)))?;

        let mut user_ids: Vec<String> = Vec::new();
        let mut group_ids: Vec<String> = Vec::new();
        let mut user_roles: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut group_roles: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for edge in &edges {
            let subject = &edge.subject;
            let (ids, roles) = match subject.namespace.as_str() {
                USER_PRINCIPAL => (&mut user_ids, &mut user_roles),
                GROUP_PRINCIPAL => (&mut group_ids, &mut group_roles),
                other => {
                    debug!(namespace = other, "Skipping non-principal subject");
                    continue;
                }
            };
            match roles.entry(subject.id.clone()) {
                Entry::Vacant(slot) => {
                    ids.push(subject.id.clone());
                    slot.insert(vec![subject.role_id.clone()]);
                }
                Entry::Occupied(mut slot) => slot.get_mut().push(subject.role_id.clone()),
            }
        }

        let users = if user_ids.is_empty() {
            Vec::new()
        } else {
            self.users
                .get_by_ids(&user_ids)
                .await
                .map_err(|e| IdentityError::FetchingUsers(Box::new(e)))?
        };

        let groups = if group_ids.is_empty() {
            Vec::new()
        } else {
            self.repository
                .get_by_ids(&group_ids)
                .await
                .map_err(|e| IdentityError::FetchingGroups(Box::new(e)))?
        };

        Ok(GroupRelations {
            users,
            groups,
            user_roles,
            group_roles,
        })
    }

    async fn add_group_to_organization(&self, group: &Group) -> auth_zanzibar::Result<()> {
        let relation = RelationV2::new(
            Object::new(GROUP_NAMESPACE, &group.id),
            Subject::new(
                ORGANIZATION_NAMESPACE,
                &group.organization_id,
                ORGANIZATION_RELATION_NAME,
            ),
        );
        self.relations.add_v2(&relation).await
    }

    /// Hand the event to the audit pool; never fails the caller.
    fn emit(&self, action: &str, actor_id: &str, group: &Group) {
        match group.to_audit_data() {
            Ok(data) => {
                self.audit.log(action, actor_id, data);
            }
            Err(e) => warn!(action, group_id = %group.id, error = %e, "Failed to encode audit data"),
        }
    }
}
