use crate::backend::{ObjectReference, Relationship, SubjectReference};
use crate::error::ZanzibarError;
use crate::schema::{self, GROUP_PRINCIPAL, MEMBERSHIP_PERMISSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const AUDIT_ENTITY: &str = "relation";
pub const AUDIT_ENTITY_SUBJECT: &str = "relation_subject";

/// The object side of an edge: a namespace and an ID within it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Object {
    pub id: String,
    pub namespace_id: String,
}

impl Object {
    pub fn new(namespace_id: &str, id: &str) -> Self {
        Self {
            id: id.to_string(),
            namespace_id: namespace_id.to_string(),
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace_id, self.id)
    }
}

/// The principal side of an edge, qualified by the role it holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub namespace: String,
    pub role_id: String,
}

impl Subject {
    pub fn new(namespace: &str, id: &str, role_id: &str) -> Self {
        Self {
            id: id.to_string(),
            namespace: namespace.to_string(),
            role_id: role_id.to_string(),
        }
    }

    pub fn user(user_id: &str, role_id: &str) -> Self {
        Self::new(schema::USER_PRINCIPAL, user_id, role_id)
    }

    pub fn group(group_id: &str, role_id: &str) -> Self {
        Self::new(GROUP_PRINCIPAL, group_id, role_id)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{}", self.namespace, self.id, self.role_id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationType {
    #[default]
    Role,
    Namespace,
}

/// Legacy edge representation with flat namespace/role columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub id: String,
    pub subject_namespace_id: String,
    pub subject_id: String,
    pub subject_role_id: String,
    pub object_namespace_id: String,
    pub object_id: String,
    pub role_id: String,
    pub relation_type: RelationType,
}

impl Relation {
    /// Full edge used for writes and single-edge deletes.
    pub fn to_relationship(&self) -> Result<Relationship, ZanzibarError> {
        self.validate()?;
        let optional_relation = if self.subject_role_id.is_empty() {
            String::new()
        } else {
            schema::role_name(&self.subject_role_id).to_string()
        };

        Ok(Relationship {
            resource: ObjectReference::new(&self.object_namespace_id, &self.object_id),
            relation: schema::role_name(&self.role_id).to_string(),
            subject: SubjectReference {
                object: ObjectReference::new(&self.subject_namespace_id, &self.subject_id),
                optional_relation,
            },
        })
    }

    /// Resource and bare subject used at check time.
    pub fn to_check_references(&self) -> Result<(ObjectReference, SubjectReference), ZanzibarError> {
        self.validate()?;
        Ok((
            ObjectReference::new(&self.object_namespace_id, &self.object_id),
            SubjectReference::new(&self.subject_namespace_id, &self.subject_id),
        ))
    }

    fn validate(&self) -> Result<(), ZanzibarError> {
        if self.object_namespace_id.trim().is_empty() || self.object_id.trim().is_empty() {
            return Err(ZanzibarError::InvalidRelation(format!(
                "object reference '{}:{}' is incomplete",
                self.object_namespace_id, self.object_id
            )));
        }
        if self.subject_namespace_id.trim().is_empty() || self.subject_id.trim().is_empty() {
            return Err(ZanzibarError::InvalidRelation(format!(
                "subject reference '{}:{}' is incomplete",
                self.subject_namespace_id, self.subject_id
            )));
        }
        Ok(())
    }
}

/// Current edge representation: object plus role-qualified subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationV2 {
    pub id: String,
    pub object: Object,
    pub subject: Subject,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RelationV2 {
    pub fn new(object: Object, subject: Subject) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            object,
            subject,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn to_relationship(&self) -> Result<Relationship, ZanzibarError> {
        if self.object.namespace_id.trim().is_empty() || self.object.id.trim().is_empty() {
            return Err(ZanzibarError::InvalidRelation(format!(
                "object reference '{}' is incomplete",
                self.object
            )));
        }
        if self.subject.namespace.trim().is_empty() || self.subject.id.trim().is_empty() {
            return Err(ZanzibarError::InvalidRelation(format!(
                "subject reference '{}' is incomplete",
                self.subject
            )));
        }

        Ok(Relationship {
            resource: ObjectReference::new(&self.object.namespace_id, &self.object.id),
            relation: schema::role_name(&self.subject.role_id).to_string(),
            subject: SubjectReference {
                object: ObjectReference::new(&self.subject.namespace, &self.subject.id),
                optional_relation: subject_qualifier(&self.subject.namespace).to_string(),
            },
        })
    }

    pub fn to_log_data(&self) -> RelationLogData {
        RelationLogData {
            entity: AUDIT_ENTITY.to_string(),
            id: self.id.clone(),
            object_id: self.object.id.clone(),
            object_namespace: self.object.namespace_id.clone(),
            subject_id: self.subject.id.clone(),
            subject_namespace: self.subject.namespace.clone(),
            role_id: self.subject.role_id.clone(),
        }
    }
}

impl fmt::Display for RelationV2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.object, self.subject)
    }
}

/// Group subjects are always linked through their `membership` permission.
pub fn subject_qualifier(subject_namespace: &str) -> &'static str {
    if subject_namespace == GROUP_PRINCIPAL {
        MEMBERSHIP_PERMISSION
    } else {
        ""
    }
}

/// A permission name checked against the compiled schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub name: String,
    pub namespace_id: String,
}

impl Action {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            namespace_id: String::new(),
        }
    }
}

/// Outcome of one bulk-check item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub object_id: String,
    pub object_namespace: String,
    pub permission: String,
    pub allowed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationLogData {
    pub entity: String,
    pub id: String,
    pub object_id: String,
    pub object_namespace: String,
    pub subject_id: String,
    pub subject_namespace: String,
    pub role_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectLogData {
    pub entity: String,
    pub resource_type: String,
    pub optional_resource_id: String,
}

impl SubjectLogData {
    pub fn new(resource_type: &str, optional_resource_id: &str) -> Self {
        Self {
            entity: AUDIT_ENTITY_SUBJECT.to_string(),
            resource_type: resource_type.to_string(),
            optional_resource_id: optional_resource_id.to_string(),
        }
    }
}
