use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const GROUP_AUDIT_ENTITY: &str = "group";

/// Free-form, key-ordered attributes attached to groups and users.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(pub BTreeMap<String, serde_json::Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: serde_json::Value) {
        self.0.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Flatten to strings. String values are kept as-is, anything else is
    /// JSON-encoded.
    pub fn to_string_value_map(&self) -> Result<BTreeMap<String, String>, serde_json::Error> {
        self.0
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => serde_json::to_string(other)?,
                };
                Ok((key.clone(), value))
            })
            .collect()
    }
}

impl<const N: usize> From<[(&str, serde_json::Value); N]> for Metadata {
    fn from(entries: [(&str, serde_json::Value); N]) -> Self {
        Self(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: &str, name: &str, email: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(rename = "orgId")]
    pub organization_id: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    /// A group that has not been persisted yet.
    pub fn new(name: &str, slug: &str, organization_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            name: name.to_string(),
            slug: slug.to_string(),
            organization_id: organization_id.to_string(),
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn to_log_data(&self) -> GroupLogData {
        GroupLogData {
            entity: GROUP_AUDIT_ENTITY.to_string(),
            id: self.id.clone(),
            name: self.name.clone(),
            slug: self.slug.clone(),
            organization_id: self.organization_id.clone(),
        }
    }

    /// Flattened audit payload: group fields plus metadata. Metadata keys
    /// win on collision.
    pub fn to_audit_data(&self) -> Result<serde_json::Value, serde_json::Error> {
        let mut data = match serde_json::to_value(self.to_log_data())? {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        for (key, value) in self.metadata.to_string_value_map()? {
            data.insert(key, serde_json::Value::String(value));
        }
        Ok(serde_json::Value::Object(data))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupLogData {
    pub entity: String,
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(rename = "orgId")]
    pub organization_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupFilter {
    pub organization_id: Option<String>,
}

/// Caller identity carried through service calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: String,
    /// Email of the authenticated principal, when there is one.
    pub email: Option<String>,
}

impl RequestContext {
    pub fn new(request_id: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }
}

/// Users and groups attached to a group, with the roles each holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupRelations {
    pub users: Vec<User>,
    pub groups: Vec<Group>,
    pub user_roles: BTreeMap<String, Vec<String>>,
    pub group_roles: BTreeMap<String, Vec<String>>,
}
