// Audit entry types and structures
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub const APP_NAME: &str = "rebac";

/// One activity record as written to a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub actor: String,
    pub data: serde_json::Map<String, serde_json::Value>,
    pub metadata: BTreeMap<String, String>,
}

impl AuditEntry {
    pub fn new(
        action: &str,
        actor: &str,
        data: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("app_name".to_string(), APP_NAME.to_string());
        metadata.insert(
            "app_version".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );

        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action: action.to_string(),
            actor: actor.to_string(),
            data,
            metadata,
        }
    }
}

/// An activity submitted for asynchronous logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: String,
    pub actor: String,
    pub data: serde_json::Value,
}

impl AuditEvent {
    pub fn new(action: &str, actor: &str, data: serde_json::Value) -> Self {
        Self {
            action: action.to_string(),
            actor: actor.to_string(),
            data,
        }
    }
}
