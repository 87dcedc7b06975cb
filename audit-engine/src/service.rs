use crate::entry::AuditEntry;
use crate::error::{AuditError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Tracing target audit records are written to.
pub const AUDIT_TARGET: &str = "audit";

/// Destination for finished audit entries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn insert(&self, entry: &AuditEntry) -> Result<()>;
}

/// Activity logging capability consumed by services.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActivityService: Send + Sync {
    async fn log(&self, action: &str, actor: &str, data: serde_json::Value) -> Result<()>;
}

/// Writes each entry as one JSON record on the `audit` tracing target.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn insert(&self, entry: &AuditEntry) -> Result<()> {
        let record = serde_json::to_string(entry)?;
        info!(target: "audit", action = %entry.action, actor = %entry.actor, "{}", record);
        Ok(())
    }
}

/// Drops every entry.
#[derive(Debug, Default, Clone)]
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn insert(&self, _entry: &AuditEntry) -> Result<()> {
        Ok(())
    }
}

/// Keeps entries in memory, for tests and local tooling.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditSink {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn insert(&self, entry: &AuditEntry) -> Result<()> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}

/// Turns `log` calls into [`AuditEntry`] records and hands them to a sink.
pub struct ActivityLogger<S: AuditSink> {
    sink: S,
}

impl<S: AuditSink> ActivityLogger<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

#[async_trait]
impl<S: AuditSink> ActivityService for ActivityLogger<S> {
    async fn log(&self, action: &str, actor: &str, data: serde_json::Value) -> Result<()> {
        let data = match data {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => {
                return Err(AuditError::InvalidData("log data is empty".to_string()))
            }
            other => {
                return Err(AuditError::InvalidData(format!(
                    "log data must be an object, got {}",
                    other
                )))
            }
        };

        let entry = AuditEntry::new(action, actor, data);
        self.sink.insert(&entry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_logger_builds_entry() {
        let logger = ActivityLogger::new(InMemoryAuditSink::new());

        logger
            .log("group.create", "actor-1", json!({"entity": "group", "id": "g1"}))
            .await
            .unwrap();

        let entries = logger.sink().entries();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.action, "group.create");
        assert_eq!(entry.actor, "actor-1");
        assert_eq!(entry.data["id"], json!("g1"));
        assert_eq!(entry.metadata["app_name"], "rebac");
    }

    #[tokio::test]
    async fn test_logger_rejects_non_object_data() {
        let logger = ActivityLogger::new(InMemoryAuditSink::new());

        assert!(matches!(
            logger.log("group.create", "a", serde_json::Value::Null).await,
            Err(AuditError::InvalidData(_))
        ));
        assert!(matches!(
            logger.log("group.create", "a", json!([1, 2])).await,
            Err(AuditError::InvalidData(_))
        ));
        assert!(logger.sink().is_empty());
    }

    #[tokio::test]
    async fn test_sink_errors_propagate_to_caller() {
        let mut sink = MockAuditSink::new();
        sink.expect_insert()
            .times(1)
            .returning(|_| Err(AuditError::Sink("disk full".to_string())));

        let logger = ActivityLogger::new(sink);
        let result = logger.log("group.update", "a", json!({"id": "g1"})).await;
        assert!(matches!(result, Err(AuditError::Sink(_))));
    }

    #[tokio::test]
    async fn test_tracing_sink_accepts_entry() {
        let entry = AuditEntry::new("group.create", "a", serde_json::Map::new());
        TracingAuditSink.insert(&entry).await.unwrap();
    }
}
