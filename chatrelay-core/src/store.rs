use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::model::{PersistedMessage, UsageRecord};

/// Persistence collaborator: commits one assembled assistant message and
/// returns its generated identifier.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn persist_assembled_message(&self, message: &PersistedMessage) -> CoreResult<String>;
}

/// Usage-accounting collaborator. Best-effort at the call site: the pipeline
/// logs failures but never lets them block or fail stream closure.
#[async_trait]
pub trait UsageRecorder: Send + Sync {
    async fn record_usage(&self, owner_id: &str, record: UsageRecord) -> CoreResult<()>;
}

/// In-memory store generating UUID message ids.
/// Backs the CLI smoke tool and tests; a real deployment plugs a database.
#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    messages: Mutex<Vec<(String, PersistedMessage)>>,
}

impl MemoryMessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything persisted so far, in insertion order.
    #[must_use]
    pub fn messages(&self) -> Vec<(String, PersistedMessage)> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn persist_assembled_message(&self, message: &PersistedMessage) -> CoreResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut guard = self
            .messages
            .lock()
            .map_err(|_| crate::error::RelayError::Persistence {
                message: "message store mutex poisoned".into(),
            })?;
        guard.push((id.clone(), message.clone()));
        Ok(id)
    }
}

/// In-memory usage ledger, keyed by owner on read.
#[derive(Debug, Default)]
pub struct MemoryUsageLedger {
    records: Mutex<Vec<(String, UsageRecord)>>,
}

impl MemoryUsageLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn records(&self) -> Vec<(String, UsageRecord)> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl UsageRecorder for MemoryUsageLedger {
    async fn record_usage(&self, owner_id: &str, record: UsageRecord) -> CoreResult<()> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| crate::error::RelayError::Other(anyhow::anyhow!("ledger mutex poisoned")))?;
        guard.push((owner_id.to_string(), record));
        Ok(())
    }
}
