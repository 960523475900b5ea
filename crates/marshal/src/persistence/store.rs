//! ProcessInstanceStore trait definition

use async_trait::async_trait;
use bpmn_marshal_schemas::ProcessInstanceState;
use chrono::{DateTime, Utc};

use crate::codec::WireFormat;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Process instance not found
    #[error("process instance not found: {0}")]
    NotFound(String),

    /// Concurrency conflict (optimistic locking failed)
    #[error("concurrency conflict: expected version {expected}, got {actual}")]
    ConcurrencyConflict { expected: u64, actual: u64 },

    /// Backend failure
    #[error("storage error: {0}")]
    Storage(String),
}

/// Marshalled process instance handed to a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInstanceRecord {
    pub id: String,
    pub process_id: String,
    pub state: ProcessInstanceState,
    /// Format `data` is encoded in
    pub format: WireFormat,
    pub data: Vec<u8>,
}

/// Record as kept by a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredProcessInstance {
    pub record: ProcessInstanceRecord,
    /// Incremented on every save, starting at 1
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

/// Listing entry without the payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInstanceInfo {
    pub id: String,
    pub process_id: String,
    pub state: ProcessInstanceState,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl From<&StoredProcessInstance> for ProcessInstanceInfo {
    fn from(stored: &StoredProcessInstance) -> Self {
        Self {
            id: stored.record.id.clone(),
            process_id: stored.record.process_id.clone(),
            state: stored.record.state,
            version: stored.version,
            updated_at: stored.updated_at,
        }
    }
}

/// Storage for suspended process instances
#[async_trait]
pub trait ProcessInstanceStore: Send + Sync + 'static {
    /// Save a record and return its new version
    ///
    /// `expected_version` is the version the caller last saw: `None` for an
    /// instance that has never been saved. A mismatch fails with
    /// [`StoreError::ConcurrencyConflict`].
    async fn save(
        &self,
        record: ProcessInstanceRecord,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError>;

    async fn load(&self, id: &str) -> Result<StoredProcessInstance, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Stored instances ordered by id, optionally of one process only
    async fn list(&self, process_id: Option<&str>) -> Result<Vec<ProcessInstanceInfo>, StoreError>;
}
