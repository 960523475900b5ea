//! In-memory ProcessInstanceStore implementation

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::store::{
    ProcessInstanceInfo, ProcessInstanceRecord, ProcessInstanceStore, StoreError,
    StoredProcessInstance,
};

/// In-memory store for tests and single-process runtimes
///
/// # Example
///
/// ```ignore
/// let store = InMemoryProcessInstanceStore::new();
/// ```
pub struct InMemoryProcessInstanceStore {
    instances: RwLock<HashMap<String, StoredProcessInstance>>,
}

impl InMemoryProcessInstanceStore {
    pub fn new() -> Self {
        Self {
            instances: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        self.instances.write().clear();
    }
}

impl Default for InMemoryProcessInstanceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessInstanceStore for InMemoryProcessInstanceStore {
    async fn save(
        &self,
        record: ProcessInstanceRecord,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        let mut instances = self.instances.write();
        let actual = instances.get(&record.id).map(|s| s.version).unwrap_or(0);
        let expected = expected_version.unwrap_or(0);
        if actual != expected {
            return Err(StoreError::ConcurrencyConflict { expected, actual });
        }

        let version = actual + 1;
        instances.insert(
            record.id.clone(),
            StoredProcessInstance {
                record,
                version,
                updated_at: Utc::now(),
            },
        );
        Ok(version)
    }

    async fn load(&self, id: &str) -> Result<StoredProcessInstance, StoreError> {
        self.instances
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.instances
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list(&self, process_id: Option<&str>) -> Result<Vec<ProcessInstanceInfo>, StoreError> {
        let mut infos: Vec<ProcessInstanceInfo> = self
            .instances
            .read()
            .values()
            .filter(|s| process_id.map_or(true, |p| s.record.process_id == p))
            .map(ProcessInstanceInfo::from)
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(infos)
    }
}
