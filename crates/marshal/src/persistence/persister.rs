//! Suspend and resume process instances through a store

use std::sync::Arc;

use tracing::{debug, instrument};

use super::store::{ProcessInstanceRecord, ProcessInstanceStore, StoreError};
use crate::marshaller::{MarshalError, ProcessInstanceMarshaller, ReadContext};
use crate::runtime::{ProcessDefinitionResolver, ProcessInstance};
use crate::timer::TimerManager;

/// Error type for persister operations
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Instance returned by [`ProcessInstancePersister::resume`]
#[derive(Debug)]
pub struct ResumedInstance {
    pub instance: ProcessInstance,
    /// Version to pass as `expected_version` on the next suspend
    pub version: u64,
}

/// Marshals instances into a [`ProcessInstanceStore`] and back
pub struct ProcessInstancePersister {
    store: Arc<dyn ProcessInstanceStore>,
    marshaller: Arc<ProcessInstanceMarshaller>,
    resolver: Arc<dyn ProcessDefinitionResolver>,
    timers: Option<Arc<TimerManager>>,
}

impl ProcessInstancePersister {
    pub fn new(
        store: Arc<dyn ProcessInstanceStore>,
        marshaller: Arc<ProcessInstanceMarshaller>,
        resolver: Arc<dyn ProcessDefinitionResolver>,
    ) -> Self {
        Self {
            store,
            marshaller,
            resolver,
            timers: None,
        }
    }

    /// Re-arm timers of resumed instances in `timers`
    pub fn with_timers(mut self, timers: Arc<TimerManager>) -> Self {
        self.timers = Some(timers);
        self
    }

    pub fn store(&self) -> &Arc<dyn ProcessInstanceStore> {
        &self.store
    }

    /// Write `instance` in the configured format and save it
    ///
    /// Returns the new stored version.
    #[instrument(skip(self, instance), fields(process_instance_id = %instance.id()))]
    pub async fn suspend(
        &self,
        instance: &ProcessInstance,
        expected_version: Option<u64>,
    ) -> Result<u64, PersistenceError> {
        let format = self.marshaller.config().format;
        let data = self.marshaller.write(instance, format)?;
        let record = ProcessInstanceRecord {
            id: instance.id().to_string(),
            process_id: instance.process_id().to_string(),
            state: instance.state(),
            format,
            data,
        };
        let version = self.store.save(record, expected_version).await?;
        debug!(version, "process instance suspended");
        Ok(version)
    }

    /// Load and restore the instance `id`
    #[instrument(skip(self))]
    pub async fn resume(&self, id: &str) -> Result<ResumedInstance, PersistenceError> {
        let stored = self.store.load(id).await?;
        let mut context = ReadContext::new(self.resolver.as_ref());
        if let Some(timers) = &self.timers {
            context = context.with_timers(timers.as_ref());
        }
        let instance = self
            .marshaller
            .read(&stored.record.data, stored.record.format, &context)?;
        debug!(version = stored.version, "process instance resumed");
        Ok(ResumedInstance {
            instance,
            version: stored.version,
        })
    }

    /// Delete a stored instance and cancel its armed timers
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &str) -> Result<(), PersistenceError> {
        self.store.delete(id).await?;
        if let Some(timers) = &self.timers {
            for timer_id in timers.timers_for(id).into_keys() {
                timers.cancel(&timer_id);
            }
        }
        Ok(())
    }
}
