//! Persistence layer for suspended process instances
//!
//! This module provides:
//! - [`ProcessInstanceStore`] trait with optimistic versioning
//! - [`InMemoryProcessInstanceStore`] for tests
//! - [`ProcessInstancePersister`] marshalling instances on suspend and resume

mod memory;
mod persister;
mod store;

pub use memory::InMemoryProcessInstanceStore;
pub use persister::{PersistenceError, ProcessInstancePersister, ResumedInstance};
pub use store::{
    ProcessInstanceInfo, ProcessInstanceRecord, ProcessInstanceStore, StoreError,
    StoredProcessInstance,
};
