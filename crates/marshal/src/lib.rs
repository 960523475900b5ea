//! # Process-Instance Marshalling
//!
//! Suspends a running process instance to bytes and restores it later.
//!
//! ## Features
//!
//! - **Pluggable variable strategies**: values are encoded by the first registered strategy that accepts them
//! - **Two wire formats**: a big-endian legacy stream and a protobuf message, both round-tripping the same snapshot
//! - **Atomic reads**: an instance is restored whole or the read fails
//! - **Timer re-arming**: persisted timers are re-armed idempotently, overdue ones fire immediately
//! - **Persistence**: async store with optimistic versioning
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ProcessInstanceMarshaller                    │
//! │  capture: live instance -> ProcessInstanceSnapshot          │
//! │  restore: snapshot -> live instance (+ timer re-arm)        │
//! └─────────────────────────────────────────────────────────────┘
//!            │                                   │
//!            ▼                                   ▼
//! ┌──────────────────────────┐     ┌──────────────────────────┐
//! │     StrategySession      │     │      SnapshotCodec       │
//! │  (per-call index table)  │     │  LegacyStreamCodec       │
//! └──────────────────────────┘     │  ProtobufCodec           │
//!                                  └──────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ProcessInstancePersister                     │
//! │  (suspend / resume through a ProcessInstanceStore)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use bpmn_marshal::prelude::*;
//!
//! let definitions = InMemoryProcessDefinitionRegistry::new();
//! let definition = definitions.register(ProcessDefinition::new("orders", "Orders"));
//!
//! let mut instance = ProcessInstance::start(definition);
//! instance.set_variable("amount", json!(120));
//!
//! let marshaller = ProcessInstanceMarshaller::default();
//! let bytes = marshaller.write(&instance, WireFormat::Structured)?;
//! let restored = marshaller.read(&bytes, WireFormat::Structured, &ReadContext::new(&definitions))?;
//! ```

pub mod codec;
pub mod config;
pub mod marshaller;
pub mod persistence;
pub mod runtime;
pub mod strategy;
pub mod timer;

/// Prelude for common imports
pub mod prelude {
    pub use crate::codec::{codec_for, CodecError, SnapshotCodec, WireFormat};
    pub use crate::config::{load_config, MarshalConfig};
    pub use crate::marshaller::{MarshalError, ProcessInstanceMarshaller, ReadContext};
    pub use crate::persistence::{
        InMemoryProcessInstanceStore, PersistenceError, ProcessInstancePersister,
        ProcessInstanceStore, StoreError,
    };
    pub use crate::runtime::{
        InMemoryProcessDefinitionRegistry, ProcessDefinition, ProcessDefinitionResolver,
        ProcessInstance,
    };
    pub use crate::strategy::{ObjectMarshallingStrategy, StrategyError, StrategyRegistry};
    pub use crate::timer::{
        to_expiration, Expiration, PseudoClock, SessionClock, SystemClock, TimerKind,
        TimerManager, TimerSpec, Trigger,
    };
    pub use bpmn_marshal_schemas::{
        NodeInstance, NodeInstanceContent, NodeInstanceType, ProcessInstanceSnapshot,
        ProcessInstanceState,
    };
}

// Re-export key types at crate root
pub use codec::{codec_for, CodecError, LegacyStreamCodec, ProtobufCodec, SnapshotCodec, WireFormat};
pub use config::{load_config, MarshalConfig};
pub use marshaller::{MarshalError, ProcessInstanceMarshaller, ReadContext};
pub use persistence::{
    InMemoryProcessInstanceStore, PersistenceError, ProcessInstancePersister, ProcessInstanceStore,
    StoreError,
};
pub use runtime::{
    InMemoryProcessDefinitionRegistry, ProcessDefinition, ProcessDefinitionResolver, ProcessInstance,
};
pub use strategy::{
    JsonStrategy, ObjectMarshallingStrategy, PrimitiveStrategy, StrategyError, StrategyRegistry,
    StrategySession,
};
pub use timer::{
    to_expiration, Expiration, PseudoClock, RearmOutcome, SessionClock, SystemClock, TimerError,
    TimerKind, TimerManager, TimerSpec, Trigger,
};
