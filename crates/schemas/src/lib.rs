// BPMN Marshal Schemas
//
// Decision: This crate is the source of truth for the persisted shape of a process instance
// Decision: Minimal dependencies - only serde, serde_json, chrono, thiserror
// Decision: No runtime logic - only type definitions, wire codes and small helpers
// Decision: Every map that reaches a wire format is a BTreeMap/BTreeSet so iteration
//           order (and therefore the encoded bytes) is deterministic

// Core type modules
pub mod codes;
pub mod instance;
pub mod node;
pub mod snapshot;
pub mod time;
pub mod timer;
pub mod variables;
pub mod work_item;

// Re-exports for convenience
// Wire codes
pub use codes::UnknownCode;

// Process-instance header types
pub use instance::{ProcessInstanceHeader, ProcessInstanceState, SlaCompliance, SlaState};

// Node-instance types
pub use node::{
    CompositeState, ExclusiveGroupInstance, ForEachState, NodeInstance, NodeInstanceContent,
    NodeInstanceSnapshot, NodeInstanceType, NodeInstances,
};

// Snapshot types
pub use snapshot::ProcessInstanceSnapshot;

// Time helpers
pub use time::{add_millis, datetime_to_millis, millis_to_datetime};

// Timer types
pub use timer::TimerInstance;

// Variable types
pub use variables::{EncodedVariable, EncodedVariables, VariableScope};

// Work item types
pub use work_item::{HumanTaskWorkItem, WorkItem, WorkItemState};
