//! Live runtime model seen by the marshaller
//!
//! The execution engine itself is an external collaborator; this module holds
//! only what the marshaller reads from and rebuilds into: the process instance
//! with its node-instance tree, and the process definitions it refers to.

mod definition;
mod instance;

pub use definition::{InMemoryProcessDefinitionRegistry, ProcessDefinition, ProcessDefinitionResolver};
pub use instance::ProcessInstance;
