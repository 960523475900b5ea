//! Process-instance marshaller
//!
//! `write` captures a live [`ProcessInstance`] into a canonical
//! [`ProcessInstanceSnapshot`] and hands it to a wire codec; `read` decodes a
//! snapshot and restores the live instance from it. The graph walk exists
//! once, in `capture` and `restore`; codecs only encode the snapshot.
//!
//! Reads are atomic: any failure discards the partially restored instance,
//! and timers are re-armed only once the whole instance is back.

mod capture;
mod restore;

use std::sync::Arc;

use bpmn_marshal_schemas::ProcessInstanceSnapshot;
use tracing::{debug, instrument};

use crate::codec::{codec_for, CodecError, WireFormat};
use crate::config::MarshalConfig;
use crate::runtime::{ProcessDefinitionResolver, ProcessInstance};
use crate::strategy::{StrategyError, StrategyRegistry};
use crate::timer::{RearmOutcome, TimerManager};

use capture::Capture;
use restore::{resolve_definition, Restore};

/// Errors from marshalling a process instance
#[derive(Debug, thiserror::Error)]
pub enum MarshalError {
    /// Process id unknown to the resolver and no embedded definition
    #[error("unknown process: {0}")]
    UnknownProcess(String),

    /// Embedded definition could not be used
    #[error("invalid embedded definition for process {process_id}: {message}")]
    InvalidDefinition { process_id: String, message: String },

    /// Definition could not be embedded on write
    #[error("could not serialize definition of process {process_id}: {source}")]
    DefinitionSerialization {
        process_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not write variable {name}: {source}")]
    CouldNotWriteVariable {
        name: String,
        #[source]
        source: StrategyError,
    },

    #[error("could not reload variable {name}: {source}")]
    CouldNotReloadVariable {
        name: String,
        #[source]
        source: StrategyError,
    },

    /// Strategy table of the snapshot names an unregistered strategy
    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error("could not find node instance when deserializing exclusive group instance: {0}")]
    ExclusiveGroupMemberNotFound(String),

    #[error("swimlane {swimlane} is not declared by process {process_id}")]
    UnknownSwimlane { swimlane: String, process_id: String },

    /// Live node-instance map holds an instance under a key other than its id
    #[error("node instance {node_instance_id} is stored under key {key}")]
    NodeInstanceKeyMismatch {
        key: String,
        node_instance_id: String,
    },

    /// Persisted timer whose next fire time lies outside the date range
    #[error("timer {timer_instance_id} cannot fire: delay {delay_ms}ms / period {period_ms}ms out of range")]
    TimerOutOfRange {
        timer_instance_id: String,
        delay_ms: i64,
        period_ms: i64,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Collaborators needed to restore an instance
#[derive(Clone, Copy)]
pub struct ReadContext<'a> {
    pub resolver: &'a dyn ProcessDefinitionResolver,
    /// Timer manager restored timers are re-armed in
    pub timers: Option<&'a TimerManager>,
}

impl<'a> ReadContext<'a> {
    pub fn new(resolver: &'a dyn ProcessDefinitionResolver) -> Self {
        Self {
            resolver,
            timers: None,
        }
    }

    pub fn with_timers(mut self, timers: &'a TimerManager) -> Self {
        self.timers = Some(timers);
        self
    }
}

/// Writes and reads process instances
///
/// Holds only shared, read-mostly state; every call builds its own strategy
/// session, so one marshaller may serve concurrent calls on different instances.
#[derive(Debug, Clone)]
pub struct ProcessInstanceMarshaller {
    strategies: Arc<StrategyRegistry>,
    config: MarshalConfig,
}

impl Default for ProcessInstanceMarshaller {
    fn default() -> Self {
        Self::new(Arc::new(StrategyRegistry::with_defaults()), MarshalConfig::default())
    }
}

impl ProcessInstanceMarshaller {
    pub fn new(strategies: Arc<StrategyRegistry>, config: MarshalConfig) -> Self {
        Self { strategies, config }
    }

    pub fn strategies(&self) -> &Arc<StrategyRegistry> {
        &self.strategies
    }

    pub fn config(&self) -> &MarshalConfig {
        &self.config
    }

    /// Capture a live instance as a snapshot
    pub fn capture(&self, instance: &ProcessInstance) -> Result<ProcessInstanceSnapshot, MarshalError> {
        let definition_source = match instance.definition() {
            Some(definition) if definition.dynamic && self.config.embed_dynamic_definitions => {
                let source = serde_json::to_string(definition.as_ref()).map_err(|source| {
                    MarshalError::DefinitionSerialization {
                        process_id: definition.id.clone(),
                        source,
                    }
                })?;
                Some(source)
            }
            _ => None,
        };
        Capture::new(&self.strategies).instance(instance, definition_source)
    }

    /// Restore a live instance from a snapshot
    pub fn restore(
        &self,
        snapshot: ProcessInstanceSnapshot,
        resolver: &dyn ProcessDefinitionResolver,
    ) -> Result<ProcessInstance, MarshalError> {
        let definition = resolve_definition(
            &snapshot.header.process_id,
            snapshot.process_definition_source.as_deref(),
            resolver,
        )?;
        Restore::new(&self.strategies, &snapshot)?.instance(snapshot, definition)
    }

    /// Re-arm the timers of a restored instance; returns how many were armed
    pub fn rearm_timers(&self, instance: &ProcessInstance, timers: &TimerManager) -> usize {
        instance
            .timers
            .values()
            .filter(|timer| {
                matches!(
                    timers.rearm((*timer).clone()),
                    RearmOutcome::Armed { .. }
                )
            })
            .count()
    }

    /// Write an instance in the configured default format
    pub fn write_default(&self, instance: &ProcessInstance) -> Result<Vec<u8>, MarshalError> {
        self.write(instance, self.config.format)
    }

    #[instrument(skip(self, instance), fields(process_instance_id = %instance.id(), format = %format))]
    pub fn write(
        &self,
        instance: &ProcessInstance,
        format: WireFormat,
    ) -> Result<Vec<u8>, MarshalError> {
        let snapshot = self.capture(instance)?;
        let bytes = codec_for(format, self.config.max_nesting_depth).encode(&snapshot)?;
        debug!(
            node_instances = snapshot.node_instance_count(),
            variables = snapshot.variables.len(),
            strategies = snapshot.strategies.len(),
            timers = snapshot.timers.len(),
            bytes = bytes.len(),
            "process instance written"
        );
        Ok(bytes)
    }

    #[instrument(skip(self, bytes, context), fields(format = %format, bytes = bytes.len()))]
    pub fn read(
        &self,
        bytes: &[u8],
        format: WireFormat,
        context: &ReadContext<'_>,
    ) -> Result<ProcessInstance, MarshalError> {
        let snapshot = codec_for(format, self.config.max_nesting_depth).decode(bytes)?;
        let node_instances = snapshot.node_instance_count();
        let strategies = snapshot.strategies.len();

        let instance = self.restore(snapshot, context.resolver)?;

        let rearmed = match context.timers {
            Some(timers) if self.config.rearm_timers => self.rearm_timers(&instance, timers),
            _ => 0,
        };
        debug!(
            process_instance_id = %instance.id(),
            node_instances,
            strategies,
            variables = instance.variables.len(),
            rearmed,
            "process instance read"
        );
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{InMemoryProcessDefinitionRegistry, ProcessDefinition};
    use bpmn_marshal_schemas::{
        CompositeState, ExclusiveGroupInstance, ForEachState, NodeInstance, NodeInstanceContent,
        WorkItem,
    };
    use serde_json::json;

    fn registry() -> InMemoryProcessDefinitionRegistry {
        let registry = InMemoryProcessDefinitionRegistry::new();
        registry.register(ProcessDefinition::new("orders", "Orders").with_swimlane("approver"));
        registry
    }

    fn instance(registry: &InMemoryProcessDefinitionRegistry) -> ProcessInstance {
        let definition = registry.resolve("orders").unwrap();
        let mut instance = ProcessInstance::start(definition);
        instance.set_variable("amount", json!(120));
        instance.set_variable("customer", json!({"name": "Ada", "tier": "gold"}));
        instance
    }

    #[test]
    fn test_capture_skips_nulls_and_records_strategies() {
        let registry = registry();
        let mut instance = instance(&registry);
        instance.set_variable("note", serde_json::Value::Null);

        let snapshot = ProcessInstanceMarshaller::default().capture(&instance).unwrap();
        let names: Vec<_> = snapshot.variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["amount", "customer"]);
        assert_eq!(snapshot.strategies, vec!["primitive", "json"]);
        assert!(snapshot.process_definition_source.is_none());
    }

    #[test]
    fn test_work_item_parameters_round_trip() {
        let registry = registry();
        let mut instance = instance(&registry);
        let mut item: WorkItem = WorkItem::new("wi-1", instance.id(), "Email");
        item.parameters.set("to", json!("ops@example.com"));
        instance.add_node_instance(NodeInstance::new(
            "1",
            "send",
            NodeInstanceContent::WorkItem {
                work_item_id: "wi-1".into(),
                work_item: item,
                timer_instance_ids: vec![],
                error_handling_process_instance_id: None,
            },
        ));

        let marshaller = ProcessInstanceMarshaller::default();
        let snapshot = marshaller.capture(&instance).unwrap();
        let restored = marshaller.restore(snapshot, &registry).unwrap();
        assert!(restored.same_state(&instance));
    }

    #[test]
    fn test_for_each_keeps_only_composite_children() {
        let registry = registry();
        let mut instance = instance(&registry);
        let mut for_each = ForEachState::default();
        for_each.node_instances.insert(
            "2".into(),
            NodeInstance::new("2", "body", NodeInstanceContent::Composite(CompositeState::default())),
        );
        for_each
            .node_instances
            .insert("3".into(), NodeInstance::new("3", "stray", NodeInstanceContent::Event));
        instance.add_node_instance(NodeInstance::new("1", "loop", NodeInstanceContent::ForEach(for_each)));

        let snapshot = ProcessInstanceMarshaller::default().capture(&instance).unwrap();
        let children = snapshot.node_instances["1"].content.children().unwrap();
        assert_eq!(children.keys().collect::<Vec<_>>(), vec!["2"]);
    }

    #[test]
    fn test_node_instance_key_must_match_id() {
        let registry = registry();
        let mut instance = instance(&registry);
        instance
            .node_instances
            .insert("alias".into(), NodeInstance::new("1", "a", NodeInstanceContent::Event));

        let marshaller = ProcessInstanceMarshaller::default();
        assert!(matches!(
            marshaller.write(&instance, WireFormat::Legacy),
            Err(MarshalError::NodeInstanceKeyMismatch { ref key, ref node_instance_id })
                if key == "alias" && node_instance_id == "1"
        ));

        // two keys naming the same instance would produce an unreadable stream
        instance.node_instances.remove("alias");
        let mut composite = CompositeState::default();
        for key in ["2", "3"] {
            composite
                .node_instances
                .insert(key.into(), NodeInstance::new("2", "b", NodeInstanceContent::Event));
        }
        instance.add_node_instance(NodeInstance::new("1", "sub", NodeInstanceContent::Composite(composite)));
        assert!(matches!(
            marshaller.capture(&instance),
            Err(MarshalError::NodeInstanceKeyMismatch { ref key, .. }) if key == "3"
        ));
    }

    #[test]
    fn test_nested_group_member_must_exist() {
        let registry = registry();
        let mut instance = instance(&registry);
        let mut composite = CompositeState::default();
        composite
            .node_instances
            .insert("2".into(), NodeInstance::new("2", "a", NodeInstanceContent::Event));
        composite.exclusive_groups.push(ExclusiveGroupInstance::new(["2", "9"]));
        instance.add_node_instance(NodeInstance::new("1", "sub", NodeInstanceContent::Composite(composite)));

        let marshaller = ProcessInstanceMarshaller::default();
        let snapshot = marshaller.capture(&instance).unwrap();
        let err = marshaller.restore(snapshot, &registry).unwrap_err();
        assert_eq!(
            err.to_string(),
            "could not find node instance when deserializing exclusive group instance: 9"
        );
    }

    #[test]
    fn test_unknown_swimlane() {
        let registry = registry();
        let mut instance = instance(&registry);
        instance.set_swimlane_actor("auditor", "mary");

        let marshaller = ProcessInstanceMarshaller::default();
        let snapshot = marshaller.capture(&instance).unwrap();
        assert!(matches!(
            marshaller.restore(snapshot, &registry),
            Err(MarshalError::UnknownSwimlane { swimlane, .. }) if swimlane == "auditor"
        ));
    }

    #[test]
    fn test_unknown_process() {
        let registry = registry();
        let instance = instance(&registry);
        let marshaller = ProcessInstanceMarshaller::default();
        let snapshot = marshaller.capture(&instance).unwrap();

        let empty = InMemoryProcessDefinitionRegistry::new();
        assert!(matches!(
            marshaller.restore(snapshot, &empty),
            Err(MarshalError::UnknownProcess(id)) if id == "orders"
        ));
    }

    #[test]
    fn test_dynamic_definition_is_embedded() {
        let registry = InMemoryProcessDefinitionRegistry::new();
        let definition = registry.register(ProcessDefinition::new("adhoc", "Ad hoc").dynamic());
        let instance = ProcessInstance::start(definition);

        let marshaller = ProcessInstanceMarshaller::default();
        let snapshot = marshaller.capture(&instance).unwrap();
        assert!(snapshot.process_definition_source.is_some());

        let restored = marshaller
            .restore(snapshot, &InMemoryProcessDefinitionRegistry::new())
            .unwrap();
        assert_eq!(restored.definition().map(|d| d.name.as_str()), Some("Ad hoc"));

        let config = MarshalConfig {
            embed_dynamic_definitions: false,
            ..Default::default()
        };
        let marshaller = ProcessInstanceMarshaller::new(Arc::new(StrategyRegistry::default()), config);
        assert!(marshaller.capture(&instance).unwrap().process_definition_source.is_none());
    }

    #[test]
    fn test_embedded_definition_for_other_process_is_rejected() {
        let mut snapshot = ProcessInstanceSnapshot::default();
        snapshot.header.process_id = "orders".into();
        snapshot.process_definition_source = Some(r#"{"id":"billing","name":"Billing"}"#.into());

        let result = ProcessInstanceMarshaller::default()
            .restore(snapshot, &InMemoryProcessDefinitionRegistry::new());
        assert!(matches!(result, Err(MarshalError::InvalidDefinition { .. })));
    }
}
