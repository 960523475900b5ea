//! Live process instance

use std::collections::BTreeMap;
use std::sync::Arc;

use bpmn_marshal_schemas::{
    ExclusiveGroupInstance, NodeInstance, NodeInstances, ProcessInstanceHeader,
    ProcessInstanceState, TimerInstance, VariableScope,
};
use chrono::{SubsecRound, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::ProcessDefinition;

/// A running process instance as handed to and returned by the marshaller
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessInstance {
    pub header: ProcessInstanceHeader,
    /// Swimlane name -> actor id
    pub swimlane_actors: BTreeMap<String, String>,
    pub variables: VariableScope,
    pub node_instances: NodeInstances,
    pub exclusive_groups: Vec<ExclusiveGroupInstance>,
    pub iteration_levels: BTreeMap<String, i32>,
    pub timers: BTreeMap<String, TimerInstance>,
    definition: Option<Arc<ProcessDefinition>>,
}

impl ProcessInstance {
    /// Start a new active instance of `definition`
    pub fn start(definition: Arc<ProcessDefinition>) -> Self {
        let mut header = ProcessInstanceHeader::new(Uuid::now_v7().to_string(), &definition.id);
        header.process_version = definition.version.clone();
        header.state = ProcessInstanceState::Active;
        header.start_date = Some(Utc::now().trunc_subsecs(3));
        Self {
            header,
            definition: Some(definition),
            ..Default::default()
        }
    }

    /// Instance with an explicit header, attached to `definition`
    pub fn with_header(header: ProcessInstanceHeader, definition: Arc<ProcessDefinition>) -> Self {
        Self {
            header,
            definition: Some(definition),
            ..Default::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.header.id
    }

    pub fn process_id(&self) -> &str {
        &self.header.process_id
    }

    pub fn state(&self) -> ProcessInstanceState {
        self.header.state
    }

    pub fn definition(&self) -> Option<&Arc<ProcessDefinition>> {
        self.definition.as_ref()
    }

    pub fn set_definition(&mut self, definition: Arc<ProcessDefinition>) {
        self.definition = Some(definition);
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.variables.set(name, value)
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn set_swimlane_actor(&mut self, swimlane: impl Into<String>, actor_id: impl Into<String>) {
        self.swimlane_actors.insert(swimlane.into(), actor_id.into());
    }

    /// Add a top-level node instance, returning the one it replaced
    pub fn add_node_instance(&mut self, node: NodeInstance) -> Option<NodeInstance> {
        self.node_instances.insert(node.id.clone(), node)
    }

    pub fn remove_node_instance(&mut self, id: &str) -> Option<NodeInstance> {
        self.node_instances.remove(id)
    }

    /// Find a node instance anywhere in the tree
    pub fn node_instance(&self, id: &str) -> Option<&NodeInstance> {
        self.node_instances.values().find_map(|node| node.find(id))
    }

    pub fn add_exclusive_group(&mut self, group: ExclusiveGroupInstance) {
        self.exclusive_groups.push(group);
    }

    /// Top-level exclusive group containing `node_instance_id`
    pub fn exclusive_group_of(&self, node_instance_id: &str) -> Option<&ExclusiveGroupInstance> {
        self.exclusive_groups
            .iter()
            .find(|group| group.contains(node_instance_id))
    }

    /// Node instances of a top-level group, skipping ids that no longer exist
    pub fn group_members<'a>(&'a self, group: &'a ExclusiveGroupInstance) -> Vec<&'a NodeInstance> {
        group
            .node_instance_ids
            .iter()
            .filter_map(|id| self.node_instances.get(id))
            .collect()
    }

    pub fn set_iteration_level(&mut self, scope_id: impl Into<String>, level: i32) {
        self.iteration_levels.insert(scope_id.into(), level);
    }

    pub fn add_timer(&mut self, timer: TimerInstance) {
        self.timers.insert(timer.id.clone(), timer);
    }

    /// Number of node instances, nested ones included
    pub fn node_instance_count(&self) -> usize {
        fn count(nodes: &NodeInstances) -> usize {
            nodes
                .values()
                .map(|node| 1 + node.content.children().map(count).unwrap_or(0))
                .sum()
        }
        count(&self.node_instances)
    }

    /// Field-wise equality ignoring the attached definition
    pub fn same_state(&self, other: &ProcessInstance) -> bool {
        self.header == other.header
            && self.swimlane_actors == other.swimlane_actors
            && self.variables == other.variables
            && self.node_instances == other.node_instances
            && self.exclusive_groups == other.exclusive_groups
            && self.iteration_levels == other.iteration_levels
            && self.timers == other.timers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpmn_marshal_schemas::{CompositeState, NodeInstanceContent};
    use serde_json::json;

    fn definition() -> Arc<ProcessDefinition> {
        Arc::new(ProcessDefinition::new("orders", "Orders").with_version("2"))
    }

    #[test]
    fn test_start_sets_header() {
        let instance = ProcessInstance::start(definition());
        assert_eq!(instance.process_id(), "orders");
        assert_eq!(instance.state(), ProcessInstanceState::Active);
        assert_eq!(instance.header.process_version.as_deref(), Some("2"));
        assert!(instance.header.start_date.is_some());
        assert!(!instance.id().is_empty());
    }

    #[test]
    fn test_nested_lookup_and_count() {
        let mut instance = ProcessInstance::start(definition());
        let mut composite = CompositeState::default();
        composite.node_instances.insert(
            "2".into(),
            NodeInstance::new("2", "inner", NodeInstanceContent::Event),
        );
        instance.add_node_instance(NodeInstance::new(
            "1",
            "outer",
            NodeInstanceContent::Composite(composite),
        ));

        assert_eq!(instance.node_instance("2").map(|n| n.node_id.as_str()), Some("inner"));
        assert_eq!(instance.node_instance_count(), 2);
    }

    #[test]
    fn test_group_members_resolve_existing_nodes() {
        let mut instance = ProcessInstance::start(definition());
        instance.add_node_instance(NodeInstance::new("a", "left", NodeInstanceContent::Event));
        instance.add_exclusive_group(ExclusiveGroupInstance::new(["a", "gone"]));

        let group = instance.exclusive_group_of("a").unwrap();
        let members = instance.group_members(group);
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, "a");
    }

    #[test]
    fn test_same_state_ignores_definition() {
        let mut a = ProcessInstance::start(definition());
        a.set_variable("x", json!(1));
        let mut b = a.clone();
        b.set_definition(Arc::new(ProcessDefinition::new("orders", "Renamed")));
        assert!(a.same_state(&b));
        b.set_variable("x", json!(2));
        assert!(!a.same_state(&b));
    }
}
