// Process-instance snapshot
//
// Canonical, format-independent persisted form of a process instance. Both
// wire codecs encode exactly this record, so two codecs that round-trip a
// snapshot are semantically equivalent by construction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::instance::ProcessInstanceHeader;
use crate::node::{ExclusiveGroupInstance, NodeInstanceSnapshot, NodeInstanceType};
use crate::timer::TimerInstance;
use crate::variables::EncodedVariables;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessInstanceSnapshot {
    /// Strategy names by index, as recorded by the write session
    pub strategies: Vec<String>,
    pub header: ProcessInstanceHeader,
    /// Swimlane name -> actor id
    pub swimlane_actors: BTreeMap<String, String>,
    pub node_instances: BTreeMap<String, NodeInstanceSnapshot>,
    pub exclusive_groups: Vec<ExclusiveGroupInstance>,
    pub variables: EncodedVariables,
    pub iteration_levels: BTreeMap<String, i32>,
    pub timers: BTreeMap<String, TimerInstance>,
    /// Serialized definition, present only for definitions that may be unknown to the reader
    pub process_definition_source: Option<String>,
}

impl ProcessInstanceSnapshot {
    /// Total number of node instances, nested ones included
    pub fn node_instance_count(&self) -> usize {
        fn count(nodes: &BTreeMap<String, NodeInstanceSnapshot>) -> usize {
            nodes
                .values()
                .map(|node| 1 + node.content.children().map(count).unwrap_or(0))
                .sum()
        }
        count(&self.node_instances)
    }

    /// Deepest container nesting among the top-level node instances
    pub fn nesting_depth(&self) -> usize {
        self.node_instances
            .values()
            .map(|node| node.nesting_depth())
            .max()
            .unwrap_or(0)
    }

    /// Number of node instances of each kind, nested ones included
    pub fn count_by_type(&self) -> BTreeMap<NodeInstanceType, usize> {
        fn walk(
            nodes: &BTreeMap<String, NodeInstanceSnapshot>,
            acc: &mut BTreeMap<NodeInstanceType, usize>,
        ) {
            for node in nodes.values() {
                *acc.entry(node.node_type()).or_default() += 1;
                if let Some(children) = node.content.children() {
                    walk(children, acc);
                }
            }
        }
        let mut acc = BTreeMap::new();
        walk(&self.node_instances, &mut acc);
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{CompositeState, NodeInstance, NodeInstanceContent};

    #[test]
    fn test_counts_nested_instances() {
        let mut composite = CompositeState::<EncodedVariables>::default();
        composite.node_instances.insert(
            "2".into(),
            NodeInstance::new("2", "inner", NodeInstanceContent::Event),
        );

        let mut snapshot = ProcessInstanceSnapshot::default();
        snapshot.node_instances.insert(
            "1".into(),
            NodeInstance::new("1", "outer", NodeInstanceContent::Composite(composite)),
        );

        assert_eq!(snapshot.node_instance_count(), 2);
        assert_eq!(snapshot.nesting_depth(), 1);

        let by_type = snapshot.count_by_type();
        assert_eq!(by_type.get(&NodeInstanceType::Composite), Some(&1));
        assert_eq!(by_type.get(&NodeInstanceType::Event), Some(&1));
    }
}
