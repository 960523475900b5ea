//! Live instance -> snapshot

use bpmn_marshal_schemas::{
    CompositeState, EncodedVariable, EncodedVariables, ForEachState, NodeInstance,
    NodeInstanceContent, NodeInstances, ProcessInstanceSnapshot, VariableScope,
};
use serde_json::Value;
use tracing::warn;

use super::MarshalError;
use crate::runtime::ProcessInstance;
use crate::strategy::{StrategyError, StrategyRegistry, StrategySession};

/// Node-instance maps are keyed by the instance id; anything else would be re-keyed on read
fn check_key(key: &str, node: &NodeInstance) -> Result<(), MarshalError> {
    if key == node.id {
        return Ok(());
    }
    Err(MarshalError::NodeInstanceKeyMismatch {
        key: key.to_string(),
        node_instance_id: node.id.clone(),
    })
}

/// One write call: walks the live graph and records strategy usage
pub(super) struct Capture<'a> {
    session: StrategySession<'a>,
}

impl<'a> Capture<'a> {
    pub(super) fn new(registry: &'a StrategyRegistry) -> Self {
        Self {
            session: StrategySession::for_write(registry),
        }
    }

    pub(super) fn instance(
        mut self,
        instance: &ProcessInstance,
        process_definition_source: Option<String>,
    ) -> Result<ProcessInstanceSnapshot, MarshalError> {
        let node_instances = self.node_instances(&instance.node_instances)?;
        let variables = self.variables(&instance.variables)?;

        Ok(ProcessInstanceSnapshot {
            strategies: self.session.table(),
            header: instance.header.clone(),
            swimlane_actors: instance.swimlane_actors.clone(),
            node_instances,
            exclusive_groups: instance.exclusive_groups.clone(),
            variables,
            iteration_levels: instance.iteration_levels.clone(),
            timers: instance.timers.clone(),
            process_definition_source,
        })
    }

    /// Encode non-null variables in name order
    fn variables(&mut self, scope: &VariableScope) -> Result<EncodedVariables, MarshalError> {
        scope
            .non_null()
            .map(|(name, value)| {
                self.variable(name, value)
                    .map_err(|source| MarshalError::CouldNotWriteVariable {
                        name: name.to_string(),
                        source,
                    })
            })
            .collect()
    }

    fn variable(&mut self, name: &str, value: &Value) -> Result<EncodedVariable, StrategyError> {
        let strategy = self.session.select_strategy(value)?;
        let payload = strategy.marshal(value)?;
        Ok(EncodedVariable {
            name: name.to_string(),
            strategy_index: self.session.record_usage(&strategy),
            data_type: strategy.data_type(value),
            payload,
        })
    }

    fn node_instances(
        &mut self,
        nodes: &NodeInstances,
    ) -> Result<NodeInstances<EncodedVariables>, MarshalError> {
        nodes
            .iter()
            .map(|(key, node)| {
                check_key(key, node)?;
                Ok((key.clone(), self.node(node)?))
            })
            .collect()
    }

    fn node(&mut self, node: &NodeInstance) -> Result<NodeInstance<EncodedVariables>, MarshalError> {
        Ok(NodeInstance {
            id: node.id.clone(),
            node_id: node.node_id.clone(),
            level: node.level,
            trigger_date: node.trigger_date,
            sla: node.sla.clone(),
            content: self.content(&node.id, &node.content)?,
        })
    }

    fn composite(
        &mut self,
        state: &CompositeState,
    ) -> Result<CompositeState<EncodedVariables>, MarshalError> {
        Ok(CompositeState {
            timer_instance_ids: state.timer_instance_ids.clone(),
            variables: self.variables(&state.variables)?,
            node_instances: self.node_instances(&state.node_instances)?,
            exclusive_groups: state.exclusive_groups.clone(),
            iteration_levels: state.iteration_levels.clone(),
        })
    }

    fn for_each(
        &mut self,
        node_instance_id: &str,
        state: &ForEachState,
    ) -> Result<ForEachState<EncodedVariables>, MarshalError> {
        let mut node_instances = NodeInstances::new();
        for (id, child) in &state.node_instances {
            check_key(id, child)?;
            if !child.node_type().is_composite_family() {
                warn!(
                    node_instance_id,
                    child_id = %id,
                    child_type = %child.node_type(),
                    "skipping non-composite child of for-each node instance"
                );
                continue;
            }
            node_instances.insert(id.clone(), self.node(child)?);
        }
        Ok(ForEachState {
            variables: self.variables(&state.variables)?,
            node_instances,
            iteration_levels: state.iteration_levels.clone(),
        })
    }

    fn content(
        &mut self,
        node_instance_id: &str,
        content: &NodeInstanceContent,
    ) -> Result<NodeInstanceContent<EncodedVariables>, MarshalError> {
        Ok(match content {
            NodeInstanceContent::RuleSet {
                timer_instance_ids,
                rule_flow_group,
                fact_handles,
            } => NodeInstanceContent::RuleSet {
                timer_instance_ids: timer_instance_ids.clone(),
                rule_flow_group: rule_flow_group.clone(),
                fact_handles: fact_handles.clone(),
            },
            NodeInstanceContent::HumanTask {
                work_item_id,
                work_item,
                timer_instance_ids,
                error_handling_process_instance_id,
            } => NodeInstanceContent::HumanTask {
                work_item_id: work_item_id.clone(),
                work_item: work_item.try_map_parameters(|params| self.variables(params))?,
                timer_instance_ids: timer_instance_ids.clone(),
                error_handling_process_instance_id: error_handling_process_instance_id.clone(),
            },
            NodeInstanceContent::WorkItem {
                work_item_id,
                work_item,
                timer_instance_ids,
                error_handling_process_instance_id,
            } => NodeInstanceContent::WorkItem {
                work_item_id: work_item_id.clone(),
                work_item: work_item.try_map_parameters(|params| self.variables(params))?,
                timer_instance_ids: timer_instance_ids.clone(),
                error_handling_process_instance_id: error_handling_process_instance_id.clone(),
            },
            NodeInstanceContent::SubProcess {
                process_instance_id,
                timer_instance_ids,
            } => NodeInstanceContent::SubProcess {
                process_instance_id: process_instance_id.clone(),
                timer_instance_ids: timer_instance_ids.clone(),
            },
            NodeInstanceContent::LambdaSubProcess {
                process_instance_id,
                timer_instance_ids,
            } => NodeInstanceContent::LambdaSubProcess {
                process_instance_id: process_instance_id.clone(),
                timer_instance_ids: timer_instance_ids.clone(),
            },
            NodeInstanceContent::Milestone { timer_instance_ids } => {
                NodeInstanceContent::Milestone {
                    timer_instance_ids: timer_instance_ids.clone(),
                }
            }
            NodeInstanceContent::State { timer_instance_ids } => NodeInstanceContent::State {
                timer_instance_ids: timer_instance_ids.clone(),
            },
            NodeInstanceContent::Timer { timer_id } => NodeInstanceContent::Timer {
                timer_id: timer_id.clone(),
            },
            NodeInstanceContent::Event => NodeInstanceContent::Event,
            NodeInstanceContent::Join { triggers } => NodeInstanceContent::Join {
                triggers: triggers.clone(),
            },
            NodeInstanceContent::Composite(state) => {
                NodeInstanceContent::Composite(self.composite(state)?)
            }
            NodeInstanceContent::Dynamic(state) => NodeInstanceContent::Dynamic(self.composite(state)?),
            NodeInstanceContent::EventSubProcess(state) => {
                NodeInstanceContent::EventSubProcess(self.composite(state)?)
            }
            NodeInstanceContent::ForEach(state) => {
                NodeInstanceContent::ForEach(self.for_each(node_instance_id, state)?)
            }
        })
    }
}
