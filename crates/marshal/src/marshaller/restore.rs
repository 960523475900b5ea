//! Snapshot -> live instance
//!
//! The node-instance tree is rebuilt in full before any exclusive group is
//! resolved against it. Nothing is handed out until every step succeeded.

use std::sync::Arc;

use bpmn_marshal_schemas::{
    CompositeState, EncodedVariables, ExclusiveGroupInstance, ForEachState, NodeInstance,
    NodeInstanceContent, NodeInstances, ProcessInstanceSnapshot, VariableScope,
};

use super::MarshalError;
use crate::runtime::{ProcessDefinition, ProcessDefinitionResolver, ProcessInstance};
use crate::strategy::{StrategyRegistry, StrategySession};

/// One read call: resolves strategy indices against the recorded table
pub(super) struct Restore<'a> {
    session: StrategySession<'a>,
}

impl<'a> Restore<'a> {
    pub(super) fn new(
        registry: &'a StrategyRegistry,
        snapshot: &ProcessInstanceSnapshot,
    ) -> Result<Self, MarshalError> {
        Ok(Self {
            session: StrategySession::for_read(registry, &snapshot.strategies)?,
        })
    }

    pub(super) fn instance(
        mut self,
        snapshot: ProcessInstanceSnapshot,
        definition: Arc<ProcessDefinition>,
    ) -> Result<ProcessInstance, MarshalError> {
        for swimlane in snapshot.swimlane_actors.keys() {
            if !definition.has_swimlane(swimlane) {
                return Err(MarshalError::UnknownSwimlane {
                    swimlane: swimlane.clone(),
                    process_id: definition.id.clone(),
                });
            }
        }

        if let Some(timer) = snapshot.timers.values().find(|timer| timer.is_out_of_range()) {
            return Err(MarshalError::TimerOutOfRange {
                timer_instance_id: timer.id.clone(),
                delay_ms: timer.delay_ms,
                period_ms: timer.period_ms,
            });
        }

        let node_instances = self.node_instances(&snapshot.node_instances)?;
        verify_exclusive_groups(&snapshot.exclusive_groups, &node_instances)?;
        let variables = self.variables(&snapshot.variables)?;

        let mut instance = ProcessInstance::with_header(snapshot.header, definition);
        instance.swimlane_actors = snapshot.swimlane_actors;
        instance.node_instances = node_instances;
        instance.exclusive_groups = snapshot.exclusive_groups;
        instance.variables = variables;
        instance.iteration_levels = snapshot.iteration_levels;
        instance.timers = snapshot.timers;
        Ok(instance)
    }

    /// Decode variables; an empty payload means the variable is absent
    fn variables(&mut self, encoded: &EncodedVariables) -> Result<VariableScope, MarshalError> {
        let mut scope = VariableScope::new();
        for variable in encoded {
            if variable.payload.is_empty() {
                continue;
            }
            let value = self
                .session
                .strategy_at(variable.strategy_index)
                .and_then(|strategy| strategy.unmarshal(&variable.data_type, &variable.payload))
                .map_err(|source| MarshalError::CouldNotReloadVariable {
                    name: variable.name.clone(),
                    source,
                })?;
            if !value.is_null() {
                scope.set(variable.name.clone(), value);
            }
        }
        Ok(scope)
    }

    fn node_instances(
        &mut self,
        nodes: &NodeInstances<EncodedVariables>,
    ) -> Result<NodeInstances, MarshalError> {
        nodes
            .iter()
            .map(|(id, node)| Ok((id.clone(), self.node(node)?)))
            .collect()
    }

    fn node(&mut self, node: &NodeInstance<EncodedVariables>) -> Result<NodeInstance, MarshalError> {
        Ok(NodeInstance {
            id: node.id.clone(),
            node_id: node.node_id.clone(),
            level: node.level,
            trigger_date: node.trigger_date,
            sla: node.sla.clone(),
            content: self.content(&node.content)?,
        })
    }

    fn composite(
        &mut self,
        state: &CompositeState<EncodedVariables>,
    ) -> Result<CompositeState, MarshalError> {
        let node_instances = self.node_instances(&state.node_instances)?;
        verify_exclusive_groups(&state.exclusive_groups, &node_instances)?;
        Ok(CompositeState {
            timer_instance_ids: state.timer_instance_ids.clone(),
            variables: self.variables(&state.variables)?,
            node_instances,
            exclusive_groups: state.exclusive_groups.clone(),
            iteration_levels: state.iteration_levels.clone(),
        })
    }

    fn content(
        &mut self,
        content: &NodeInstanceContent<EncodedVariables>,
    ) -> Result<NodeInstanceContent, MarshalError> {
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
            NodeInstanceContent::ForEach(state) => NodeInstanceContent::ForEach(ForEachState {
                variables: self.variables(&state.variables)?,
                node_instances: self.node_instances(&state.node_instances)?,
                iteration_levels: state.iteration_levels.clone(),
            }),
        })
    }
}

/// Every group member must be a direct child of the container that owns the group
fn verify_exclusive_groups(
    groups: &[ExclusiveGroupInstance],
    node_instances: &NodeInstances,
) -> Result<(), MarshalError> {
    for group in groups {
        if let Some(missing) = group
            .node_instance_ids
            .iter()
            .find(|id| !node_instances.contains_key(*id))
        {
            return Err(MarshalError::ExclusiveGroupMemberNotFound(missing.clone()));
        }
    }
    Ok(())
}

/// Definition for `process_id`: the resolver first, then the embedded source
pub(super) fn resolve_definition(
    process_id: &str,
    embedded: Option<&str>,
    resolver: &dyn ProcessDefinitionResolver,
) -> Result<Arc<ProcessDefinition>, MarshalError> {
    if let Some(definition) = resolver.resolve(process_id) {
        return Ok(definition);
    }
    let Some(source) = embedded else {
        return Err(MarshalError::UnknownProcess(process_id.to_string()));
    };

    let definition: ProcessDefinition =
        serde_json::from_str(source).map_err(|e| MarshalError::InvalidDefinition {
            process_id: process_id.to_string(),
            message: e.to_string(),
        })?;
    if definition.id != process_id {
        return Err(MarshalError::InvalidDefinition {
            process_id: process_id.to_string(),
            message: format!("embedded definition is for process {}", definition.id),
        });
    }
    Ok(Arc::new(definition))
}
