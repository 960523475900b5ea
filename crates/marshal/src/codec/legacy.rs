//! Legacy stream codec
//!
//! Layout, all integers big-endian:
//!
//! ```text
//! i16  format version
//! i32  strategy count, then one UTF name per strategy
//! header fields
//! i32  swimlane count, then (UTF swimlane, UTF actor) pairs
//! node instances: (u16 type tag, node body)* terminated by u16 END
//! i32  exclusive group count, then per group an i32 count of UTF ids
//! i32  variable count, then (UTF name, i32 selector, UTF data type, bytes)
//! i32  iteration level count, then (UTF scope id, i32 level) pairs
//! i32  timer count, then timer bodies
//! optional long string: embedded process definition
//! ```
//!
//! Container bodies nest the same node-instance sequence, END-terminated.
//! A variable selector of `-2` is followed by a UTF strategy name instead of
//! an index into the strategy table.

use std::collections::{BTreeMap, BTreeSet};

use bpmn_marshal_schemas::{
    datetime_to_millis, millis_to_datetime, CompositeState, EncodedVariable, EncodedVariables,
    ExclusiveGroupInstance, ForEachState, HumanTaskWorkItem, NodeInstance, NodeInstanceContent,
    NodeInstanceSnapshot, NodeInstanceType, ProcessInstanceHeader, ProcessInstanceSnapshot,
    ProcessInstanceState, SlaCompliance, SlaState, TimerInstance, WorkItem, WorkItemState,
};
use chrono::{DateTime, Utc};

use super::stream::{DataInput, DataOutput, StreamError};
use super::{CodecError, SnapshotCodec, WireFormat};

/// Version written by this codec
pub const LEGACY_FORMAT_VERSION: i16 = 1;

/// Tag terminating a node-instance sequence
const END: u16 = 0;

/// Variable selector announcing an inline strategy name
const NAMED_STRATEGY: i32 = -2;

/// Repeat limit of a timer that repeats forever
const UNLIMITED_REPEATS: i32 = -1;

type EncodedWorkItem = WorkItem<EncodedVariables>;

#[derive(Debug, Clone)]
pub struct LegacyStreamCodec {
    max_nesting_depth: usize,
}

impl LegacyStreamCodec {
    pub fn new(max_nesting_depth: usize) -> Self {
        Self { max_nesting_depth }
    }
}

impl SnapshotCodec for LegacyStreamCodec {
    fn format(&self) -> WireFormat {
        WireFormat::Legacy
    }

    fn encode(&self, snapshot: &ProcessInstanceSnapshot) -> Result<Vec<u8>, CodecError> {
        let mut out = DataOutput::new();
        out.write_i16(LEGACY_FORMAT_VERSION);
        write_strings(&mut out, &snapshot.strategies)?;
        write_header(&mut out, &snapshot.header)?;

        out.write_len(snapshot.swimlane_actors.len())?;
        for (swimlane, actor_id) in &snapshot.swimlane_actors {
            out.write_utf(swimlane)?;
            out.write_utf(actor_id)?;
        }

        write_node_instances(&mut out, &snapshot.node_instances)?;
        write_exclusive_groups(&mut out, &snapshot.exclusive_groups)?;
        write_variables(&mut out, &snapshot.variables)?;
        write_iteration_levels(&mut out, &snapshot.iteration_levels)?;

        out.write_len(snapshot.timers.len())?;
        for timer in snapshot.timers.values() {
            write_timer(&mut out, timer)?;
        }

        out.write_bool(snapshot.process_definition_source.is_some());
        if let Some(source) = &snapshot.process_definition_source {
            out.write_long_string(source)?;
        }
        Ok(out.into_bytes())
    }

    fn decode(&self, bytes: &[u8]) -> Result<ProcessInstanceSnapshot, CodecError> {
        let mut reader = Reader {
            input: DataInput::new(bytes),
            strategies: Vec::new(),
            max_nesting_depth: self.max_nesting_depth,
        };
        let snapshot = reader.read_snapshot()?;
        reader.input.finish()?;
        Ok(snapshot)
    }
}

// ============================================================================
// Writing
// ============================================================================

fn write_strings<'a, I>(out: &mut DataOutput, values: I) -> Result<(), StreamError>
where
    I: IntoIterator<Item = &'a String>,
    I::IntoIter: ExactSizeIterator,
{
    let values = values.into_iter();
    out.write_len(values.len())?;
    for value in values {
        out.write_utf(value)?;
    }
    Ok(())
}

fn write_sla(out: &mut DataOutput, sla: &SlaState) -> Result<(), StreamError> {
    out.write_i32(sla.compliance.code());
    out.write_opt_i64(sla.due_date.map(datetime_to_millis));
    out.write_opt_utf(sla.timer_id.as_deref())
}

fn write_header(out: &mut DataOutput, header: &ProcessInstanceHeader) -> Result<(), StreamError> {
    out.write_utf(&header.id)?;
    out.write_utf(&header.process_id)?;
    out.write_opt_utf(header.process_version.as_deref())?;
    out.write_i32(header.state.code());
    out.write_opt_i64(header.start_date.map(datetime_to_millis));
    for field in [
        &header.parent_process_instance_id,
        &header.root_process_instance_id,
        &header.root_process_id,
        &header.correlation_key,
        &header.error_node_id,
        &header.error_message,
        &header.deployment_id,
        &header.description,
        &header.business_key,
        &header.reference_id,
    ] {
        out.write_opt_utf(field.as_deref())?;
    }
    write_sla(out, &header.sla)?;
    write_strings(out, &header.completed_node_ids)
}

fn write_variables(out: &mut DataOutput, variables: &EncodedVariables) -> Result<(), StreamError> {
    out.write_len(variables.len())?;
    for variable in variables {
        out.write_utf(&variable.name)?;
        out.write_i32(variable.strategy_index);
        out.write_utf(&variable.data_type)?;
        out.write_bytes(&variable.payload)?;
    }
    Ok(())
}

fn write_iteration_levels(
    out: &mut DataOutput,
    levels: &BTreeMap<String, i32>,
) -> Result<(), StreamError> {
    out.write_len(levels.len())?;
    for (scope_id, level) in levels {
        out.write_utf(scope_id)?;
        out.write_i32(*level);
    }
    Ok(())
}

fn write_exclusive_groups(
    out: &mut DataOutput,
    groups: &[ExclusiveGroupInstance],
) -> Result<(), StreamError> {
    out.write_len(groups.len())?;
    for group in groups {
        write_strings(out, &group.node_instance_ids)?;
    }
    Ok(())
}

fn write_timer(out: &mut DataOutput, timer: &TimerInstance) -> Result<(), StreamError> {
    out.write_utf(&timer.id)?;
    out.write_utf(&timer.timer_id)?;
    out.write_utf(&timer.process_instance_id)?;
    out.write_opt_utf(timer.node_instance_id.as_deref())?;
    out.write_i64(timer.delay_ms);
    out.write_i64(timer.period_ms);
    let repeat_limit = match timer.repeat_limit {
        Some(limit) => i32::try_from(limit)
            .map_err(|_| StreamError::RepeatLimitOutOfRange(i64::from(limit)))?,
        None => UNLIMITED_REPEATS,
    };
    out.write_i32(repeat_limit);
    out.write_i64(datetime_to_millis(timer.activated_time));
    out.write_opt_i64(timer.last_triggered.map(datetime_to_millis));
    out.write_u32(timer.trigger_count);
    Ok(())
}

fn read_repeat_limit(raw: i32) -> Result<Option<u32>, StreamError> {
    if raw == UNLIMITED_REPEATS {
        return Ok(None);
    }
    u32::try_from(raw)
        .map(Some)
        .map_err(|_| StreamError::RepeatLimitOutOfRange(i64::from(raw)))
}

fn write_work_item(out: &mut DataOutput, item: &EncodedWorkItem) -> Result<(), StreamError> {
    out.write_utf(&item.id)?;
    out.write_utf(&item.process_instance_id)?;
    out.write_utf(&item.name)?;
    out.write_i32(item.state.code());
    out.write_opt_utf(item.phase_id.as_deref())?;
    out.write_opt_utf(item.phase_status.as_deref())?;
    out.write_opt_utf(item.deployment_id.as_deref())?;
    out.write_utf(&item.node_id)?;
    out.write_utf(&item.node_instance_id)?;
    out.write_opt_i64(item.start_date.map(datetime_to_millis));
    out.write_opt_i64(item.complete_date.map(datetime_to_millis));
    write_variables(out, &item.parameters)
}

fn write_human_task(
    out: &mut DataOutput,
    task: &HumanTaskWorkItem<EncodedVariables>,
) -> Result<(), StreamError> {
    write_work_item(out, &task.work_item)?;
    for field in [
        &task.task_name,
        &task.task_description,
        &task.task_priority,
        &task.reference_name,
        &task.actual_owner,
    ] {
        out.write_opt_utf(field.as_deref())?;
    }
    for set in [
        &task.admin_users,
        &task.admin_groups,
        &task.potential_users,
        &task.potential_groups,
        &task.excluded_users,
    ] {
        write_strings(out, set)?;
    }
    Ok(())
}

fn write_composite(
    out: &mut DataOutput,
    state: &CompositeState<EncodedVariables>,
) -> Result<(), StreamError> {
    write_strings(out, &state.timer_instance_ids)?;
    write_variables(out, &state.variables)?;
    write_node_instances(out, &state.node_instances)?;
    write_exclusive_groups(out, &state.exclusive_groups)?;
    write_iteration_levels(out, &state.iteration_levels)
}

fn write_content(
    out: &mut DataOutput,
    content: &NodeInstanceContent<EncodedVariables>,
) -> Result<(), StreamError> {
    match content {
        NodeInstanceContent::RuleSet {
            timer_instance_ids,
            rule_flow_group,
            fact_handles,
        } => {
            write_strings(out, timer_instance_ids)?;
            out.write_opt_utf(rule_flow_group.as_deref())?;
            out.write_len(fact_handles.len())?;
            for (name, external_form) in fact_handles {
                out.write_utf(name)?;
                out.write_utf(external_form)?;
            }
        }
        NodeInstanceContent::HumanTask {
            work_item_id,
            work_item,
            timer_instance_ids,
            error_handling_process_instance_id,
        } => {
            out.write_utf(work_item_id)?;
            write_human_task(out, work_item)?;
            write_strings(out, timer_instance_ids)?;
            out.write_opt_utf(error_handling_process_instance_id.as_deref())?;
        }
        NodeInstanceContent::WorkItem {
            work_item_id,
            work_item,
            timer_instance_ids,
            error_handling_process_instance_id,
        } => {
            out.write_utf(work_item_id)?;
            write_work_item(out, work_item)?;
            write_strings(out, timer_instance_ids)?;
            out.write_opt_utf(error_handling_process_instance_id.as_deref())?;
        }
        NodeInstanceContent::SubProcess {
            process_instance_id,
            timer_instance_ids,
        }
        | NodeInstanceContent::LambdaSubProcess {
            process_instance_id,
            timer_instance_ids,
        } => {
            out.write_utf(process_instance_id)?;
            write_strings(out, timer_instance_ids)?;
        }
        NodeInstanceContent::Milestone { timer_instance_ids }
        | NodeInstanceContent::State { timer_instance_ids } => {
            write_strings(out, timer_instance_ids)?;
        }
        NodeInstanceContent::Timer { timer_id } => out.write_utf(timer_id)?,
        NodeInstanceContent::Event => {}
        NodeInstanceContent::Join { triggers } => {
            out.write_len(triggers.len())?;
            for (node_id, count) in triggers {
                out.write_utf(node_id)?;
                out.write_i32(*count);
            }
        }
        NodeInstanceContent::Composite(state)
        | NodeInstanceContent::Dynamic(state)
        | NodeInstanceContent::EventSubProcess(state) => write_composite(out, state)?,
        NodeInstanceContent::ForEach(state) => {
            write_variables(out, &state.variables)?;
            write_node_instances(out, &state.node_instances)?;
            write_iteration_levels(out, &state.iteration_levels)?;
        }
    }
    Ok(())
}

fn write_node_instances(
    out: &mut DataOutput,
    nodes: &BTreeMap<String, NodeInstanceSnapshot>,
) -> Result<(), StreamError> {
    for node in nodes.values() {
        out.write_u16(node.node_type().tag());
        out.write_utf(&node.id)?;
        out.write_utf(&node.node_id)?;
        out.write_i32(node.level);
        out.write_opt_i64(node.trigger_date.map(datetime_to_millis));
        write_sla(out, &node.sla)?;
        write_content(out, &node.content)?;
    }
    out.write_u16(END);
    Ok(())
}

// ============================================================================
// Reading
// ============================================================================

struct Reader<'a> {
    input: DataInput<'a>,
    /// Strategy table, extended by inline strategy names
    strategies: Vec<String>,
    max_nesting_depth: usize,
}

impl Reader<'_> {
    fn read_snapshot(&mut self) -> Result<ProcessInstanceSnapshot, CodecError> {
        let version = self.input.read_i16()?;
        if version != LEGACY_FORMAT_VERSION {
            return Err(StreamError::UnsupportedVersion(version).into());
        }
        self.strategies = self.read_strings()?;
        let header = self.read_header()?;

        let mut swimlane_actors = BTreeMap::new();
        for _ in 0..self.input.read_len()? {
            let swimlane = self.input.read_utf()?;
            swimlane_actors.insert(swimlane, self.input.read_utf()?);
        }

        let node_instances = self.read_node_instances(0)?;
        let exclusive_groups = self.read_exclusive_groups()?;
        let variables = self.read_variables()?;
        let iteration_levels = self.read_iteration_levels()?;

        let mut timers = BTreeMap::new();
        for _ in 0..self.input.read_len()? {
            let timer = self.read_timer()?;
            timers.insert(timer.id.clone(), timer);
        }

        let process_definition_source = if self.input.read_bool()? {
            Some(self.input.read_long_string()?)
        } else {
            None
        };

        Ok(ProcessInstanceSnapshot {
            strategies: std::mem::take(&mut self.strategies),
            header,
            swimlane_actors,
            node_instances,
            exclusive_groups,
            variables,
            iteration_levels,
            timers,
            process_definition_source,
        })
    }

    fn read_strings<C: FromIterator<String>>(&mut self) -> Result<C, StreamError> {
        let len = self.input.read_len()?;
        (0..len).map(|_| self.input.read_utf()).collect()
    }

    fn read_date(&mut self) -> Result<DateTime<Utc>, StreamError> {
        let millis = self.input.read_i64()?;
        millis_to_datetime(millis).ok_or(StreamError::InvalidTimestamp(millis))
    }

    fn read_opt_date(&mut self) -> Result<Option<DateTime<Utc>>, StreamError> {
        match self.input.read_opt_i64()? {
            Some(millis) => millis_to_datetime(millis)
                .map(Some)
                .ok_or(StreamError::InvalidTimestamp(millis)),
            None => Ok(None),
        }
    }

    fn read_sla(&mut self) -> Result<SlaState, CodecError> {
        Ok(SlaState {
            compliance: SlaCompliance::try_from(self.input.read_i32()?)?,
            due_date: self.read_opt_date()?,
            timer_id: self.input.read_opt_utf()?,
        })
    }

    fn read_header(&mut self) -> Result<ProcessInstanceHeader, CodecError> {
        let id = self.input.read_utf()?;
        let process_id = self.input.read_utf()?;
        let process_version = self.input.read_opt_utf()?;
        let state = ProcessInstanceState::try_from(self.input.read_i32()?)?;
        let start_date = self.read_opt_date()?;
        Ok(ProcessInstanceHeader {
            id,
            process_id,
            process_version,
            state,
            start_date,
            parent_process_instance_id: self.input.read_opt_utf()?,
            root_process_instance_id: self.input.read_opt_utf()?,
            root_process_id: self.input.read_opt_utf()?,
            correlation_key: self.input.read_opt_utf()?,
            error_node_id: self.input.read_opt_utf()?,
            error_message: self.input.read_opt_utf()?,
            deployment_id: self.input.read_opt_utf()?,
            description: self.input.read_opt_utf()?,
            business_key: self.input.read_opt_utf()?,
            reference_id: self.input.read_opt_utf()?,
            sla: self.read_sla()?,
            completed_node_ids: self.read_strings()?,
        })
    }

    fn read_variables(&mut self) -> Result<EncodedVariables, StreamError> {
        let len = self.input.read_len()?;
        let mut variables = Vec::new();
        for _ in 0..len {
            let name = self.input.read_utf()?;
            let strategy_index = match self.input.read_i32()? {
                index if index >= 0 => index,
                NAMED_STRATEGY => {
                    let strategy = self.input.read_utf()?;
                    self.strategy_index_for(strategy)
                }
                other => return Err(StreamError::InvalidStrategySelector(other)),
            };
            variables.push(EncodedVariable {
                name,
                strategy_index,
                data_type: self.input.read_utf()?,
                payload: self.input.read_bytes()?,
            });
        }
        Ok(variables)
    }

    fn strategy_index_for(&mut self, name: String) -> i32 {
        match self.strategies.iter().position(|s| *s == name) {
            Some(pos) => pos as i32,
            None => {
                self.strategies.push(name);
                (self.strategies.len() - 1) as i32
            }
        }
    }

    fn read_iteration_levels(&mut self) -> Result<BTreeMap<String, i32>, StreamError> {
        let mut levels = BTreeMap::new();
        for _ in 0..self.input.read_len()? {
            let scope_id = self.input.read_utf()?;
            levels.insert(scope_id, self.input.read_i32()?);
        }
        Ok(levels)
    }

    fn read_exclusive_groups(&mut self) -> Result<Vec<ExclusiveGroupInstance>, StreamError> {
        let len = self.input.read_len()?;
        (0..len)
            .map(|_| {
                Ok(ExclusiveGroupInstance {
                    node_instance_ids: self.read_strings::<BTreeSet<String>>()?,
                })
            })
            .collect()
    }

    fn read_timer(&mut self) -> Result<TimerInstance, StreamError> {
        Ok(TimerInstance {
            id: self.input.read_utf()?,
            timer_id: self.input.read_utf()?,
            process_instance_id: self.input.read_utf()?,
            node_instance_id: self.input.read_opt_utf()?,
            delay_ms: self.input.read_i64()?,
            period_ms: self.input.read_i64()?,
            repeat_limit: read_repeat_limit(self.input.read_i32()?)?,
            activated_time: self.read_date()?,
            last_triggered: self.read_opt_date()?,
            trigger_count: self.input.read_u32()?,
        })
    }

    fn read_work_item(&mut self) -> Result<EncodedWorkItem, CodecError> {
        let id = self.input.read_utf()?;
        let process_instance_id = self.input.read_utf()?;
        let name = self.input.read_utf()?;
        let state = WorkItemState::try_from(self.input.read_i32()?)?;
        Ok(WorkItem {
            id,
            process_instance_id,
            name,
            state,
            phase_id: self.input.read_opt_utf()?,
            phase_status: self.input.read_opt_utf()?,
            deployment_id: self.input.read_opt_utf()?,
            node_id: self.input.read_utf()?,
            node_instance_id: self.input.read_utf()?,
            start_date: self.read_opt_date()?,
            complete_date: self.read_opt_date()?,
            parameters: self.read_variables()?,
        })
    }

    fn read_human_task(&mut self) -> Result<HumanTaskWorkItem<EncodedVariables>, CodecError> {
        Ok(HumanTaskWorkItem {
            work_item: self.read_work_item()?,
            task_name: self.input.read_opt_utf()?,
            task_description: self.input.read_opt_utf()?,
            task_priority: self.input.read_opt_utf()?,
            reference_name: self.input.read_opt_utf()?,
            actual_owner: self.input.read_opt_utf()?,
            admin_users: self.read_strings()?,
            admin_groups: self.read_strings()?,
            potential_users: self.read_strings()?,
            potential_groups: self.read_strings()?,
            excluded_users: self.read_strings()?,
        })
    }

    fn read_composite(&mut self, depth: usize) -> Result<CompositeState<EncodedVariables>, CodecError> {
        Ok(CompositeState {
            timer_instance_ids: self.read_strings()?,
            variables: self.read_variables()?,
            node_instances: self.read_node_instances(depth)?,
            exclusive_groups: self.read_exclusive_groups()?,
            iteration_levels: self.read_iteration_levels()?,
        })
    }

    /// Content of a node at container depth `depth`
    fn read_content(
        &mut self,
        node_type: NodeInstanceType,
        depth: usize,
    ) -> Result<NodeInstanceContent<EncodedVariables>, CodecError> {
        let child_depth = depth + 1;
        if node_type.is_container() && child_depth > self.max_nesting_depth {
            return Err(CodecError::NestingTooDeep {
                depth: child_depth,
                max: self.max_nesting_depth,
            });
        }

        Ok(match node_type {
            NodeInstanceType::RuleSet => {
                let timer_instance_ids = self.read_strings()?;
                let rule_flow_group = self.input.read_opt_utf()?;
                let mut fact_handles = BTreeMap::new();
                for _ in 0..self.input.read_len()? {
                    let name = self.input.read_utf()?;
                    fact_handles.insert(name, self.input.read_utf()?);
                }
                NodeInstanceContent::RuleSet {
                    timer_instance_ids,
                    rule_flow_group,
                    fact_handles,
                }
            }
            NodeInstanceType::HumanTask => NodeInstanceContent::HumanTask {
                work_item_id: self.input.read_utf()?,
                work_item: self.read_human_task()?,
                timer_instance_ids: self.read_strings()?,
                error_handling_process_instance_id: self.input.read_opt_utf()?,
            },
            NodeInstanceType::WorkItem => NodeInstanceContent::WorkItem {
                work_item_id: self.input.read_utf()?,
                work_item: self.read_work_item()?,
                timer_instance_ids: self.read_strings()?,
                error_handling_process_instance_id: self.input.read_opt_utf()?,
            },
            NodeInstanceType::SubProcess => NodeInstanceContent::SubProcess {
                process_instance_id: self.input.read_utf()?,
                timer_instance_ids: self.read_strings()?,
            },
            NodeInstanceType::LambdaSubProcess => NodeInstanceContent::LambdaSubProcess {
                process_instance_id: self.input.read_utf()?,
                timer_instance_ids: self.read_strings()?,
            },
            NodeInstanceType::Milestone => NodeInstanceContent::Milestone {
                timer_instance_ids: self.read_strings()?,
            },
            NodeInstanceType::State => NodeInstanceContent::State {
                timer_instance_ids: self.read_strings()?,
            },
            NodeInstanceType::Timer => NodeInstanceContent::Timer {
                timer_id: self.input.read_utf()?,
            },
            NodeInstanceType::Event => NodeInstanceContent::Event,
            NodeInstanceType::Join => {
                let mut triggers = BTreeMap::new();
                for _ in 0..self.input.read_len()? {
                    let node_id = self.input.read_utf()?;
                    triggers.insert(node_id, self.input.read_i32()?);
                }
                NodeInstanceContent::Join { triggers }
            }
            NodeInstanceType::Composite => {
                NodeInstanceContent::Composite(self.read_composite(child_depth)?)
            }
            NodeInstanceType::Dynamic => NodeInstanceContent::Dynamic(self.read_composite(child_depth)?),
            NodeInstanceType::EventSubProcess => {
                NodeInstanceContent::EventSubProcess(self.read_composite(child_depth)?)
            }
            NodeInstanceType::ForEach => NodeInstanceContent::ForEach(ForEachState {
                variables: self.read_variables()?,
                node_instances: self.read_node_instances(child_depth)?,
                iteration_levels: self.read_iteration_levels()?,
            }),
        })
    }

    /// Read an END-terminated node-instance sequence at container depth `depth`
    fn read_node_instances(
        &mut self,
        depth: usize,
    ) -> Result<BTreeMap<String, NodeInstanceSnapshot>, CodecError> {
        let mut nodes = BTreeMap::new();
        loop {
            let tag = self.input.read_u16()?;
            if tag == END {
                return Ok(nodes);
            }
            let node_type =
                NodeInstanceType::from_tag(tag).map_err(|_| CodecError::UnknownNodeType(tag))?;

            let id = self.input.read_utf()?;
            let node_id = self.input.read_utf()?;
            let level = self.input.read_i32()?;
            let trigger_date = self.read_opt_date()?;
            let sla = self.read_sla()?;
            let content = self.read_content(node_type, depth)?;

            if nodes.contains_key(&id) {
                return Err(CodecError::DuplicateNodeInstance(id));
            }
            nodes.insert(
                id.clone(),
                NodeInstance {
                    id,
                    node_id,
                    level,
                    trigger_date,
                    sla,
                    content,
                },
            );
        }
    }
}
