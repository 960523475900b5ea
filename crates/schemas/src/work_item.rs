// Work item types
//
// Snapshot of the work item attached to a work-item or human-task node instance.
// Generic over the parameter-map representation, like the node-instance types.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codes::UnknownCode;
use crate::variables::VariableScope;

/// Work item lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemState {
    #[default]
    Pending,
    Active,
    Completed,
    Aborted,
}

impl WorkItemState {
    pub fn code(self) -> i32 {
        match self {
            Self::Pending => 0,
            Self::Active => 1,
            Self::Completed => 2,
            Self::Aborted => 3,
        }
    }
}

impl TryFrom<i32> for WorkItemState {
    type Error = UnknownCode;

    fn try_from(code: i32) -> Result<Self, UnknownCode> {
        match code {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Active),
            2 => Ok(Self::Completed),
            3 => Ok(Self::Aborted),
            other => Err(UnknownCode::new("work item state", other)),
        }
    }
}

/// Work item snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkItem<V = VariableScope> {
    pub id: String,
    pub process_instance_id: String,
    pub name: String,
    pub state: WorkItemState,
    pub phase_id: Option<String>,
    pub phase_status: Option<String>,
    pub deployment_id: Option<String>,
    /// Node definition that created the work item
    pub node_id: String,
    /// Node instance that owns the work item
    pub node_instance_id: String,
    pub start_date: Option<DateTime<Utc>>,
    pub complete_date: Option<DateTime<Utc>>,
    pub parameters: V,
}

impl<V: Default> WorkItem<V> {
    pub fn new(
        id: impl Into<String>,
        process_instance_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            process_instance_id: process_instance_id.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

impl<V> WorkItem<V> {
    /// Copy of this work item with its parameters converted by `f`
    pub fn try_map_parameters<W, E>(
        &self,
        f: impl FnOnce(&V) -> Result<W, E>,
    ) -> Result<WorkItem<W>, E> {
        Ok(WorkItem {
            id: self.id.clone(),
            process_instance_id: self.process_instance_id.clone(),
            name: self.name.clone(),
            state: self.state,
            phase_id: self.phase_id.clone(),
            phase_status: self.phase_status.clone(),
            deployment_id: self.deployment_id.clone(),
            node_id: self.node_id.clone(),
            node_instance_id: self.node_instance_id.clone(),
            start_date: self.start_date,
            complete_date: self.complete_date,
            parameters: f(&self.parameters)?,
        })
    }
}

/// Human task work item: a work item plus task metadata and role assignments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HumanTaskWorkItem<V = VariableScope> {
    pub work_item: WorkItem<V>,
    pub task_name: Option<String>,
    pub task_description: Option<String>,
    pub task_priority: Option<String>,
    pub reference_name: Option<String>,
    pub actual_owner: Option<String>,
    pub admin_users: BTreeSet<String>,
    pub admin_groups: BTreeSet<String>,
    pub potential_users: BTreeSet<String>,
    pub potential_groups: BTreeSet<String>,
    pub excluded_users: BTreeSet<String>,
}

impl<V> HumanTaskWorkItem<V> {
    pub fn new(work_item: WorkItem<V>) -> Self {
        Self {
            work_item,
            task_name: None,
            task_description: None,
            task_priority: None,
            reference_name: None,
            actual_owner: None,
            admin_users: BTreeSet::new(),
            admin_groups: BTreeSet::new(),
            potential_users: BTreeSet::new(),
            potential_groups: BTreeSet::new(),
            excluded_users: BTreeSet::new(),
        }
    }

    /// Copy of this task with the work item parameters converted by `f`
    pub fn try_map_parameters<W, E>(
        &self,
        f: impl FnOnce(&V) -> Result<W, E>,
    ) -> Result<HumanTaskWorkItem<W>, E> {
        Ok(HumanTaskWorkItem {
            work_item: self.work_item.try_map_parameters(f)?,
            task_name: self.task_name.clone(),
            task_description: self.task_description.clone(),
            task_priority: self.task_priority.clone(),
            reference_name: self.reference_name.clone(),
            actual_owner: self.actual_owner.clone(),
            admin_users: self.admin_users.clone(),
            admin_groups: self.admin_groups.clone(),
            potential_users: self.potential_users.clone(),
            potential_groups: self.potential_groups.clone(),
            excluded_users: self.excluded_users.clone(),
        })
    }
}
