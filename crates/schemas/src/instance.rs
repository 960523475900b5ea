// Process-instance header types
//
// The scalar part of a process instance: identity, lifecycle state, linkage to
// parent/root instances, error and SLA bookkeeping. Shared verbatim by the live
// runtime instance and the persisted snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codes::UnknownCode;

/// Lifecycle state of a process instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessInstanceState {
    #[default]
    Pending,
    Active,
    Completed,
    Aborted,
    Suspended,
    Error,
}

impl ProcessInstanceState {
    /// Integer code persisted on the wire
    pub fn code(self) -> i32 {
        match self {
            Self::Pending => 0,
            Self::Active => 1,
            Self::Completed => 2,
            Self::Aborted => 3,
            Self::Suspended => 4,
            Self::Error => 5,
        }
    }

    /// Inverse of [`code`](Self::code)
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Pending),
            1 => Some(Self::Active),
            2 => Some(Self::Completed),
            3 => Some(Self::Aborted),
            4 => Some(Self::Suspended),
            5 => Some(Self::Error),
            _ => None,
        }
    }
}

impl TryFrom<i32> for ProcessInstanceState {
    type Error = UnknownCode;

    fn try_from(code: i32) -> Result<Self, UnknownCode> {
        Self::from_code(code).ok_or(UnknownCode::new("process instance state", code))
    }
}

impl std::fmt::Display for ProcessInstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
            Self::Suspended => write!(f, "suspended"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// SLA compliance of a process or node instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaCompliance {
    /// No SLA configured
    #[default]
    NotApplicable,
    Pending,
    Met,
    Violated,
    Aborted,
}

impl SlaCompliance {
    pub fn code(self) -> i32 {
        match self {
            Self::NotApplicable => 0,
            Self::Pending => 1,
            Self::Met => 2,
            Self::Violated => 3,
            Self::Aborted => 4,
        }
    }
}

impl TryFrom<i32> for SlaCompliance {
    type Error = UnknownCode;

    fn try_from(code: i32) -> Result<Self, UnknownCode> {
        match code {
            0 => Ok(Self::NotApplicable),
            1 => Ok(Self::Pending),
            2 => Ok(Self::Met),
            3 => Ok(Self::Violated),
            4 => Ok(Self::Aborted),
            other => Err(UnknownCode::new("sla compliance", other)),
        }
    }
}

/// SLA tracking fields carried by both process and node instances
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaState {
    pub compliance: SlaCompliance,
    pub due_date: Option<DateTime<Utc>>,
    /// Id of the timer instance that fires when the SLA is breached
    pub timer_id: Option<String>,
}

impl SlaState {
    /// SLA that is pending until `due_date`
    pub fn pending(due_date: DateTime<Utc>, timer_id: impl Into<String>) -> Self {
        Self {
            compliance: SlaCompliance::Pending,
            due_date: Some(due_date),
            timer_id: Some(timer_id.into()),
        }
    }
}

/// Scalar header of a process instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInstanceHeader {
    pub id: String,
    pub process_id: String,
    pub process_version: Option<String>,
    pub state: ProcessInstanceState,
    pub start_date: Option<DateTime<Utc>>,

    // Sub-process linkage
    pub parent_process_instance_id: Option<String>,
    pub root_process_instance_id: Option<String>,
    pub root_process_id: Option<String>,

    pub correlation_key: Option<String>,
    pub error_node_id: Option<String>,
    pub error_message: Option<String>,
    pub deployment_id: Option<String>,
    pub description: Option<String>,
    pub business_key: Option<String>,
    pub reference_id: Option<String>,

    pub sla: SlaState,

    /// Node-definition ids that have completed, in completion order, without duplicates
    pub completed_node_ids: Vec<String>,
}

impl ProcessInstanceHeader {
    pub fn new(id: impl Into<String>, process_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            process_id: process_id.into(),
            ..Default::default()
        }
    }

    /// Record a completed node, keeping the set free of duplicates
    pub fn add_completed_node_id(&mut self, node_id: impl Into<String>) {
        let node_id = node_id.into();
        if !self.completed_node_ids.contains(&node_id) {
            self.completed_node_ids.push(node_id);
        }
    }
}
