// Node-instance types
//
// A node instance is one runtime activation record of a node definition. The
// kind-specific state is a closed sum type; the wire tag of each kind lives in
// `NodeInstanceType`.
//
// Every type here is generic over the variable-map representation `V`:
// - `VariableScope` for the live instance graph
// - `EncodedVariables` for a persisted snapshot

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codes::UnknownCode;
use crate::instance::SlaState;
use crate::variables::{EncodedVariables, VariableScope};
use crate::work_item::{HumanTaskWorkItem, WorkItem};

/// Node instances of one container, keyed (and therefore ordered) by id
pub type NodeInstances<V = VariableScope> = BTreeMap<String, NodeInstance<V>>;

/// Node instance as stored in a snapshot
pub type NodeInstanceSnapshot = NodeInstance<EncodedVariables>;

/// Wire discriminator of a node-instance kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeInstanceType {
    RuleSet,
    HumanTask,
    WorkItem,
    SubProcess,
    Milestone,
    Timer,
    Join,
    State,
    Composite,
    ForEach,
    Dynamic,
    Event,
    EventSubProcess,
    LambdaSubProcess,
}

impl NodeInstanceType {
    pub const ALL: [NodeInstanceType; 14] = [
        Self::RuleSet,
        Self::HumanTask,
        Self::WorkItem,
        Self::SubProcess,
        Self::Milestone,
        Self::Timer,
        Self::Join,
        Self::State,
        Self::Composite,
        Self::ForEach,
        Self::Dynamic,
        Self::Event,
        Self::EventSubProcess,
        Self::LambdaSubProcess,
    ];

    /// Tag written to the wire. Zero is reserved for the legacy end-of-sequence marker.
    pub fn tag(self) -> u16 {
        match self {
            Self::RuleSet => 1,
            Self::HumanTask => 2,
            Self::WorkItem => 3,
            Self::SubProcess => 4,
            Self::Milestone => 5,
            Self::Timer => 6,
            Self::Join => 7,
            Self::State => 8,
            Self::Composite => 9,
            Self::ForEach => 10,
            Self::Dynamic => 11,
            Self::Event => 12,
            Self::EventSubProcess => 13,
            Self::LambdaSubProcess => 14,
        }
    }

    pub fn from_tag(tag: u16) -> Result<Self, UnknownCode> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.tag() == tag)
            .ok_or(UnknownCode::new("node instance type", i32::from(tag)))
    }

    /// Kinds that own nested node instances and a variable scope
    pub fn is_container(self) -> bool {
        matches!(
            self,
            Self::Composite | Self::Dynamic | Self::EventSubProcess | Self::ForEach
        )
    }

    /// Kinds accepted as children of a for-each container
    pub fn is_composite_family(self) -> bool {
        matches!(self, Self::Composite | Self::Dynamic | Self::EventSubProcess)
    }
}

impl std::fmt::Display for NodeInstanceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::RuleSet => "rule_set",
            Self::HumanTask => "human_task",
            Self::WorkItem => "work_item",
            Self::SubProcess => "sub_process",
            Self::Milestone => "milestone",
            Self::Timer => "timer",
            Self::Join => "join",
            Self::State => "state",
            Self::Composite => "composite",
            Self::ForEach => "for_each",
            Self::Dynamic => "dynamic",
            Self::Event => "event",
            Self::EventSubProcess => "event_sub_process",
            Self::LambdaSubProcess => "lambda_sub_process",
        };
        write!(f, "{}", name)
    }
}

/// Membership record of one exclusive-choice group
///
/// Holds node-instance ids only; the node instances themselves are owned by
/// the enclosing container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusiveGroupInstance {
    pub node_instance_ids: BTreeSet<String>,
}

impl ExclusiveGroupInstance {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            node_instance_ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, node_instance_id: &str) -> bool {
        self.node_instance_ids.contains(node_instance_id)
    }
}

/// State of a composite, dynamic or event sub-process container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeState<V = VariableScope> {
    pub timer_instance_ids: Vec<String>,
    pub variables: V,
    pub node_instances: NodeInstances<V>,
    pub exclusive_groups: Vec<ExclusiveGroupInstance>,
    /// Loop scope id -> current nesting depth
    pub iteration_levels: BTreeMap<String, i32>,
}

/// State of a for-each container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForEachState<V = VariableScope> {
    pub variables: V,
    /// Composite-family children only
    pub node_instances: NodeInstances<V>,
    pub iteration_levels: BTreeMap<String, i32>,
}

/// Kind-specific state of a node instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeInstanceContent<V = VariableScope> {
    RuleSet {
        timer_instance_ids: Vec<String>,
        rule_flow_group: Option<String>,
        /// Fact name -> external form of its fact handle
        fact_handles: BTreeMap<String, String>,
    },
    HumanTask {
        work_item_id: String,
        work_item: HumanTaskWorkItem<V>,
        timer_instance_ids: Vec<String>,
        error_handling_process_instance_id: Option<String>,
    },
    WorkItem {
        work_item_id: String,
        work_item: WorkItem<V>,
        timer_instance_ids: Vec<String>,
        error_handling_process_instance_id: Option<String>,
    },
    SubProcess {
        process_instance_id: String,
        timer_instance_ids: Vec<String>,
    },
    LambdaSubProcess {
        process_instance_id: String,
        timer_instance_ids: Vec<String>,
    },
    Milestone {
        timer_instance_ids: Vec<String>,
    },
    State {
        timer_instance_ids: Vec<String>,
    },
    Timer {
        timer_id: String,
    },
    Event,
    Join {
        /// Incoming node id -> triggers received so far
        triggers: BTreeMap<String, i32>,
    },
    Composite(CompositeState<V>),
    Dynamic(CompositeState<V>),
    EventSubProcess(CompositeState<V>),
    ForEach(ForEachState<V>),
}

impl<V> NodeInstanceContent<V> {
    pub fn node_type(&self) -> NodeInstanceType {
        match self {
            Self::RuleSet { .. } => NodeInstanceType::RuleSet,
            Self::HumanTask { .. } => NodeInstanceType::HumanTask,
            Self::WorkItem { .. } => NodeInstanceType::WorkItem,
            Self::SubProcess { .. } => NodeInstanceType::SubProcess,
            Self::LambdaSubProcess { .. } => NodeInstanceType::LambdaSubProcess,
            Self::Milestone { .. } => NodeInstanceType::Milestone,
            Self::State { .. } => NodeInstanceType::State,
            Self::Timer { .. } => NodeInstanceType::Timer,
            Self::Event => NodeInstanceType::Event,
            Self::Join { .. } => NodeInstanceType::Join,
            Self::Composite(_) => NodeInstanceType::Composite,
            Self::Dynamic(_) => NodeInstanceType::Dynamic,
            Self::EventSubProcess(_) => NodeInstanceType::EventSubProcess,
            Self::ForEach(_) => NodeInstanceType::ForEach,
        }
    }

    /// Timer instances referenced by this node instance
    pub fn timer_instance_ids(&self) -> &[String] {
        match self {
            Self::RuleSet { timer_instance_ids, .. }
            | Self::HumanTask { timer_instance_ids, .. }
            | Self::WorkItem { timer_instance_ids, .. }
            | Self::SubProcess { timer_instance_ids, .. }
            | Self::LambdaSubProcess { timer_instance_ids, .. }
            | Self::Milestone { timer_instance_ids }
            | Self::State { timer_instance_ids } => timer_instance_ids,
            Self::Composite(state) | Self::Dynamic(state) | Self::EventSubProcess(state) => {
                &state.timer_instance_ids
            }
            Self::Timer { .. } | Self::Event | Self::Join { .. } | Self::ForEach(_) => &[],
        }
    }

    /// Nested node instances of a container kind
    pub fn children(&self) -> Option<&NodeInstances<V>> {
        match self {
            Self::Composite(state) | Self::Dynamic(state) | Self::EventSubProcess(state) => {
                Some(&state.node_instances)
            }
            Self::ForEach(state) => Some(&state.node_instances),
            _ => None,
        }
    }
}

/// One node instance and its kind-specific state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInstance<V = VariableScope> {
    /// Unique within the owning container
    pub id: String,
    /// Id of the node definition this instance activates
    pub node_id: String,
    /// Nesting depth of the scope the instance runs in
    pub level: i32,
    pub trigger_date: Option<DateTime<Utc>>,
    pub sla: SlaState,
    pub content: NodeInstanceContent<V>,
}

impl<V> NodeInstance<V> {
    pub fn new(
        id: impl Into<String>,
        node_id: impl Into<String>,
        content: NodeInstanceContent<V>,
    ) -> Self {
        Self {
            id: id.into(),
            node_id: node_id.into(),
            level: 0,
            trigger_date: None,
            sla: SlaState::default(),
            content,
        }
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    pub fn with_trigger_date(mut self, trigger_date: DateTime<Utc>) -> Self {
        self.trigger_date = Some(trigger_date);
        self
    }

    pub fn with_sla(mut self, sla: SlaState) -> Self {
        self.sla = sla;
        self
    }

    pub fn node_type(&self) -> NodeInstanceType {
        self.content.node_type()
    }

    /// Find a node instance by id in this subtree (including `self`)
    pub fn find(&self, id: &str) -> Option<&NodeInstance<V>> {
        if self.id == id {
            return Some(self);
        }
        self.content
            .children()
            .and_then(|children| children.values().find_map(|child| child.find(id)))
    }

    /// Depth of the deepest container chain below this instance (0 for leaves)
    pub fn nesting_depth(&self) -> usize {
        self.content
            .children()
            .map(|children| {
                1 + children
                    .values()
                    .map(NodeInstance::nesting_depth)
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }
}
