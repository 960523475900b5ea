// Variable maps
//
// Two representations of the same name -> value mapping:
// - `VariableScope`: live values as held by a running instance (may contain nulls)
// - `EncodedVariables`: strategy-encoded payloads as persisted in a snapshot
//   (never contains nulls; see the marshaller)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Live variable scope of a process instance or composite container
///
/// Keys are unique; iteration order is by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableScope(BTreeMap<String, Value>);

impl VariableScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, returning the previous value if any
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All variables in name order, including null-valued ones
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Variables in name order, skipping null values
    pub fn non_null(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.iter().filter(|(_, v)| !v.is_null())
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for VariableScope {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// One variable after strategy encoding
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedVariable {
    pub name: String,
    /// Index into the snapshot's strategy table
    pub strategy_index: i32,
    /// Strategy-specific data type tag, checked again on decode
    pub data_type: String,
    /// Strategy output; an empty payload stands for an absent value
    pub payload: Vec<u8>,
}

/// Strategy-encoded variables, sorted by name
pub type EncodedVariables = Vec<EncodedVariable>;
