//! Process definitions and their resolution

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// The parts of a process definition the marshaller depends on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub package: Option<String>,
    /// Declared swimlane names
    #[serde(default)]
    pub swimlanes: BTreeSet<String>,
    /// Definitions built at runtime; embedded in snapshots so a reader without them can resume
    #[serde(default)]
    pub dynamic: bool,
}

impl ProcessDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: None,
            package: None,
            swimlanes: BTreeSet::new(),
            dynamic: false,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn with_swimlane(mut self, swimlane: impl Into<String>) -> Self {
        self.swimlanes.insert(swimlane.into());
        self
    }

    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    pub fn has_swimlane(&self, swimlane: &str) -> bool {
        self.swimlanes.contains(swimlane)
    }
}

/// Looks up process definitions by process id
pub trait ProcessDefinitionResolver: Send + Sync {
    fn resolve(&self, process_id: &str) -> Option<Arc<ProcessDefinition>>;
}

/// Definition registry backed by a map
#[derive(Default)]
pub struct InMemoryProcessDefinitionRegistry {
    definitions: RwLock<HashMap<String, Arc<ProcessDefinition>>>,
}

impl InMemoryProcessDefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, replacing any with the same id
    pub fn register(&self, definition: ProcessDefinition) -> Arc<ProcessDefinition> {
        let definition = Arc::new(definition);
        self.definitions
            .write()
            .insert(definition.id.clone(), Arc::clone(&definition));
        definition
    }

    pub fn remove(&self, process_id: &str) -> Option<Arc<ProcessDefinition>> {
        self.definitions.write().remove(process_id)
    }

    pub fn len(&self) -> usize {
        self.definitions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.read().is_empty()
    }
}

impl ProcessDefinitionResolver for InMemoryProcessDefinitionRegistry {
    fn resolve(&self, process_id: &str) -> Option<Arc<ProcessDefinition>> {
        self.definitions.read().get(process_id).cloned()
    }
}

impl fmt::Debug for InMemoryProcessDefinitionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let definitions = self.definitions.read();
        let mut ids: Vec<_> = definitions.keys().collect();
        ids.sort();
        f.debug_struct("InMemoryProcessDefinitionRegistry")
            .field("definitions", &ids)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_resolve() {
        let registry = InMemoryProcessDefinitionRegistry::new();
        registry.register(ProcessDefinition::new("orders", "Orders").with_swimlane("clerks"));

        let definition = registry.resolve("orders").unwrap();
        assert!(definition.has_swimlane("clerks"));
        assert!(registry.resolve("billing").is_none());
    }

    #[test]
    fn test_definition_json_defaults() {
        let definition: ProcessDefinition =
            serde_json::from_str(r#"{"id": "adhoc", "name": "Ad hoc"}"#).unwrap();
        assert!(!definition.dynamic);
        assert!(definition.swimlanes.is_empty());
    }
}
