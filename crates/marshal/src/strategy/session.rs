//! Per-call strategy index table

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::{ObjectMarshallingStrategy, StrategyError, StrategyRegistry};

/// Strategy bookkeeping for exactly one read or write call
///
/// On write, every strategy used gets a stable index in first-use order. On
/// read, the table persisted by the writer is resolved against the registry
/// and indices are looked up without inspecting values.
pub struct StrategySession<'a> {
    registry: &'a StrategyRegistry,
    table: Vec<Arc<dyn ObjectMarshallingStrategy>>,
    indices: HashMap<String, i32>,
}

impl<'a> StrategySession<'a> {
    /// Empty session for a write call
    pub fn for_write(registry: &'a StrategyRegistry) -> Self {
        Self {
            registry,
            table: Vec::new(),
            indices: HashMap::new(),
        }
    }

    /// Session for a read call, seeded with the persisted strategy table
    ///
    /// Entries keep their persisted positions; a name listed twice resolves
    /// at both indices.
    pub fn for_read(registry: &'a StrategyRegistry, names: &[String]) -> Result<Self, StrategyError> {
        let mut session = Self::for_write(registry);
        for name in names {
            let strategy = session.lookup(name)?;
            let index = session.table.len() as i32;
            session.indices.entry(name.clone()).or_insert(index);
            session.table.push(strategy);
        }
        Ok(session)
    }

    fn lookup(&self, name: &str) -> Result<Arc<dyn ObjectMarshallingStrategy>, StrategyError> {
        self.registry
            .by_name(name)
            .ok_or_else(|| StrategyError::UnknownStrategy(name.to_string()))
    }

    /// Strategy for a value about to be written
    pub fn select_strategy(
        &self,
        value: &Value,
    ) -> Result<Arc<dyn ObjectMarshallingStrategy>, StrategyError> {
        self.registry.select(value)
    }

    /// Index of `strategy` in this session, assigning the next one on first use
    pub fn record_usage(&mut self, strategy: &Arc<dyn ObjectMarshallingStrategy>) -> i32 {
        if let Some(index) = self.indices.get(strategy.name()) {
            return *index;
        }
        let index = self.table.len() as i32;
        self.indices.insert(strategy.name().to_string(), index);
        self.table.push(Arc::clone(strategy));
        index
    }

    pub fn strategy_at(&self, index: i32) -> Result<Arc<dyn ObjectMarshallingStrategy>, StrategyError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.table.get(i))
            .cloned()
            .ok_or(StrategyError::UnrecordedIndex(index))
    }

    /// Names by index, as persisted in a snapshot
    pub fn table(&self) -> Vec<String> {
        self.table.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
