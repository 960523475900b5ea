//! Process-wide strategy registry

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use super::{value_kind, JsonStrategy, ObjectMarshallingStrategy, PrimitiveStrategy, StrategyError};

/// Ordered set of strategies; selection returns the first that accepts a value
///
/// Read-mostly and safe to share between concurrent marshaller calls.
pub struct StrategyRegistry {
    strategies: RwLock<Vec<Arc<dyn ObjectMarshallingStrategy>>>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl StrategyRegistry {
    /// Create a registry without any strategies
    pub fn empty() -> Self {
        Self {
            strategies: RwLock::new(Vec::new()),
        }
    }

    /// Primitive strategy first, JSON catch-all last
    pub fn with_defaults() -> Self {
        let registry = Self::empty();
        registry.register(Arc::new(PrimitiveStrategy));
        registry.register(Arc::new(JsonStrategy));
        registry
    }

    /// Append a strategy; a strategy with the same name is replaced in place
    pub fn register(&self, strategy: Arc<dyn ObjectMarshallingStrategy>) {
        let mut strategies = self.strategies.write();
        match strategies.iter().position(|s| s.name() == strategy.name()) {
            Some(pos) => strategies[pos] = strategy,
            None => strategies.push(strategy),
        }
    }

    /// Insert a strategy ahead of all registered ones
    pub fn register_first(&self, strategy: Arc<dyn ObjectMarshallingStrategy>) {
        let mut strategies = self.strategies.write();
        strategies.retain(|s| s.name() != strategy.name());
        strategies.insert(0, strategy);
    }

    /// First registered strategy accepting `value`
    pub fn select(&self, value: &Value) -> Result<Arc<dyn ObjectMarshallingStrategy>, StrategyError> {
        self.strategies
            .read()
            .iter()
            .find(|s| s.accept(value))
            .cloned()
            .ok_or(StrategyError::NoStrategy(value_kind(value)))
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<dyn ObjectMarshallingStrategy>> {
        self.strategies
            .read()
            .iter()
            .find(|s| s.name() == name)
            .cloned()
    }

    /// Registered strategy names in selection order
    pub fn names(&self) -> Vec<String> {
        self.strategies
            .read()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.read().is_empty()
    }
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}
