//! Variable marshalling strategies
//!
//! A strategy turns one runtime value into bytes and back. The
//! [`StrategyRegistry`] is shared process-wide and picks the first strategy
//! that accepts a value; a [`StrategySession`] is created per read or write
//! call and owns the index table that maps stored indices to strategies.

mod json;
mod primitive;
mod registry;
mod session;

pub use json::JsonStrategy;
pub use primitive::PrimitiveStrategy;
pub use registry::StrategyRegistry;
pub use session::StrategySession;

use serde_json::Value;

/// Errors from strategy lookup and value (de)serialization
#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    /// No registered strategy accepts the value
    #[error("no marshalling strategy accepts a value of kind {0}")]
    NoStrategy(&'static str),

    /// Strategy name stored in a stream is not registered
    #[error("unknown marshalling strategy: {0}")]
    UnknownStrategy(String),

    /// Stored strategy index was never recorded in this session
    #[error("strategy index {0} was not recorded")]
    UnrecordedIndex(i32),

    #[error("strategy {strategy} failed to encode value: {message}")]
    Encode { strategy: String, message: String },

    #[error("strategy {strategy} failed to decode {data_type}: {message}")]
    Decode {
        strategy: String,
        data_type: String,
        message: String,
    },
}

/// Pluggable codec for variable values
pub trait ObjectMarshallingStrategy: Send + Sync {
    /// Stable name persisted in the strategy table
    fn name(&self) -> &str;

    /// Whether this strategy can encode the value
    fn accept(&self, value: &Value) -> bool;

    /// Type tag stored next to the payload and handed back to [`unmarshal`](Self::unmarshal)
    fn data_type(&self, value: &Value) -> String;

    fn marshal(&self, value: &Value) -> Result<Vec<u8>, StrategyError>;

    fn unmarshal(&self, data_type: &str, bytes: &[u8]) -> Result<Value, StrategyError>;
}

/// Kind name of a JSON value, used in diagnostics and as a data type tag
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
