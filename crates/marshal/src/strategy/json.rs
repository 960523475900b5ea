//! Catch-all strategy storing values as JSON text

use serde_json::Value;

use super::{value_kind, ObjectMarshallingStrategy, StrategyError};

/// Accepts any value; registered last so that more specific strategies win
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonStrategy;

impl JsonStrategy {
    pub const NAME: &'static str = "json";
}

impl ObjectMarshallingStrategy for JsonStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn accept(&self, _value: &Value) -> bool {
        true
    }

    fn data_type(&self, value: &Value) -> String {
        value_kind(value).to_string()
    }

    fn marshal(&self, value: &Value) -> Result<Vec<u8>, StrategyError> {
        serde_json::to_vec(value).map_err(|e| StrategyError::Encode {
            strategy: Self::NAME.to_string(),
            message: e.to_string(),
        })
    }

    fn unmarshal(&self, data_type: &str, bytes: &[u8]) -> Result<Value, StrategyError> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| StrategyError::Decode {
            strategy: Self::NAME.to_string(),
            data_type: data_type.to_string(),
            message: e.to_string(),
        })?;
        if value_kind(&value) != data_type {
            return Err(StrategyError::Decode {
                strategy: Self::NAME.to_string(),
                data_type: data_type.to_string(),
                message: format!("payload holds {}", value_kind(&value)),
            });
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_value() {
        let value = json!({"items": [1, 2, {"sku": "A-1"}], "total": 12.5});
        let bytes = JsonStrategy.marshal(&value).unwrap();
        let restored = JsonStrategy.unmarshal("object", &bytes).unwrap();
        assert_eq!(restored, value);
    }

    #[test]
    fn test_corrupt_payload() {
        let err = JsonStrategy.unmarshal("object", b"{not json").unwrap_err();
        assert!(matches!(err, StrategyError::Decode { .. }));
    }

    #[test]
    fn test_kind_mismatch() {
        let err = JsonStrategy.unmarshal("array", b"{}").unwrap_err();
        assert!(err.to_string().contains("payload holds object"));
    }
}
