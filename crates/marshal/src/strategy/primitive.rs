//! Strategy for scalar values
//!
//! Payload layout: one marker byte followed by the big-endian value
//! (booleans as one byte, strings as UTF-8).

use serde_json::{Number, Value};

use super::{ObjectMarshallingStrategy, StrategyError};

const BOOLEAN: u8 = 1;
const LONG: u8 = 2;
const DOUBLE: u8 = 3;
const STRING: u8 = 4;

/// Booleans, 64-bit integers, doubles and strings
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimitiveStrategy;

impl PrimitiveStrategy {
    pub const NAME: &'static str = "primitive";

    fn decode_error(data_type: &str, message: impl Into<String>) -> StrategyError {
        StrategyError::Decode {
            strategy: Self::NAME.to_string(),
            data_type: data_type.to_string(),
            message: message.into(),
        }
    }

    fn fixed<const N: usize>(data_type: &str, body: &[u8]) -> Result<[u8; N], StrategyError> {
        body.try_into().map_err(|_| {
            Self::decode_error(data_type, format!("expected {} bytes, got {}", N, body.len()))
        })
    }
}

impl ObjectMarshallingStrategy for PrimitiveStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn accept(&self, value: &Value) -> bool {
        match value {
            Value::Bool(_) | Value::String(_) => true,
            Value::Number(n) => n.is_i64() || n.is_f64(),
            _ => false,
        }
    }

    fn data_type(&self, value: &Value) -> String {
        match value {
            Value::Bool(_) => "boolean",
            Value::Number(n) if n.is_i64() => "long",
            Value::Number(_) => "double",
            _ => "string",
        }
        .to_string()
    }

    fn marshal(&self, value: &Value) -> Result<Vec<u8>, StrategyError> {
        let mut out = Vec::with_capacity(9);
        match value {
            Value::Bool(b) => {
                out.push(BOOLEAN);
                out.push(u8::from(*b));
            }
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    out.push(LONG);
                    out.extend_from_slice(&i.to_be_bytes());
                } else if let Some(f) = n.as_f64().filter(|_| n.is_f64()) {
                    out.push(DOUBLE);
                    out.extend_from_slice(&f.to_bits().to_be_bytes());
                } else {
                    return Err(StrategyError::Encode {
                        strategy: Self::NAME.to_string(),
                        message: format!("number {} does not fit a long or double", n),
                    });
                }
            }
            Value::String(s) => {
                out.push(STRING);
                out.extend_from_slice(s.as_bytes());
            }
            other => {
                return Err(StrategyError::Encode {
                    strategy: Self::NAME.to_string(),
                    message: format!("not a primitive: {}", super::value_kind(other)),
                })
            }
        }
        Ok(out)
    }

    fn unmarshal(&self, data_type: &str, bytes: &[u8]) -> Result<Value, StrategyError> {
        let (&marker, body) = bytes
            .split_first()
            .ok_or_else(|| Self::decode_error(data_type, "empty payload"))?;

        let expected = match data_type {
            "boolean" => BOOLEAN,
            "long" => LONG,
            "double" => DOUBLE,
            "string" => STRING,
            other => return Err(Self::decode_error(other, "unsupported data type")),
        };
        if marker != expected {
            return Err(Self::decode_error(
                data_type,
                format!("marker {} does not match", marker),
            ));
        }

        match marker {
            BOOLEAN => match Self::fixed::<1>(data_type, body)? {
                [0] => Ok(Value::Bool(false)),
                [1] => Ok(Value::Bool(true)),
                [b] => Err(Self::decode_error(data_type, format!("invalid boolean byte {}", b))),
            },
            LONG => Ok(Value::from(i64::from_be_bytes(Self::fixed::<8>(
                data_type, body,
            )?))),
            DOUBLE => {
                let bits = u64::from_be_bytes(Self::fixed::<8>(data_type, body)?);
                Number::from_f64(f64::from_bits(bits))
                    .map(Value::Number)
                    .ok_or_else(|| Self::decode_error(data_type, "non-finite double"))
            }
            _ => String::from_utf8(body.to_vec())
                .map(Value::String)
                .map_err(|e| Self::decode_error(data_type, e.to_string())),
        }
    }
}
