//! Wire codecs for process-instance snapshots
//!
//! Both codecs encode exactly one [`ProcessInstanceSnapshot`]; traversal,
//! ordering, strategy selection and reference resolution happen in the
//! marshaller before encoding and after decoding.

mod legacy;
mod stream;
mod structured;

pub use legacy::{LegacyStreamCodec, LEGACY_FORMAT_VERSION};
pub use stream::{DataInput, DataOutput, StreamError};
pub use structured::ProtobufCodec;

use std::fmt;
use std::str::FromStr;

use bpmn_marshal_protocol::ConversionError;
use bpmn_marshal_schemas::{ProcessInstanceSnapshot, UnknownCode};
use serde::{Deserialize, Serialize};

/// Errors from encoding or decoding a snapshot
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("legacy stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("structured format error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("unknown node type: {0}")]
    UnknownNodeType(u16),

    #[error(transparent)]
    UnknownCode(#[from] UnknownCode),

    #[error("duplicate node instance id: {0}")]
    DuplicateNodeInstance(String),

    #[error("node instances nested {depth} levels deep, limit is {max}")]
    NestingTooDeep { depth: usize, max: usize },
}

/// Wire format selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// Big-endian primitive stream with end-of-sequence sentinels
    Legacy,
    /// Protobuf message
    #[default]
    Structured,
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Structured => write!(f, "structured"),
        }
    }
}

impl FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "structured" | "protobuf" => Ok(Self::Structured),
            other => Err(format!("unknown wire format: {}", other)),
        }
    }
}

/// Encoding of a snapshot to bytes and back
pub trait SnapshotCodec: Send + Sync {
    fn format(&self) -> WireFormat;

    fn encode(&self, snapshot: &ProcessInstanceSnapshot) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, bytes: &[u8]) -> Result<ProcessInstanceSnapshot, CodecError>;
}

/// Codec for `format` accepting at most `max_nesting_depth` levels of containers
pub fn codec_for(format: WireFormat, max_nesting_depth: usize) -> Box<dyn SnapshotCodec> {
    match format {
        WireFormat::Legacy => Box::new(LegacyStreamCodec::new(max_nesting_depth)),
        WireFormat::Structured => Box::new(ProtobufCodec::new(max_nesting_depth)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_parsing() {
        assert_eq!("legacy".parse::<WireFormat>(), Ok(WireFormat::Legacy));
        assert_eq!("Protobuf".parse::<WireFormat>(), Ok(WireFormat::Structured));
        assert!("xml".parse::<WireFormat>().is_err());
        assert_eq!(WireFormat::default(), WireFormat::Structured);
    }

    #[test]
    fn test_codec_for_reports_format() {
        assert_eq!(codec_for(WireFormat::Legacy, 8).format(), WireFormat::Legacy);
        assert_eq!(codec_for(WireFormat::Structured, 8).format(), WireFormat::Structured);
    }
}
