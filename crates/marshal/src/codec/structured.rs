//! Structured (protobuf) codec

use bpmn_marshal_protocol::{proto, proto_to_snapshot, snapshot_to_proto};
use bpmn_marshal_schemas::ProcessInstanceSnapshot;
use prost::Message;

use super::{CodecError, SnapshotCodec, WireFormat};

#[derive(Debug, Clone)]
pub struct ProtobufCodec {
    max_nesting_depth: usize,
}

impl ProtobufCodec {
    pub fn new(max_nesting_depth: usize) -> Self {
        Self { max_nesting_depth }
    }
}

impl SnapshotCodec for ProtobufCodec {
    fn format(&self) -> WireFormat {
        WireFormat::Structured
    }

    fn encode(&self, snapshot: &ProcessInstanceSnapshot) -> Result<Vec<u8>, CodecError> {
        Ok(snapshot_to_proto(snapshot)?.encode_to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<ProcessInstanceSnapshot, CodecError> {
        let message = proto::ProcessInstance::decode(bytes)?;
        let snapshot = proto_to_snapshot(message)?;

        let depth = snapshot.nesting_depth();
        if depth > self.max_nesting_depth {
            return Err(CodecError::NestingTooDeep {
                depth,
                max: self.max_nesting_depth,
            });
        }
        Ok(snapshot)
    }
}
