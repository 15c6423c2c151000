//! Sync protocol message types
//!
//! Messages exchanged with a mirror server over WebSocket binary frames,
//! encoded as CBOR. Each connection carries exactly one request and one
//! response.

use serde::{Deserialize, Serialize};

use super::remote::{OpAck, RemoteError};
use crate::models::Event;
use crate::queue::PendingOperation;

/// Messages sent to the mirror server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Ask for the full event collection
    Pull,

    /// Apply operations in order
    Push { operations: Vec<PendingOperation> },
}

/// Messages sent back by the mirror server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Answer to `pull`
    Snapshot { events: Vec<Event> },

    /// Answer to `push`, one ack per operation
    PushResult { acks: Vec<OpAck> },

    /// The request could not be served
    Error { message: String },
}

impl ClientMessage {
    /// Encode message to CBOR bytes
    pub fn encode(&self) -> Result<Vec<u8>, RemoteError> {
        encode(self)
    }

    /// Decode message from CBOR bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, RemoteError> {
        decode(bytes)
    }
}

impl ServerMessage {
    /// Encode message to CBOR bytes
    pub fn encode(&self) -> Result<Vec<u8>, RemoteError> {
        encode(self)
    }

    /// Decode message from CBOR bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, RemoteError> {
        decode(bytes)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, RemoteError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| RemoteError::Protocol(format!("CBOR encoding failed: {e}")))?;
    Ok(bytes)
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, RemoteError> {
    ciborium::from_reader(bytes)
        .map_err(|e| RemoteError::Protocol(format!("CBOR decoding failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Operation;
    use crate::repository::seed_events;
    use uuid::Uuid;

    #[test]
    fn test_pull_message_encoding() {
        let bytes = ClientMessage::Pull.encode().unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(ClientMessage::decode(&bytes).unwrap(), ClientMessage::Pull);
    }

    #[test]
    fn test_push_message_carries_operations() {
        let event = seed_events().remove(0);
        let msg = ClientMessage::Push {
            operations: vec![
                PendingOperation::new(Operation::CreateEvent { event }),
                PendingOperation::new(Operation::DeleteRecord {
                    event_id: 1001,
                    record_id: 5001,
                }),
            ],
        };

        let decoded = ClientMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_server_message_decoding() {
        let id = Uuid::new_v4();
        let msg = ServerMessage::PushResult {
            acks: vec![OpAck::accepted(id)],
        };

        match ServerMessage::decode(&msg.encode().unwrap()).unwrap() {
            ServerMessage::PushResult { acks } => {
                assert_eq!(acks.len(), 1);
                assert!(acks[0].is_accepted());
                assert_eq!(acks[0].op_id, id);
            }
            other => panic!("Expected PushResult message, got {other:?}"),
        }
    }

    #[test]
    fn test_garbage_is_a_protocol_error() {
        let err = ServerMessage::decode(&[0xff, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, RemoteError::Protocol(_)));
    }
}
