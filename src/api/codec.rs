//! Envelope codec.
//!
//! # Responsibilities
//! - Decide which envelope a JSON-RPC request carries
//! - Validate legacy messages
//! - Encode legacy messages as JSON-RPC requests/responses
//!
//! # Design Decisions
//! - `Envelope` is a sum type; callers match on it instead of probing fields
//! - A request whose params are not a legacy message object is a new envelope

use serde_json::value::{to_raw_value, RawValue};
use thiserror::Error;

use crate::api::jsonrpc::{Request, Response};
use crate::api::message::{Message, MessageError};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Message(#[from] MessageError),
}

/// A decoded user request.
#[derive(Debug)]
pub enum Envelope {
    /// Signed legacy message with an explicit routing key.
    Legacy(Message),
    /// JSON-RPC request routed through the service-name index.
    JsonRpc(Request),
}

/// Wire codec used by the gateway and handlers.
pub trait Codec: Send + Sync {
    /// Classify a request as a legacy or a new envelope.
    fn decode_envelope(&self, request: Request) -> Result<Envelope, CodecError>;

    /// Structural and signature validation of a legacy message.
    fn validate(&self, message: &mut Message) -> Result<(), CodecError>;

    fn encode_legacy_request(&self, message: &Message) -> Result<Vec<u8>, CodecError>;

    fn encode_legacy_response(&self, message: &Message) -> Result<Vec<u8>, CodecError>;
}

/// JSON-RPC 2.0 codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRpcCodec;

impl JsonRpcCodec {
    /// Wrap a legacy message into a JSON-RPC request (`id` = message ID).
    pub fn legacy_request(&self, message: &Message) -> Result<Request, CodecError> {
        let params = to_raw_value(message)?;
        Ok(Request::new(
            message.body.message_id.clone(),
            message.body.method.clone(),
            Some(params),
        ))
    }

    fn params_is_object(params: &RawValue) -> bool {
        params.get().trim_start().starts_with('{')
    }
}

impl Codec for JsonRpcCodec {
    fn decode_envelope(&self, request: Request) -> Result<Envelope, CodecError> {
        let decoded: Option<Message> = match request.params.as_deref() {
            Some(params) if Self::params_is_object(params) => Some(serde_json::from_str(params.get())?),
            _ => None,
        };

        let mut message = match decoded {
            Some(message) if !message.body.routing_key.is_empty() => message,
            _ => return Ok(Envelope::JsonRpc(request)),
        };
        message.body.message_id = request.id;
        message.body.method = request.method;
        Ok(Envelope::Legacy(message))
    }

    fn validate(&self, message: &mut Message) -> Result<(), CodecError> {
        Ok(message.validate()?)
    }

    fn encode_legacy_request(&self, message: &Message) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(&self.legacy_request(message)?)?)
    }

    fn encode_legacy_response(&self, message: &Message) -> Result<Vec<u8>, CodecError> {
        let response = Response::success(
            message.body.message_id.clone(),
            message.body.method.clone(),
            to_raw_value(message)?,
        );
        Ok(serde_json::to_vec(&response)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::jsonrpc::decode_request;
    use alloy::signers::local::PrivateKeySigner;

    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn legacy_bytes(routing_key: &str) -> Vec<u8> {
        let signer: PrivateKeySigner = TEST_KEY.parse().unwrap();
        let mut msg = Message::default();
        msg.body.message_id = "abcd".into();
        msg.body.method = "request".into();
        msg.body.routing_key = routing_key.into();
        msg.sign(&signer).unwrap();
        JsonRpcCodec.encode_legacy_request(&msg).unwrap()
    }

    #[test]
    fn test_legacy_envelope_round_trip() {
        let request = decode_request(&legacy_bytes("donA"), "").unwrap();
        match JsonRpcCodec.decode_envelope(request).unwrap() {
            Envelope::Legacy(mut msg) => {
                assert_eq!(msg.body.routing_key, "donA");
                assert_eq!(msg.body.message_id, "abcd");
                assert_eq!(msg.body.method, "request");
                JsonRpcCodec.validate(&mut msg).unwrap();
            }
            other => panic!("expected legacy envelope, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_routing_key_is_new_envelope() {
        let request = decode_request(&legacy_bytes(""), "").unwrap();
        assert!(matches!(JsonRpcCodec.decode_envelope(request).unwrap(), Envelope::JsonRpc(_)));
    }

    #[test]
    fn test_new_envelope_variants() {
        for raw in [
            r#"{"jsonrpc":"2.0","id":"1","method":"svcA.get","params":{"type":"new"}}"#,
            r#"{"jsonrpc":"2.0","id":"1","method":"svcA.get","params":[1,2]}"#,
            r#"{"jsonrpc":"2.0","id":"1","method":"svcA.get"}"#,
        ] {
            let request = decode_request(raw.as_bytes(), "").unwrap();
            assert!(matches!(JsonRpcCodec.decode_envelope(request).unwrap(), Envelope::JsonRpc(_)));
        }
    }

    #[test]
    fn test_malformed_legacy_body_is_error() {
        let raw = r#"{"jsonrpc":"2.0","id":"1","method":"m","params":{"body":{"don_id":5}}}"#;
        let request = decode_request(raw.as_bytes(), "").unwrap();
        assert!(JsonRpcCodec.decode_envelope(request).is_err());
    }

    #[test]
    fn test_encode_legacy_response() {
        let mut msg = Message::default();
        msg.body.message_id = "abcd".into();
        msg.body.method = "request".into();
        msg.body.routing_key = "donA".into();
        msg.body.payload = Some(RawValue::from_string(r#"{"result":"OK"}"#.into()).unwrap());
        let raw = JsonRpcCodec.encode_legacy_response(&msg).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": "abcd",
                "method": "request",
                "result": {
                    "signature": "",
                    "body": {
                        "message_id": "abcd",
                        "method": "request",
                        "don_id": "donA",
                        "receiver": "",
                        "payload": {"result": "OK"}
                    }
                }
            })
        );
    }
}
