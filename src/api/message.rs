//! Legacy signed user message.
//!
//! # Wire Shape
//! ```text
//! {"signature":"0x…","body":{"message_id":…,"method":…,"don_id":…,"receiver":…,"payload":{…}}}
//! ```
//!
//! # Design Decisions
//! - The routing key travels as `don_id` for compatibility with existing clients
//! - Fields are zero-padded to fixed widths before hashing, so a trailing NUL
//!   would make two different values sign identically; those are rejected
//! - The recovered sender is kept on the body but never serialized

use alloy::primitives::hex;
use alloy::signers::local::PrivateKeySigner;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use thiserror::Error;

use crate::api::signature::{self, SignatureError, SIGNATURE_LEN};

pub const MESSAGE_SIGNATURE_HEX_LEN: usize = 2 + SIGNATURE_LEN * 2;
pub const MESSAGE_ID_MAX_LEN: usize = 128;
pub const MESSAGE_METHOD_MAX_LEN: usize = 64;
pub const MESSAGE_ROUTING_KEY_MAX_LEN: usize = 64;
pub const MESSAGE_RECEIVER_LEN: usize = 2 + 2 * 20;
pub const NULL_CHAR: char = '\0';

/// Structural or signature problems with a legacy message.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid hex-encoded signature length")]
    SignatureLength,

    #[error("invalid message ID length")]
    MessageIdLength,

    #[error("message ID ending with null bytes")]
    MessageIdNullPadded,

    #[error("invalid method name length")]
    MethodLength,

    #[error("method name ending with null bytes")]
    MethodNullPadded,

    #[error("invalid routing key length")]
    RoutingKeyLength,

    #[error("routing key ending with null bytes")]
    RoutingKeyNullPadded,

    #[error("invalid receiver length")]
    ReceiverLength,

    #[error("invalid signature encoding: {0}")]
    SignatureEncoding(String),

    #[error(transparent)]
    Signature(#[from] SignatureError),
}

/// A signed legacy message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub body: MessageBody,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub message_id: String,

    #[serde(default)]
    pub method: String,

    /// Routing key of the target handler.
    #[serde(default, rename = "don_id")]
    pub routing_key: String,

    #[serde(default)]
    pub receiver: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Box<RawValue>>,

    /// Address recovered from the signature; set by `validate` and `sign`.
    #[serde(skip)]
    pub sender: String,
}

impl Message {
    /// Check field limits and recover the signer into `body.sender`.
    pub fn validate(&mut self) -> Result<(), MessageError> {
        let body = &self.body;
        if self.signature.len() != MESSAGE_SIGNATURE_HEX_LEN {
            return Err(MessageError::SignatureLength);
        }
        if body.message_id.is_empty() || body.message_id.len() > MESSAGE_ID_MAX_LEN {
            return Err(MessageError::MessageIdLength);
        }
        if body.message_id.ends_with(NULL_CHAR) {
            return Err(MessageError::MessageIdNullPadded);
        }
        if body.method.is_empty() || body.method.len() > MESSAGE_METHOD_MAX_LEN {
            return Err(MessageError::MethodLength);
        }
        if body.method.ends_with(NULL_CHAR) {
            return Err(MessageError::MethodNullPadded);
        }
        if body.routing_key.is_empty() || body.routing_key.len() > MESSAGE_ROUTING_KEY_MAX_LEN {
            return Err(MessageError::RoutingKeyLength);
        }
        if body.routing_key.ends_with(NULL_CHAR) {
            return Err(MessageError::RoutingKeyNullPadded);
        }
        if !body.receiver.is_empty() && body.receiver.len() != MESSAGE_RECEIVER_LEN {
            return Err(MessageError::ReceiverLength);
        }

        let signer = self.extract_signer()?;
        self.body.sender = signer.to_string().to_lowercase();
        Ok(())
    }

    /// Sign the body with `signer`, replacing any previous signature.
    pub fn sign(&mut self, signer: &PrivateKeySigner) -> Result<(), MessageError> {
        let raw = self.body.raw_parts();
        let parts: Vec<&[u8]> = raw.iter().map(Vec::as_slice).collect();
        let signature = signature::sign_data(signer, &parts)?;
        self.signature = hex::encode_prefixed(signature);
        self.body.sender = signer.address().to_string().to_lowercase();
        Ok(())
    }

    /// Address that signed this message.
    pub fn extract_signer(&self) -> Result<alloy::primitives::Address, MessageError> {
        let signature = hex::decode(&self.signature)
            .map_err(|e| MessageError::SignatureEncoding(e.to_string()))?;
        let raw = self.body.raw_parts();
        let parts: Vec<&[u8]> = raw.iter().map(Vec::as_slice).collect();
        Ok(signature::recover_signer(&signature, &parts)?)
    }
}

impl MessageBody {
    /// Fixed-width fields covered by the signature, in signing order.
    fn raw_parts(&self) -> [Vec<u8>; 5] {
        let receiver = hex::decode(&self.receiver).unwrap_or_default();
        let payload = self
            .payload
            .as_ref()
            .map(|p| p.get().as_bytes().to_vec())
            .unwrap_or_default();
        [
            signature::aligned(&self.message_id, MESSAGE_ID_MAX_LEN),
            signature::aligned(&self.method, MESSAGE_METHOD_MAX_LEN),
            signature::aligned(&self.routing_key, MESSAGE_ROUTING_KEY_MAX_LEN),
            receiver,
            payload,
        ]
    }
}
