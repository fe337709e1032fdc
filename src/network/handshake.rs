//! Node authentication for websocket sessions.
//!
//! A node opens the websocket with five headers. The signature covers
//! `pad64(routing_key) ‖ pad64(gateway_id) ‖ timestamp (u32, big endian)`
//! and must recover to the claimed node address.

use alloy::primitives::hex;
use alloy::signers::local::PrivateKeySigner;
use axum::http::HeaderMap;
use thiserror::Error;

use crate::api::message::MESSAGE_ROUTING_KEY_MAX_LEN;
use crate::api::signature::{self, SignatureError};

pub const HEADER_DON_ID: &str = "x-gateway-don-id";
pub const HEADER_GATEWAY_ID: &str = "x-gateway-id";
pub const HEADER_NODE_ADDRESS: &str = "x-gateway-node-address";
pub const HEADER_TIMESTAMP: &str = "x-gateway-timestamp";
pub const HEADER_SIGNATURE: &str = "x-gateway-signature";

const GATEWAY_ID_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("missing header {0}")]
    MissingHeader(&'static str),

    #[error("invalid header {0}")]
    InvalidHeader(&'static str),

    #[error("gateway id mismatch: {0}")]
    GatewayIdMismatch(String),

    #[error("unknown routing key: {0}")]
    UnknownRoutingKey(String),

    #[error("timestamp {timestamp} outside tolerance (now {now})")]
    StaleTimestamp { timestamp: u32, now: u64 },

    #[error("signature does not match node {0}")]
    SignerMismatch(String),

    #[error("node {0} is not a member of the DON")]
    NotMember(String),

    #[error(transparent)]
    Signature(#[from] SignatureError),
}

/// Parsed handshake headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAuth {
    pub routing_key: String,
    pub gateway_id: String,
    /// Lowercase hex address claimed by the node.
    pub node_address: String,
    pub timestamp: u32,
    pub signature: Vec<u8>,
}

fn signed_parts(routing_key: &str, gateway_id: &str, timestamp: u32) -> [Vec<u8>; 3] {
    [
        signature::aligned(routing_key, MESSAGE_ROUTING_KEY_MAX_LEN),
        signature::aligned(gateway_id, GATEWAY_ID_LEN),
        timestamp.to_be_bytes().to_vec(),
    ]
}

/// Headers a node presents when connecting, as `(name, value)` pairs.
pub fn handshake_headers(
    signer: &PrivateKeySigner,
    routing_key: &str,
    gateway_id: &str,
    timestamp: u32,
) -> Result<Vec<(&'static str, String)>, SignatureError> {
    let parts = signed_parts(routing_key, gateway_id, timestamp);
    let refs: Vec<&[u8]> = parts.iter().map(Vec::as_slice).collect();
    let signature = signature::sign_data(signer, &refs)?;
    Ok(vec![
        (HEADER_DON_ID, routing_key.to_string()),
        (HEADER_GATEWAY_ID, gateway_id.to_string()),
        (HEADER_NODE_ADDRESS, signer.address().to_string().to_lowercase()),
        (HEADER_TIMESTAMP, timestamp.to_string()),
        (HEADER_SIGNATURE, hex::encode_prefixed(signature)),
    ])
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, HandshakeError> {
    headers
        .get(name)
        .ok_or(HandshakeError::MissingHeader(name))?
        .to_str()
        .map_err(|_| HandshakeError::InvalidHeader(name))
}

impl NodeAuth {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, HandshakeError> {
        let timestamp = header(headers, HEADER_TIMESTAMP)?
            .parse()
            .map_err(|_| HandshakeError::InvalidHeader(HEADER_TIMESTAMP))?;
        let signature = hex::decode(header(headers, HEADER_SIGNATURE)?)
            .map_err(|_| HandshakeError::InvalidHeader(HEADER_SIGNATURE))?;
        Ok(Self {
            routing_key: header(headers, HEADER_DON_ID)?.to_string(),
            gateway_id: header(headers, HEADER_GATEWAY_ID)?.to_string(),
            node_address: header(headers, HEADER_NODE_ADDRESS)?.to_lowercase(),
            timestamp,
            signature,
        })
    }

    /// Check the gateway id, timestamp freshness and signature.
    pub fn verify(&self, gateway_id: &str, now: u64, tolerance_secs: u64) -> Result<(), HandshakeError> {
        if self.gateway_id != gateway_id {
            return Err(HandshakeError::GatewayIdMismatch(self.gateway_id.clone()));
        }
        if now.abs_diff(u64::from(self.timestamp)) > tolerance_secs {
            return Err(HandshakeError::StaleTimestamp {
                timestamp: self.timestamp,
                now,
            });
        }
        let parts = signed_parts(&self.routing_key, &self.gateway_id, self.timestamp);
        let refs: Vec<&[u8]> = parts.iter().map(Vec::as_slice).collect();
        let signer = signature::recover_signer(&self.signature, &refs)?;
        if signer.to_string().to_lowercase() != self.node_address {
            return Err(HandshakeError::SignerMismatch(self.node_address.clone()));
        }
        Ok(())
    }
}

/// Seconds since the unix epoch.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const OTHER_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    fn headers(key: &str, timestamp: u32) -> HeaderMap {
        let signer: PrivateKeySigner = key.parse().unwrap();
        let mut map = HeaderMap::new();
        for (name, value) in handshake_headers(&signer, "donA", "gw", timestamp).unwrap() {
            map.insert(name, HeaderValue::from_str(&value).unwrap());
        }
        map
    }

    #[test]
    fn test_round_trip() {
        let auth = NodeAuth::from_headers(&headers(TEST_KEY, 1_000)).unwrap();
        assert_eq!(auth.routing_key, "donA");
        assert_eq!(auth.node_address, "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
        auth.verify("gw", 1_010, 30).unwrap();
    }

    #[test]
    fn test_stale_timestamp() {
        let auth = NodeAuth::from_headers(&headers(TEST_KEY, 1_000)).unwrap();
        assert!(matches!(auth.verify("gw", 2_000, 30), Err(HandshakeError::StaleTimestamp { .. })));
    }

    #[test]
    fn test_wrong_gateway() {
        let auth = NodeAuth::from_headers(&headers(TEST_KEY, 1_000)).unwrap();
        assert!(matches!(auth.verify("other", 1_000, 30), Err(HandshakeError::GatewayIdMismatch(_))));
    }

    #[test]
    fn test_claimed_address_must_sign() {
        let mut map = headers(OTHER_KEY, 1_000);
        map.insert(
            HEADER_NODE_ADDRESS,
            HeaderValue::from_static("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"),
        );
        let auth = NodeAuth::from_headers(&map).unwrap();
        assert!(matches!(auth.verify("gw", 1_000, 30), Err(HandshakeError::SignerMismatch(_))));
    }

    #[test]
    fn test_missing_header() {
        let mut map = headers(TEST_KEY, 1_000);
        map.remove(HEADER_DON_ID);
        assert!(matches!(
            NodeAuth::from_headers(&map),
            Err(HandshakeError::MissingHeader(HEADER_DON_ID))
        ));
    }
}
