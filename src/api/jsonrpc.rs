//! JSON-RPC 2.0 framing.
//!
//! Both envelopes travel inside a JSON-RPC request; only `params` differs.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use thiserror::Error;

/// Protocol version carried by every request and response.
pub const JSONRPC_VERSION: &str = "2.0";

pub const ERR_PARSE: i64 = -32700;
pub const ERR_INVALID_REQUEST: i64 = -32600;
pub const ERR_METHOD_NOT_FOUND: i64 = -32601;
pub const ERR_INVALID_PARAMS: i64 = -32602;
pub const ERR_INTERNAL: i64 = -32603;
pub const ERR_SERVER_OVERLOADED: i64 = -32000;
pub const ERR_LIMIT_EXCEEDED: i64 = -32005;
pub const ERR_CONFLICT: i64 = -32009;

/// Errors produced while decoding JSON-RPC framing.
#[derive(Debug, Error)]
pub enum JsonRpcError {
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("incorrect jsonrpc version")]
    Version,
}

/// A JSON-RPC request. `params` is kept as raw JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "jsonrpc")]
    pub version: String,

    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub method: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Box<RawValue>>,

    /// Transport-level auth token (e.g. the `Authorization` header).
    #[serde(skip)]
    pub auth: String,
}

impl Request {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Option<Box<RawValue>>) -> Self {
        Self {
            version: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
            auth: String::new(),
        }
    }

    /// Service addressed by the request: the method prefix before the first `.`.
    pub fn service_name(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }
}

/// A JSON-RPC response. Exactly one of `result` / `error` is expected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "jsonrpc")]
    pub version: String,

    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub method: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Box<RawValue>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl Response {
    pub fn success(id: impl Into<String>, method: impl Into<String>, result: Box<RawValue>) -> Self {
        Self {
            version: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self {
            version: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: String::new(),
            result: None,
            error: Some(WireError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// Error object of a failed JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<RawValue>>,
}

/// Decode a raw request and attach the transport auth token.
pub fn decode_request(raw: &[u8], auth: &str) -> Result<Request, JsonRpcError> {
    let mut request: Request = serde_json::from_slice(raw)?;
    if request.version != JSONRPC_VERSION {
        return Err(JsonRpcError::Version);
    }
    request.auth = auth.to_string();
    Ok(request)
}
