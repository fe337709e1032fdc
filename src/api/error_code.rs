//! Gateway outcome classifier and its protocol/HTTP mappings.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::api::jsonrpc::{
    ERR_CONFLICT, ERR_INTERNAL, ERR_INVALID_PARAMS, ERR_INVALID_REQUEST, ERR_LIMIT_EXCEEDED,
    ERR_METHOD_NOT_FOUND, ERR_PARSE, ERR_SERVER_OVERLOADED,
};

/// Coarse outcome of a user request, used for metrics and status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    NoError,
    /// Malformed envelope or failed structural/signature validation.
    UserMessageParseError,
    /// No handler for the service name or method.
    UnsupportedMethodError,
    /// No handler registered under the routing key.
    UnsupportedRoutingKeyError,
    /// The handler rejected the request synchronously.
    HandlerError,
    /// No response before the caller's deadline.
    RequestTimeoutError,
    NodeResponseEncodingError,
    FatalError,
    ConflictError,
    LimitExceededError,
}

impl ErrorCode {
    /// Stable label used for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoError => "NoError",
            ErrorCode::UserMessageParseError => "UserMessageParseError",
            ErrorCode::UnsupportedMethodError => "UnsupportedMethodError",
            ErrorCode::UnsupportedRoutingKeyError => "UnsupportedRoutingKeyError",
            ErrorCode::HandlerError => "HandlerError",
            ErrorCode::RequestTimeoutError => "RequestTimeoutError",
            ErrorCode::NodeResponseEncodingError => "NodeResponseEncodingError",
            ErrorCode::FatalError => "FatalError",
            ErrorCode::ConflictError => "ConflictError",
            ErrorCode::LimitExceededError => "LimitExceededError",
        }
    }

    /// JSON-RPC error code carried in the wire error object.
    pub fn to_jsonrpc_code(&self) -> i64 {
        match self {
            ErrorCode::NoError => 0,
            ErrorCode::UserMessageParseError => ERR_PARSE,
            ErrorCode::UnsupportedMethodError => ERR_METHOD_NOT_FOUND,
            ErrorCode::UnsupportedRoutingKeyError => ERR_INVALID_PARAMS,
            ErrorCode::HandlerError => ERR_INVALID_REQUEST,
            ErrorCode::RequestTimeoutError => ERR_SERVER_OVERLOADED,
            ErrorCode::NodeResponseEncodingError | ErrorCode::FatalError => ERR_INTERNAL,
            ErrorCode::ConflictError => ERR_CONFLICT,
            ErrorCode::LimitExceededError => ERR_LIMIT_EXCEEDED,
        }
    }

    /// HTTP status returned to the user.
    pub fn to_http_status(&self) -> StatusCode {
        match self {
            ErrorCode::NoError => StatusCode::OK,
            ErrorCode::UserMessageParseError | ErrorCode::HandlerError => StatusCode::BAD_REQUEST,
            ErrorCode::UnsupportedMethodError | ErrorCode::UnsupportedRoutingKeyError => {
                StatusCode::NOT_FOUND
            }
            ErrorCode::RequestTimeoutError => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::NodeResponseEncodingError | ErrorCode::FatalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ErrorCode::ConflictError => StatusCode::CONFLICT,
            ErrorCode::LimitExceededError => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_mapping() {
        assert_eq!(ErrorCode::NoError.to_http_status(), StatusCode::OK);
        assert_eq!(ErrorCode::UserMessageParseError.to_http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::UnsupportedMethodError.to_http_status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::UnsupportedRoutingKeyError.to_http_status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::HandlerError.to_http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::RequestTimeoutError.to_http_status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(ErrorCode::LimitExceededError.to_http_status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_jsonrpc_mapping() {
        assert_eq!(ErrorCode::UserMessageParseError.to_jsonrpc_code(), -32700);
        assert_eq!(ErrorCode::HandlerError.to_jsonrpc_code(), -32600);
        assert_eq!(ErrorCode::UnsupportedMethodError.to_jsonrpc_code(), -32601);
        assert_eq!(ErrorCode::UnsupportedRoutingKeyError.to_jsonrpc_code(), -32602);
        assert_eq!(ErrorCode::RequestTimeoutError.to_jsonrpc_code(), -32000);
    }

    #[test]
    fn test_labels() {
        assert_eq!(ErrorCode::RequestTimeoutError.to_string(), "RequestTimeoutError");
    }
}
