//! Wire-level API shared by users, the gateway and nodes.
//!
//! # Data Flow
//! ```text
//! raw HTTP body
//!     → jsonrpc.rs (generic JSON-RPC 2.0 framing)
//!     → codec.rs (probe params: legacy signed message or new envelope)
//!     → message.rs (legacy structural + signature validation)
//!     → signature.rs (keccak256 + secp256k1 recovery)
//!
//! handler outcome
//!     → error_code.rs (ErrorCode → JSON-RPC code, HTTP status)
//! ```
//!
//! # Design Decisions
//! - Params and payloads stay raw JSON so signed bytes are never re-encoded
//! - The envelope variant is decided once, at the decode boundary
//! - Error code mappings are pure functions

pub mod codec;
pub mod error_code;
pub mod jsonrpc;
pub mod message;
pub mod signature;

pub use codec::{Codec, CodecError, Envelope, JsonRpcCodec};
pub use error_code::ErrorCode;
pub use jsonrpc::{JsonRpcError, Request, Response, WireError, JSONRPC_VERSION};
pub use message::{Message, MessageBody, MessageError};
pub use signature::SignatureError;
