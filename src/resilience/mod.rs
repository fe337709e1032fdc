//! Resilience helpers.
//!
//! # Design Decisions
//! - Node connectors reconnect forever, spaced by jittered exponential backoff
//! - Jitter keeps a restarted gateway from being hit by every node at once

pub mod backoff;

pub use backoff::ReconnectBackoff;
