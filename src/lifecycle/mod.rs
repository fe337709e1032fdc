//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → every ShutdownSignal resolves → background loops exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → main closes the gateway
//! ```
//!
//! # Design Decisions
//! - Ordered startup and shutdown live in `Gateway::start`/`Gateway::close`
//! - Background tasks never outlive the component that spawned them

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
