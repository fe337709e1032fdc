//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (request outcomes, node sessions)
//!
//! Consumers:
//!     → stdout via tracing-subscriber
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (routing_key, request_id, node) instead of formatted text
//! - Request ID flows from the user server into every log line of a request

pub mod logging;
pub mod metrics;

pub use metrics::{MetricsSink, PrometheusMetrics};
