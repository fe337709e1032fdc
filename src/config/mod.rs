//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → Gateway::from_config builds every component from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Handler configs stay raw JSON; each handler type parses its own

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ConnectionManagerConfig, DonConfig, GatewayConfig, HandlerConfig, NodeConfig, NodeServerConfig,
    ObservabilityConfig, TlsConfig, UserServerConfig,
};
pub use validation::{validate_config, ValidationError};
