//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → HeavyConfig (validated, immutable)
//!     → shared via Arc with the engine and both connectors
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ExchangeConfig, HeavyConfig, ListenerConfig, ObservabilityConfig, ServerConfig,
    ThresholdConfig, TimeoutConfig, TransporterConfig, TransporterKind,
};
pub use validation::{validate_config, ValidationError};
