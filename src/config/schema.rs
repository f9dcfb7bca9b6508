//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::transporter::store::DEFAULT_MAX_OBJECT_BYTES;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HeavyConfig {
    /// Per-direction size thresholds.
    pub thresholds: ThresholdConfig,

    /// Storage exchange the transporter talks to.
    pub transporter: TransporterConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Listener for the application behind the server connector.
    pub listener: ListenerConfig,

    /// Embedded storage exchange.
    pub exchange: ExchangeConfig,

    /// Server connector behaviour.
    pub server: ServerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl HeavyConfig {
    /// True when this process keeps payloads in its own object store,
    /// either to serve the exchange or as the memory transporter.
    pub fn uses_object_store(&self) -> bool {
        self.exchange.enabled || self.transporter.kind == TransporterKind::Memory
    }
}

/// Request and response thresholds, each independently toggleable.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub request_enabled: bool,

    /// Largest request body sent directly, in bytes.
    pub request_bytes: u64,

    pub response_enabled: bool,

    /// Largest response body sent directly, in bytes.
    pub response_bytes: u64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            request_enabled: true,
            request_bytes: 1024 * 1024,
            response_enabled: true,
            response_bytes: 1024 * 1024,
        }
    }
}

/// Which transporter implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransporterKind {
    /// In-process store; both connectors must live in this process.
    Memory,
    /// Remote storage exchange over HTTP.
    Http,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransporterConfig {
    pub kind: TransporterKind,

    /// Base URL of the storage exchange (kind = "http").
    pub exchange_url: String,

    /// Lifetime of upload/download handles in seconds.
    pub handle_ttl_secs: u64,

    /// Lifetime of stored payloads in seconds.
    pub object_ttl_secs: u64,
}

impl TransporterConfig {
    pub fn handle_ttl(&self) -> Duration {
        Duration::from_secs(self.handle_ttl_secs)
    }

    pub fn object_ttl(&self) -> Duration {
        Duration::from_secs(self.object_ttl_secs)
    }
}

impl Default for TransporterConfig {
    fn default() -> Self {
        Self {
            kind: TransporterKind::Http,
            exchange_url: "http://127.0.0.1:8090/".to_string(),
            handle_ttl_secs: 300,
            object_ttl_secs: 900,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Bound on every single transporter call, in seconds.
    pub transporter_secs: u64,

    /// Total time for one request/response on the primary channel.
    pub request_secs: u64,
}

impl TimeoutConfig {
    pub fn transporter(&self) -> Duration {
        Duration::from_secs(self.transporter_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            transporter_secs: 30,
            request_secs: 60,
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Serve the storage exchange from this process.
    pub enabled: bool,

    pub bind_address: String,

    /// URL peers use to reach the exchange. Defaults to `http://{bind_address}/`.
    pub public_url: Option<String>,

    /// Interval between purges of expired payloads and spent handles, in seconds.
    pub purge_interval_secs: u64,

    /// Largest payload stored or rebuilt, in bytes.
    pub max_object_bytes: u64,
}

impl ExchangeConfig {
    pub fn public_url(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| format!("http://{}/", self.bind_address))
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:8090".to_string(),
            public_url: None,
            purge_interval_secs: 60,
            max_object_bytes: DEFAULT_MAX_OBJECT_BYTES,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Add the marker headers to `access-control-expose-headers` on heavy
    /// responses so browser clients can read them.
    pub expose_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            expose_headers: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
