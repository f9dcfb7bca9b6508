//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds, TTLs and timeouts > 0)
//! - Check addresses and URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: HeavyConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;
use url::Url;

use crate::config::schema::{HeavyConfig, TransporterKind};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config(config: &HeavyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let thresholds = &config.thresholds;
    if thresholds.request_enabled && thresholds.request_bytes == 0 {
        errors.push(ValidationError::new("thresholds.request_bytes", "must be > 0 when enabled"));
    }
    if thresholds.response_enabled && thresholds.response_bytes == 0 {
        errors.push(ValidationError::new("thresholds.response_bytes", "must be > 0 when enabled"));
    }

    let transporter = &config.transporter;
    if transporter.handle_ttl_secs == 0 {
        errors.push(ValidationError::new("transporter.handle_ttl_secs", "must be > 0"));
    }
    if transporter.object_ttl_secs == 0 {
        errors.push(ValidationError::new("transporter.object_ttl_secs", "must be > 0"));
    }
    if transporter.kind == TransporterKind::Http {
        check_http_url(&mut errors, "transporter.exchange_url", &transporter.exchange_url);
    }

    if config.timeouts.transporter_secs == 0 {
        errors.push(ValidationError::new("timeouts.transporter_secs", "must be > 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }

    check_socket_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.exchange.enabled {
        check_socket_addr(&mut errors, "exchange.bind_address", &config.exchange.bind_address);
        check_http_url(&mut errors, "exchange.public_url", &config.exchange.public_url());
    }
    if config.uses_object_store() && config.exchange.purge_interval_secs == 0 {
        errors.push(ValidationError::new("exchange.purge_interval_secs", "must be > 0"));
    }
    if config.exchange.max_object_bytes == 0 {
        errors.push(ValidationError::new("exchange.max_object_bytes", "must be > 0"));
    }
    if config.observability.metrics_enabled {
        check_socket_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("{:?} is not a socket address", value)));
    }
}

fn check_http_url(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    match Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme {:?}", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, e.to_string())),
    }
}
