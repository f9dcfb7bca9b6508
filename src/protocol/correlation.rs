//! Correlation ids for heavy transfers.
//!
//! An id is a 64-bit per-generator sequence number followed by 128 random
//! bits, rendered as 48 lowercase hex characters. The sequence makes ids
//! unique within one generator; the random part keeps independent
//! processes from colliding while the stored object is alive.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Longest id accepted from the wire.
pub const MAX_ID_LEN: usize = 128;

/// Opaque, header-safe identifier naming one heavy transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CorrelationId(String);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid correlation id: {0:?}")]
pub struct InvalidCorrelationId(pub String);

impl CorrelationId {
    /// Validate an id received from a peer or a URL.
    ///
    /// Accepts 1..=128 characters from `[A-Za-z0-9_-]`.
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_ID_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CorrelationId {
    type Error = InvalidCorrelationId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or(InvalidCorrelationId(value))
    }
}

impl From<CorrelationId> for String {
    fn from(id: CorrelationId) -> Self {
        id.0
    }
}

/// Generates correlation ids. Safe to share across concurrently handled legs.
#[derive(Debug, Default)]
pub struct CorrelationIdGenerator {
    sequence: AtomicU64,
}

impl CorrelationIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw the next id.
    pub fn next(&self) -> CorrelationId {
        // Relaxed is enough: only uniqueness of the fetched value matters.
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let random: u128 = rand::random();
        CorrelationId(format!("{:016x}{:032x}", seq, random))
    }
}
