//! Error taxonomy for the heavy-HTTP engine.
//!
//! Failures are attributed to the logical leg (request or response) and the
//! handoff role (upload or download) so callers can pick their own retry
//! policy. Nothing here is retried by the engine itself.

use std::time::{Duration, SystemTime};
use thiserror::Error;

use crate::handoff::SessionRole;
use crate::protocol::{CorrelationId, Leg};

/// Payload introspection failed before a threshold decision could be made.
#[derive(Debug, Error)]
pub enum ClassificationError {
    /// The body stream errored during the bounded read-ahead.
    #[error("payload stream failed after {buffered} bytes: {message}")]
    Stream { buffered: u64, message: String },
}

/// Failures reported by a transporter or detected by a handoff session
/// while talking to one.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The transporter call did not finish within the session timeout.
    #[error("transporter call timed out after {0:?}")]
    Timeout(Duration),

    /// The handle was used at or after its `expires_at`.
    #[error("handle expired at {expired_at:?}")]
    Expired { expired_at: SystemTime },

    /// The single-use handle has already been redeemed.
    #[error("handle already consumed")]
    HandleConsumed,

    /// The handle is unknown, malformed, or used for the wrong method.
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    /// Nothing is stored (or nothing is stored anymore) for this id.
    #[error("no stored payload for correlation id {0}")]
    NotFound(CorrelationId),

    /// The storage exchange answered with a non-success status.
    #[error("storage exchange rejected the call with status {status}")]
    Rejected { status: u16 },

    /// Fewer or more bytes moved than were announced.
    #[error("transfer incomplete: expected {expected} bytes, got {actual}")]
    Incomplete { expected: u64, actual: u64 },

    /// The payload is larger than the store accepts.
    #[error("payload exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    /// Network or stream failure underneath the transporter.
    #[error("transport I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Wrap any displayable error as an I/O failure.
    pub fn io(err: impl std::fmt::Display) -> Self {
        TransportError::Io(err.to_string())
    }

    /// Expired handles are a transporter failure subtype.
    pub fn is_expired(&self) -> bool {
        matches!(self, TransportError::Expired { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

/// Crate-level error surfaced by the engine and both connectors.
#[derive(Debug, Error)]
pub enum HeavyError {
    /// The outbound payload could not be classified.
    #[error("failed to classify {leg} payload: {source}")]
    Classification {
        leg: Leg,
        #[source]
        source: ClassificationError,
    },

    /// A heavy handoff failed. The logical message it belonged to failed
    /// with it; the payload was never sent directly instead.
    #[error("{role} handoff {id} for the {leg} failed: {source}")]
    Transport {
        leg: Leg,
        role: SessionRole,
        id: CorrelationId,
        #[source]
        source: TransportError,
    },

    /// The primary HTTP exchange itself failed.
    #[error("upstream request failed: {0}")]
    Upstream(String),
}

impl HeavyError {
    /// The leg a failure belongs to, when it is attributable to one.
    pub fn leg(&self) -> Option<Leg> {
        match self {
            HeavyError::Classification { leg, .. } | HeavyError::Transport { leg, .. } => Some(*leg),
            _ => None,
        }
    }

    /// The transporter failure behind this error, if any.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            HeavyError::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type for engine and connector operations.
pub type HeavyResult<T> = Result<T, HeavyError>;
