//! Transporter abstraction over an out-of-band storage exchange.
//!
//! # Data Flow
//! ```text
//! upload session:   create_upload_handle(id) → put(handle, body)
//! download session: create_download_handle(id) → get(handle)
//!
//! store.rs     ObjectStore: grants single-use, time-bounded handle tokens
//! memory.rs    in-process transporter over an ObjectStore (memory:// urls)
//! exchange.rs  axum service exposing an ObjectStore over HTTP
//! http.rs      transporter speaking to a storage exchange
//! ```
//!
//! # Contract
//! - A handle is valid only until `expires_at`
//! - Bytes put through an upload handle for an id are retrievable at least
//!   once through a download handle for the same id, before expiry
//! - Only the transporter maps correlation ids to stored bytes
//! - A put whose body stream fails or is dropped stores nothing

pub mod exchange;
pub mod http;
pub mod memory;
pub mod store;

use async_trait::async_trait;
use axum::body::Body;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use url::Url;

use crate::error::TransportError;
use crate::protocol::{CorrelationId, PayloadEnvelope};

pub use exchange::exchange_router;
pub use http::HttpTransporter;
pub use memory::MemoryTransporter;
pub use store::ObjectStore;

/// What a handle may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HandleMethod {
    Put,
    Get,
}

impl HandleMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandleMethod::Put => "PUT",
            HandleMethod::Get => "GET",
        }
    }
}

/// Time-bounded, single-use pointer into the storage exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransporterHandle {
    pub method: HandleMethod,
    pub url: Url,
    pub expires_at: SystemTime,
}

impl TransporterHandle {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }

    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }

    /// Check the handle is unexpired and meant for `method`.
    pub fn ensure_usable(&self, method: HandleMethod) -> Result<(), TransportError> {
        if self.method != method {
            return Err(TransportError::InvalidHandle(format!(
                "{} handle used for {}",
                self.method.as_str(),
                method.as_str()
            )));
        }
        if self.is_expired() {
            return Err(TransportError::Expired {
                expired_at: self.expires_at,
            });
        }
        Ok(())
    }

    /// The `token` query parameter, if the url carries one.
    pub fn token(&self) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned())
    }

    /// The correlation id named by the last path segment.
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.url
            .path_segments()?
            .next_back()
            .and_then(CorrelationId::parse)
    }
}

/// Metadata handed to the transporter alongside an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadHints {
    pub media_type: Option<String>,
    pub size_estimate: u64,
    pub size_is_exact: bool,
}

impl UploadHints {
    pub fn exact_size(&self) -> Option<u64> {
        self.size_is_exact.then_some(self.size_estimate)
    }
}

impl From<&PayloadEnvelope> for UploadHints {
    fn from(envelope: &PayloadEnvelope) -> Self {
        Self {
            media_type: envelope.media_type.clone(),
            size_estimate: envelope.size_estimate,
            size_is_exact: envelope.size_is_exact,
        }
    }
}

/// A download in progress.
#[derive(Debug)]
pub struct Download {
    pub media_type: Option<String>,
    pub content_length: Option<u64>,
    pub body: Body,
}

/// Storage exchange used by handoff sessions.
///
/// Implementations are chosen by the integrator at construction time.
#[async_trait]
pub trait Transporter: Send + Sync {
    async fn create_upload_handle(
        &self,
        id: &CorrelationId,
        hints: &UploadHints,
    ) -> Result<TransporterHandle, TransportError>;

    async fn create_download_handle(
        &self,
        id: &CorrelationId,
    ) -> Result<TransporterHandle, TransportError>;

    /// Stream `body` to the handle's target. Returns the bytes stored.
    async fn put(
        &self,
        handle: &TransporterHandle,
        hints: &UploadHints,
        body: Body,
    ) -> Result<u64, TransportError>;

    /// Open the stored payload behind the handle.
    async fn get(&self, handle: &TransporterHandle) -> Result<Download, TransportError>;
}
