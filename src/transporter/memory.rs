//! In-process reference transporter.
//!
//! Handles point at `memory://exchange/objects/{id}?token=...`; both sides of
//! an exchange must share the same [`ObjectStore`].

use async_trait::async_trait;
use axum::body::Body;
use url::Url;

use crate::error::TransportError;
use crate::protocol::CorrelationId;
use crate::transporter::store::{Grant, ObjectStore};
use crate::transporter::{Download, HandleMethod, Transporter, TransporterHandle, UploadHints};

#[derive(Clone, Default)]
pub struct MemoryTransporter {
    store: ObjectStore,
}

impl MemoryTransporter {
    pub fn new(store: ObjectStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    fn handle_for(grant: &Grant) -> Result<TransporterHandle, TransportError> {
        let url = Url::parse(&format!(
            "memory://exchange/objects/{}?token={}",
            grant.id, grant.token
        ))
        .map_err(|e| TransportError::InvalidHandle(e.to_string()))?;

        Ok(TransporterHandle {
            method: grant.method,
            url,
            expires_at: grant.expires_at,
        })
    }

    fn redeem(
        &self,
        handle: &TransporterHandle,
        method: HandleMethod,
    ) -> Result<Grant, TransportError> {
        handle.ensure_usable(method)?;
        if handle.url.scheme() != "memory" {
            return Err(TransportError::InvalidHandle(format!(
                "unsupported scheme {}",
                handle.url.scheme()
            )));
        }
        let id = handle
            .correlation_id()
            .ok_or_else(|| TransportError::InvalidHandle("missing correlation id".to_string()))?;
        let token = handle
            .token()
            .ok_or_else(|| TransportError::InvalidHandle("missing token".to_string()))?;
        self.store.redeem(&token, &id, method)
    }
}

#[async_trait]
impl Transporter for MemoryTransporter {
    async fn create_upload_handle(
        &self,
        id: &CorrelationId,
        hints: &UploadHints,
    ) -> Result<TransporterHandle, TransportError> {
        let grant = self
            .store
            .issue(id, HandleMethod::Put, hints.media_type.clone())?;
        Self::handle_for(&grant)
    }

    async fn create_download_handle(
        &self,
        id: &CorrelationId,
    ) -> Result<TransporterHandle, TransportError> {
        let grant = self.store.issue(id, HandleMethod::Get, None)?;
        Self::handle_for(&grant)
    }

    async fn put(
        &self,
        handle: &TransporterHandle,
        hints: &UploadHints,
        body: Body,
    ) -> Result<u64, TransportError> {
        let grant = self.redeem(handle, HandleMethod::Put)?;
        let media_type = hints.media_type.clone().or(grant.media_type);
        self.store
            .receive(&grant.id, media_type, body, hints.exact_size())
            .await
    }

    async fn get(&self, handle: &TransporterHandle) -> Result<Download, TransportError> {
        let grant = self.redeem(handle, HandleMethod::Get)?;
        let object = self.store.fetch(&grant.id)?;
        Ok(Download {
            media_type: object.media_type,
            content_length: Some(object.bytes.len() as u64),
            body: Body::from(object.bytes),
        })
    }
}
