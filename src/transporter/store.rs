//! Object store backing the in-memory transporter and the storage exchange.

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::error::TransportError;
use crate::observability::metrics;
use crate::protocol::CorrelationId;
use crate::transporter::HandleMethod;

/// Default cap on a single stored payload.
pub const DEFAULT_MAX_OBJECT_BYTES: u64 = 256 * 1024 * 1024;

/// A handle token issued by the store.
#[derive(Debug, Clone)]
pub struct Grant {
    pub token: String,
    pub id: CorrelationId,
    pub method: HandleMethod,
    pub expires_at: SystemTime,
    pub media_type: Option<String>,
}

#[derive(Debug)]
struct GrantEntry {
    grant: Grant,
    redeemed: bool,
}

/// A payload waiting to be downloaded.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub media_type: Option<String>,
    pub expires_at: SystemTime,
}

/// Thread-safe store of heavy payloads keyed by correlation id.
///
/// Cheap to clone; clones share the same maps.
#[derive(Clone)]
pub struct ObjectStore {
    grants: Arc<DashMap<String, GrantEntry>>,
    objects: Arc<DashMap<CorrelationId, StoredObject>>,
    handle_ttl: Duration,
    object_ttl: Duration,
    max_object_bytes: u64,
}

impl ObjectStore {
    pub fn new(handle_ttl: Duration, object_ttl: Duration) -> Self {
        Self {
            grants: Arc::new(DashMap::new()),
            objects: Arc::new(DashMap::new()),
            handle_ttl,
            object_ttl,
            max_object_bytes: DEFAULT_MAX_OBJECT_BYTES,
        }
    }

    pub fn with_max_object_bytes(mut self, limit: u64) -> Self {
        self.max_object_bytes = limit;
        self
    }

    pub fn handle_ttl(&self) -> Duration {
        self.handle_ttl
    }

    pub fn max_object_bytes(&self) -> u64 {
        self.max_object_bytes
    }

    /// Issue a single-use token for `method` on `id`.
    ///
    /// Download grants are only issued for payloads that are stored and
    /// unexpired.
    pub fn issue(
        &self,
        id: &CorrelationId,
        method: HandleMethod,
        media_type: Option<String>,
    ) -> Result<Grant, TransportError> {
        if method == HandleMethod::Get && self.lookup(id).is_none() {
            return Err(TransportError::NotFound(id.clone()));
        }

        let grant = Grant {
            token: Uuid::new_v4().simple().to_string(),
            id: id.clone(),
            method,
            expires_at: SystemTime::now() + self.handle_ttl,
            media_type,
        };
        self.grants.insert(
            grant.token.clone(),
            GrantEntry {
                grant: grant.clone(),
                redeemed: false,
            },
        );

        tracing::debug!(
            correlation_id = %id,
            method = method.as_str(),
            ttl_secs = self.handle_ttl.as_secs(),
            "Handle issued"
        );
        Ok(grant)
    }

    /// Redeem a token. A token can be redeemed once, for the id and method
    /// it was issued for, before it expires.
    pub fn redeem(
        &self,
        token: &str,
        id: &CorrelationId,
        method: HandleMethod,
    ) -> Result<Grant, TransportError> {
        let mut entry = self
            .grants
            .get_mut(token)
            .ok_or_else(|| TransportError::InvalidHandle("unknown token".to_string()))?;

        if SystemTime::now() >= entry.grant.expires_at {
            return Err(TransportError::Expired {
                expired_at: entry.grant.expires_at,
            });
        }
        if entry.redeemed {
            return Err(TransportError::HandleConsumed);
        }
        if entry.grant.id != *id || entry.grant.method != method {
            return Err(TransportError::InvalidHandle(format!(
                "token does not grant {} on {}",
                method.as_str(),
                id
            )));
        }

        entry.redeemed = true;
        Ok(entry.grant.clone())
    }

    /// Drain `body` and store it under `id`.
    ///
    /// Nothing becomes visible unless the whole stream arrived within
    /// `max_object_bytes` and, when `expected` is given, its length matches.
    pub async fn receive(
        &self,
        id: &CorrelationId,
        media_type: Option<String>,
        body: Body,
        expected: Option<u64>,
    ) -> Result<u64, TransportError> {
        if expected.is_some_and(|len| len > self.max_object_bytes) {
            tracing::warn!(correlation_id = %id, expected, limit = self.max_object_bytes, "Upload too large");
            return Err(TransportError::TooLarge {
                limit: self.max_object_bytes,
            });
        }
        let bytes = collect_limited(body, self.max_object_bytes).await?;

        let actual = bytes.len() as u64;
        if let Some(expected) = expected {
            if expected != actual {
                tracing::warn!(correlation_id = %id, expected, actual, "Upload length mismatch");
                return Err(TransportError::Incomplete { expected, actual });
            }
        }

        self.commit(id, bytes, media_type);
        Ok(actual)
    }

    /// Store a complete payload under `id`, replacing any earlier one.
    pub fn commit(&self, id: &CorrelationId, bytes: Bytes, media_type: Option<String>) {
        let size = bytes.len();
        self.objects.insert(
            id.clone(),
            StoredObject {
                bytes,
                media_type,
                expires_at: SystemTime::now() + self.object_ttl,
            },
        );
        metrics::record_stored_objects(self.objects.len());
        tracing::debug!(correlation_id = %id, size, "Payload stored");
    }

    /// Fetch an unexpired payload.
    pub fn fetch(&self, id: &CorrelationId) -> Result<StoredObject, TransportError> {
        self.lookup(id)
            .ok_or_else(|| TransportError::NotFound(id.clone()))
    }

    fn lookup(&self, id: &CorrelationId) -> Option<StoredObject> {
        let object = self.objects.get(id)?.value().clone();
        if SystemTime::now() >= object.expires_at {
            self.objects.remove(id);
            return None;
        }
        Some(object)
    }

    /// Drop expired payloads and expired or redeemed grants.
    /// Returns the number of payloads removed.
    pub fn purge_expired(&self) -> usize {
        let now = SystemTime::now();
        let before = self.objects.len();
        self.objects.retain(|_, object| now < object.expires_at);
        self.grants
            .retain(|_, entry| !entry.redeemed && now < entry.grant.expires_at);

        let removed = before.saturating_sub(self.objects.len());
        if removed > 0 {
            tracing::info!(removed, remaining = self.objects.len(), "Purged expired payloads");
        }
        metrics::record_stored_objects(self.objects.len());
        removed
    }

    /// Number of stored payloads, expired or not.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Number of outstanding grants.
    pub fn grant_count(&self) -> usize {
        self.grants.len()
    }
}

/// Drain `body`, failing as soon as it grows past `limit` bytes.
pub(crate) async fn collect_limited(body: Body, limit: u64) -> Result<Bytes, TransportError> {
    let mut data = body.into_data_stream();
    let mut buffer = BytesMut::new();
    while let Some(chunk) = data.next().await {
        let chunk = chunk.map_err(TransportError::io)?;
        if (buffer.len() + chunk.len()) as u64 > limit {
            return Err(TransportError::TooLarge { limit });
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(300), Duration::from_secs(900))
    }
}
