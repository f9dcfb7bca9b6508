//! Direction-agnostic interception engine.
//!
//! # Data Flow
//! ```text
//! outbound (request on the client, response on the server)
//!     → classify → decide
//!         DIRECT → body untouched, stray markers stripped
//!         HEAVY  → upload session → marker headers + empty body
//!
//! inbound (request on the server, response on the client)
//!     → decode marker
//!         none   → message untouched
//!         marker → download session → reconstructed body
//! ```

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue};
use std::sync::Arc;
use std::time::Duration;

use crate::config::HeavyConfig;
use crate::error::{HeavyError, HeavyResult};
use crate::handoff::{HandoffSession, SessionRole};
use crate::observability::metrics;
use crate::protocol::{
    classify, decide, marker, CorrelationIdGenerator, Decision, Leg, ProtocolMarker, Thresholds,
};
use crate::transporter::store::DEFAULT_MAX_OBJECT_BYTES;
use crate::transporter::Transporter;

/// Result of preparing an outbound message.
#[derive(Debug)]
pub struct Prepared {
    /// Body to put on the primary channel.
    pub body: Body,
    /// Set when the payload was diverted.
    pub marker: Option<ProtocolMarker>,
}

impl Prepared {
    pub fn is_heavy(&self) -> bool {
        self.marker.is_some()
    }
}

/// Core shared by the client and server connectors.
pub struct HeavyEngine {
    thresholds: Thresholds,
    transporter: Arc<dyn Transporter>,
    ids: CorrelationIdGenerator,
    transporter_timeout: Duration,
    max_payload_bytes: u64,
}

impl HeavyEngine {
    pub fn new(
        thresholds: Thresholds,
        transporter: Arc<dyn Transporter>,
        transporter_timeout: Duration,
    ) -> Self {
        Self {
            thresholds,
            transporter,
            ids: CorrelationIdGenerator::new(),
            transporter_timeout,
            max_payload_bytes: DEFAULT_MAX_OBJECT_BYTES,
        }
    }

    /// Largest payload an inbound message may be rebuilt from.
    pub fn with_max_payload_bytes(mut self, limit: u64) -> Self {
        self.max_payload_bytes = limit;
        self
    }

    pub fn from_config(config: &HeavyConfig, transporter: Arc<dyn Transporter>) -> Self {
        Self::new(
            Thresholds::from(&config.thresholds),
            transporter,
            config.timeouts.transporter(),
        )
        .with_max_payload_bytes(config.exchange.max_object_bytes)
    }

    /// Prepare a message about to leave the process on `leg`.
    ///
    /// On a transporter failure the message must not be sent at all.
    pub async fn outbound(&self, leg: Leg, headers: &mut HeaderMap, body: Body) -> HeavyResult<Prepared> {
        let threshold = self.thresholds.for_leg(leg);
        let envelope = classify(headers, body, threshold)
            .await
            .map_err(|source| HeavyError::Classification { leg, source })?;
        let decision = decide(&envelope, threshold);
        metrics::record_message(leg, decision);

        if decision == Decision::Direct {
            if marker::strip(headers) {
                tracing::debug!(leg = %leg, "Stripped stray marker headers from direct message");
            }
            return Ok(Prepared {
                body: envelope.into_body(),
                marker: None,
            });
        }

        let id = self.ids.next();
        tracing::info!(
            correlation_id = %id,
            leg = %leg,
            size_estimate = envelope.size_estimate,
            size_is_exact = envelope.size_is_exact,
            threshold = ?threshold.limit(),
            "Payload exceeds threshold, diverting to transporter"
        );

        let mut session = HandoffSession::upload(id.clone(), leg, self.transporter_timeout);
        let marker = session
            .upload_payload(self.transporter.as_ref(), envelope)
            .await
            .map_err(|source| HeavyError::Transport {
                leg,
                role: SessionRole::Upload,
                id,
                source,
            })?;

        headers.remove(header::CONTENT_TYPE);
        headers.remove(header::TRANSFER_ENCODING);
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(0u64));
        marker.apply(headers);

        Ok(Prepared {
            body: Body::empty(),
            marker: Some(marker),
        })
    }

    /// Resolve a message that arrived on `leg`.
    pub async fn inbound(&self, leg: Leg, headers: &mut HeaderMap, body: Body) -> HeavyResult<Body> {
        let Some(marker) = ProtocolMarker::decode(headers, leg) else {
            return Ok(body);
        };
        // The marker message carries no payload of its own.
        drop(body);

        tracing::debug!(correlation_id = %marker.correlation_id, leg = %leg, "Heavy marker detected");
        let mut session =
            HandoffSession::download(&marker, self.transporter_timeout).with_max_bytes(self.max_payload_bytes);
        let envelope = session
            .download_payload(self.transporter.as_ref())
            .await
            .map_err(|source| HeavyError::Transport {
                leg,
                role: SessionRole::Download,
                id: marker.correlation_id.clone(),
                source,
            })?;

        marker::strip(headers);
        headers.remove(header::TRANSFER_ENCODING);
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(envelope.size_estimate));
        match envelope
            .media_type
            .as_deref()
            .and_then(|m| HeaderValue::from_str(m).ok())
        {
            Some(value) => {
                headers.insert(header::CONTENT_TYPE, value);
            }
            None => {
                headers.remove(header::CONTENT_TYPE);
            }
        }

        Ok(envelope.into_body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Threshold, HEADER_ACTION, HEADER_ID};
    use crate::transporter::{MemoryTransporter, ObjectStore};

    fn engine(store: &ObjectStore, limit: u64) -> HeavyEngine {
        HeavyEngine::new(
            Thresholds::new(Threshold::bytes(limit), Threshold::bytes(limit)),
            Arc::new(MemoryTransporter::new(store.clone())),
            Duration::from_secs(5),
        )
    }

    async fn body_bytes(body: Body) -> Vec<u8> {
        axum::body::to_bytes(body, usize::MAX).await.unwrap().to_vec()
    }

    #[tokio::test]
    async fn test_direct_message_is_untouched() {
        let store = ObjectStore::default();
        let engine = engine(&store, 1024);
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let prepared = engine
            .outbound(Leg::Request, &mut headers, Body::from(vec![1u8; 512]))
            .await
            .unwrap();
        assert!(!prepared.is_heavy());
        assert!(!marker::has_marker_headers(&headers));
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
        assert_eq!(body_bytes(prepared.body).await, vec![1u8; 512]);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_direct_message_loses_stray_markers() {
        let store = ObjectStore::default();
        let engine = engine(&store, 1024);
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_ID, HeaderValue::from_static("spoofed"));

        engine
            .outbound(Leg::Response, &mut headers, Body::from("small"))
            .await
            .unwrap();
        assert!(!marker::has_marker_headers(&headers));
    }

    #[tokio::test]
    async fn test_heavy_round_trip_through_headers() {
        let store = ObjectStore::default();
        let engine = engine(&store, 1024);
        let payload: Vec<u8> = (0..2048).map(|i| (i % 251) as u8).collect();

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
        let prepared = engine
            .outbound(Leg::Request, &mut headers, Body::from(payload.clone()))
            .await
            .unwrap();

        assert!(prepared.is_heavy());
        assert_eq!(headers[HEADER_ACTION], "upload-ready");
        assert!(headers.contains_key(HEADER_ID));
        assert_eq!(headers[header::CONTENT_LENGTH], "0");
        assert!(!headers.contains_key(header::CONTENT_TYPE));
        assert!(body_bytes(prepared.body).await.is_empty());

        let body = engine
            .inbound(Leg::Request, &mut headers, Body::empty())
            .await
            .unwrap();
        assert!(!marker::has_marker_headers(&headers));
        assert_eq!(headers[header::CONTENT_LENGTH], "2048");
        assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
        assert_eq!(body_bytes(body).await, payload);
    }

    #[tokio::test]
    async fn test_inbound_without_marker_passes_through() {
        let store = ObjectStore::default();
        let engine = engine(&store, 1);
        let mut headers = HeaderMap::new();
        let body = engine
            .inbound(Leg::Response, &mut headers, Body::from("plain"))
            .await
            .unwrap();
        assert_eq!(body_bytes(body).await, b"plain");
    }

    #[tokio::test]
    async fn test_inbound_failure_is_attributed() {
        let store = ObjectStore::default();
        let engine = engine(&store, 1);
        let mut headers = ProtocolMarker::for_leg(
            Leg::Response,
            crate::protocol::CorrelationId::parse("missing").unwrap(),
        )
        .encode();

        let err = engine
            .inbound(Leg::Response, &mut headers, Body::empty())
            .await
            .unwrap_err();
        match err {
            HeavyError::Transport { leg, role, .. } => {
                assert_eq!(leg, Leg::Response);
                assert_eq!(role, SessionRole::Download);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_inbound_payload_over_cap_is_refused() {
        let store = ObjectStore::default();
        let engine = engine(&store, 1).with_max_payload_bytes(16);
        let id = crate::protocol::CorrelationId::parse("huge").unwrap();
        store.commit(&id, bytes::Bytes::from(vec![0u8; 32]), None);
        let mut headers = ProtocolMarker::for_leg(Leg::Request, id).encode();

        let err = engine
            .inbound(Leg::Request, &mut headers, Body::empty())
            .await
            .unwrap_err();
        assert_eq!(
            err.transport_error(),
            Some(&crate::error::TransportError::TooLarge { limit: 16 })
        );
    }
}
