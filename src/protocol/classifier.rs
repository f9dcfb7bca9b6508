//! Payload classification.
//!
//! # Responsibilities
//! - Estimate payload size and media type before anything is transmitted
//! - Trust a known length (exact body size hint or `content-length`) without
//!   reading the body
//! - Otherwise read ahead at most `threshold + 1` bytes, then stop
//!
//! # Design Decisions
//! - An unknown-length body that crosses the threshold during read-ahead is
//!   HEAVY with `size_is_exact = false`; the buffered prefix is chained back
//!   in front of the unread remainder, so no byte is lost or sent early
//! - A body that ends during read-ahead has an exact size

use axum::body::{Body, HttpBody};
use axum::http::{header, HeaderMap};
use bytes::{Bytes, BytesMut};
use futures_util::{future, stream, StreamExt};

use crate::error::ClassificationError;
use crate::protocol::threshold::Threshold;

/// Where the payload bytes live.
pub enum PayloadSource {
    /// Fully buffered payload.
    Buffered(Bytes),
    /// Bytes already read (possibly none) followed by the unread body.
    Streaming { prefix: Bytes, rest: Body },
}

impl std::fmt::Debug for PayloadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadSource::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            PayloadSource::Streaming { prefix, .. } => f
                .debug_struct("Streaming")
                .field("prefix_len", &prefix.len())
                .finish_non_exhaustive(),
        }
    }
}

/// One outbound or inbound payload, owned by the leg that created it.
#[derive(Debug)]
pub struct PayloadEnvelope {
    pub media_type: Option<String>,
    pub size_estimate: u64,
    pub size_is_exact: bool,
    source: PayloadSource,
}

impl PayloadEnvelope {
    pub fn from_bytes(bytes: Bytes, media_type: Option<String>) -> Self {
        Self {
            media_type,
            size_estimate: bytes.len() as u64,
            size_is_exact: true,
            source: PayloadSource::Buffered(bytes),
        }
    }

    pub fn source(&self) -> &PayloadSource {
        &self.source
    }

    /// Exact size, if known.
    pub fn exact_size(&self) -> Option<u64> {
        self.size_is_exact.then_some(self.size_estimate)
    }

    /// Turn the envelope back into a body carrying every payload byte.
    pub fn into_body(self) -> Body {
        match self.source {
            PayloadSource::Buffered(bytes) => Body::from(bytes),
            PayloadSource::Streaming { prefix, rest } if prefix.is_empty() => rest,
            PayloadSource::Streaming { prefix, rest } => {
                let head = stream::once(future::ready(Ok::<_, axum::Error>(prefix)));
                Body::from_stream(head.chain(rest.into_data_stream()))
            }
        }
    }
}

/// Classify a payload against the threshold that applies to its leg.
pub async fn classify(
    headers: &HeaderMap,
    body: Body,
    threshold: Threshold,
) -> Result<PayloadEnvelope, ClassificationError> {
    let media_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    if let Some(size) = body.size_hint().exact().or_else(|| declared_length(headers)) {
        return Ok(PayloadEnvelope {
            media_type,
            size_estimate: size,
            size_is_exact: true,
            source: PayloadSource::Streaming {
                prefix: Bytes::new(),
                rest: body,
            },
        });
    }

    let Some(limit) = threshold.limit() else {
        // Nothing to compare against, so nothing worth buffering.
        return Ok(PayloadEnvelope {
            media_type,
            size_estimate: body.size_hint().lower(),
            size_is_exact: false,
            source: PayloadSource::Streaming {
                prefix: Bytes::new(),
                rest: body,
            },
        });
    };

    read_ahead(media_type, body, limit.saturating_add(1)).await
}

async fn read_ahead(
    media_type: Option<String>,
    body: Body,
    cap: u64,
) -> Result<PayloadEnvelope, ClassificationError> {
    let mut data = body.into_data_stream();
    let mut buffer = BytesMut::new();
    let mut overflow = Bytes::new();

    while (buffer.len() as u64) < cap {
        match data.next().await {
            None => {
                let bytes = buffer.freeze();
                tracing::trace!(size = bytes.len(), "Payload ended during read-ahead");
                return Ok(PayloadEnvelope::from_bytes(bytes, media_type));
            }
            Some(Ok(mut chunk)) => {
                let room = usize::try_from(cap - buffer.len() as u64).unwrap_or(usize::MAX);
                if chunk.len() > room {
                    overflow = chunk.split_off(room);
                }
                buffer.extend_from_slice(&chunk);
            }
            Some(Err(e)) => {
                return Err(ClassificationError::Stream {
                    buffered: buffer.len() as u64,
                    message: e.to_string(),
                });
            }
        }
    }

    let prefix = buffer.freeze();
    let size_estimate = (prefix.len() + overflow.len()) as u64;
    tracing::trace!(buffered = prefix.len(), "Payload crossed threshold during read-ahead");

    let rest = if overflow.is_empty() {
        Body::from_stream(data)
    } else {
        let head = stream::once(future::ready(Ok::<_, axum::Error>(overflow)));
        Body::from_stream(head.chain(data))
    };

    Ok(PayloadEnvelope {
        media_type,
        size_estimate,
        size_is_exact: false,
        source: PayloadSource::Streaming { prefix, rest },
    })
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Unknown-length body made of `chunks` chunks of `size` bytes each,
    /// counting how many chunks were pulled.
    fn chunked_body(chunks: usize, size: usize, pulled: Arc<AtomicUsize>) -> Body {
        let stream = stream::iter(0..chunks).map(move |i| {
            pulled.fetch_add(1, Ordering::SeqCst);
            Ok::<_, std::io::Error>(Bytes::from(vec![i as u8; size]))
        });
        Body::from_stream(stream)
    }

    #[tokio::test]
    async fn test_known_length_is_not_read() {
        let body = Body::from(vec![7u8; 4096]);
        let envelope = classify(&HeaderMap::new(), body, Threshold::bytes(1024))
            .await
            .unwrap();
        assert_eq!(envelope.size_estimate, 4096);
        assert!(envelope.size_is_exact);
        assert!(matches!(
            envelope.source(),
            PayloadSource::Streaming { prefix, .. } if prefix.is_empty()
        ));
    }

    #[tokio::test]
    async fn test_declared_content_length_is_trusted() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("300"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let envelope = classify(&headers, chunked_body(3, 100, pulled.clone()), Threshold::bytes(10))
            .await
            .unwrap();
        assert_eq!(envelope.size_estimate, 300);
        assert!(envelope.size_is_exact);
        assert_eq!(envelope.media_type.as_deref(), Some("application/json"));
        assert_eq!(pulled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_small_stream_is_buffered_exactly() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let envelope = classify(&HeaderMap::new(), chunked_body(4, 100, pulled), Threshold::bytes(1024))
            .await
            .unwrap();
        assert_eq!(envelope.size_estimate, 400);
        assert!(envelope.size_is_exact);
        assert!(matches!(envelope.source(), PayloadSource::Buffered(b) if b.len() == 400));
    }

    #[tokio::test]
    async fn test_read_ahead_stops_after_threshold_plus_one() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let envelope = classify(
            &HeaderMap::new(),
            chunked_body(100, 100, pulled.clone()),
            Threshold::bytes(250),
        )
        .await
        .unwrap();

        assert!(!envelope.size_is_exact);
        assert!(envelope.size_estimate > 250);
        // 251 bytes need three 100-byte chunks; the rest stays unread.
        assert_eq!(pulled.load(Ordering::SeqCst), 3);
        match envelope.source() {
            PayloadSource::Streaming { prefix, .. } => assert_eq!(prefix.len(), 251),
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_into_body_preserves_every_byte() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let envelope = classify(&HeaderMap::new(), chunked_body(10, 100, pulled), Threshold::bytes(150))
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(envelope.into_body(), usize::MAX).await.unwrap();

        let expected: Vec<u8> = (0..10u8).flat_map(|i| vec![i; 100]).collect();
        assert_eq!(bytes.as_ref(), expected.as_slice());
    }

    #[tokio::test]
    async fn test_stream_error_is_classification_error() {
        let stream = stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone")),
        ]);
        let err = classify(&HeaderMap::new(), Body::from_stream(stream), Threshold::bytes(1024))
            .await
            .unwrap_err();
        let ClassificationError::Stream { buffered, .. } = err;
        assert_eq!(buffered, 3);
    }

    #[tokio::test]
    async fn test_disabled_threshold_does_not_buffer() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let envelope = classify(&HeaderMap::new(), chunked_body(5, 10, pulled.clone()), Threshold::disabled())
            .await
            .unwrap();
        assert!(!envelope.size_is_exact);
        assert_eq!(pulled.load(Ordering::SeqCst), 0);
    }
}
