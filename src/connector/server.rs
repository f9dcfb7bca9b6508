//! Server-side connector.
//!
//! # Responsibilities
//! - Resolve marker-carrying requests before the application handler runs
//! - Divert large response bodies to the transporter
//! - Expose the marker headers to browser clients on heavy responses
//! - Map handoff failures to HTTP status codes
//!
//! Installed as an axum middleware so handlers never see markers.

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, Response, StatusCode},
    middleware::{self, Next},
    response::IntoResponse,
    Router,
};
use std::sync::Arc;

use crate::connector::TransportHook;
use crate::engine::HeavyEngine;
use crate::error::HeavyError;
use crate::protocol::{Leg, HEADER_ACTION, HEADER_ID};

/// Value appended to `access-control-expose-headers` on heavy responses.
pub const EXPOSED_MARKER_HEADERS: &str = "x-heavy-http-action, x-heavy-http-id";

/// Heavy-payload handling for an HTTP server.
pub struct ServerConnector {
    engine: Arc<HeavyEngine>,
    expose_headers: bool,
}

impl ServerConnector {
    pub fn new(engine: Arc<HeavyEngine>, expose_headers: bool) -> Self {
        Self {
            engine,
            expose_headers,
        }
    }

    pub fn engine(&self) -> &Arc<HeavyEngine> {
        &self.engine
    }

    /// Wrap every route of `router` with [`heavy_middleware`].
    pub fn attach<S>(self: Arc<Self>, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(middleware::from_fn_with_state(self, heavy_middleware))
    }
}

#[async_trait]
impl TransportHook<Response<Body>, Request> for ServerConnector {
    async fn before_send(&self, response: Response<Body>) -> Result<Response<Body>, HeavyError> {
        let (mut parts, body) = response.into_parts();
        let prepared = self.engine.outbound(Leg::Response, &mut parts.headers, body).await?;
        if prepared.is_heavy() && self.expose_headers {
            parts.headers.append(
                header::ACCESS_CONTROL_EXPOSE_HEADERS,
                HeaderValue::from_static(EXPOSED_MARKER_HEADERS),
            );
        }
        Ok(Response::from_parts(parts, prepared.body))
    }

    async fn after_receive(&self, request: Request) -> Result<Request, HeavyError> {
        let (mut parts, body) = request.into_parts();
        let body = self.engine.inbound(Leg::Request, &mut parts.headers, body).await?;
        Ok(Request::from_parts(parts, body))
    }
}

/// Middleware running the server connector around the next service.
pub async fn heavy_middleware(
    State(connector): State<Arc<ServerConnector>>,
    request: Request,
    next: Next,
) -> Response<Body> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let request = match connector.after_receive(request).await {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(method = %method, path = %path, error = %e, "Failed to resolve heavy request");
            return error_response(&e);
        }
    };

    let response = next.run(request).await;

    match connector.before_send(response).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(method = %method, path = %path, error = %e, "Failed to divert heavy response");
            error_response(&e)
        }
    }
}

/// Status code reported to the peer for an engine failure.
pub fn status_for(err: &HeavyError) -> StatusCode {
    match err {
        HeavyError::Transport { source, .. } if source.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
        HeavyError::Transport { .. } | HeavyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        HeavyError::Classification { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Plain-text error response. Never carries marker headers.
pub fn error_response(err: &HeavyError) -> Response<Body> {
    let mut response = (status_for(err), err.to_string()).into_response();
    response.headers_mut().remove(HEADER_ACTION);
    response.headers_mut().remove(HEADER_ID);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::protocol::{marker, CorrelationId, ProtocolMarker, Threshold, Thresholds};
    use crate::transporter::{MemoryTransporter, ObjectStore};
    use axum::routing::post;
    use bytes::Bytes;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(store: &ObjectStore, expose_headers: bool) -> Router {
        let engine = HeavyEngine::new(
            Thresholds::new(Threshold::bytes(1024), Threshold::bytes(1024)),
            Arc::new(MemoryTransporter::new(store.clone())),
            Duration::from_secs(5),
        );
        let connector = Arc::new(ServerConnector::new(Arc::new(engine), expose_headers));
        let router = Router::new().route(
            "/echo",
            post(|body: Bytes| async move {
                let mut out = body.to_vec();
                out.extend_from_slice(&body);
                out
            }),
        );
        connector.attach(router)
    }

    #[tokio::test]
    async fn test_direct_exchange_passes_through() {
        let store = ObjectStore::default();
        let response = app(&store, true)
            .oneshot(Request::post("/echo").body(Body::from("ab")).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!marker::has_marker_headers(response.headers()));
        assert!(!response.headers().contains_key(header::ACCESS_CONTROL_EXPOSE_HEADERS));
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"abab");
    }

    #[tokio::test]
    async fn test_heavy_request_reaches_handler_reconstructed() {
        let store = ObjectStore::default();
        let id = CorrelationId::parse("req-1").unwrap();
        store.commit(&id, Bytes::from_static(b"xyz"), None);

        let mut request = Request::post("/echo").body(Body::empty()).unwrap();
        ProtocolMarker::for_leg(Leg::Request, id).apply(request.headers_mut());

        let response = app(&store, true).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"xyzxyz");
    }

    #[tokio::test]
    async fn test_heavy_response_is_diverted_and_exposed() {
        let store = ObjectStore::default();
        let response = app(&store, true)
            .oneshot(Request::post("/echo").body(Body::from(vec![1u8; 600])).unwrap())
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers[HEADER_ACTION], "fetch");
        assert_eq!(headers[header::ACCESS_CONTROL_EXPOSE_HEADERS], EXPOSED_MARKER_HEADERS);
        let marker = ProtocolMarker::decode(headers, Leg::Response).unwrap();
        assert_eq!(store.fetch(&marker.correlation_id).unwrap().bytes.len(), 1200);
    }

    #[tokio::test]
    async fn test_expose_headers_can_be_disabled() {
        let store = ObjectStore::default();
        let response = app(&store, false)
            .oneshot(Request::post("/echo").body(Body::from(vec![1u8; 600])).unwrap())
            .await
            .unwrap();
        assert!(response.headers().contains_key(HEADER_ID));
        assert!(!response.headers().contains_key(header::ACCESS_CONTROL_EXPOSE_HEADERS));
    }

    #[tokio::test]
    async fn test_unknown_request_payload_fails_without_reaching_handler() {
        let store = ObjectStore::default();
        let mut request = Request::post("/echo").body(Body::empty()).unwrap();
        ProtocolMarker::for_leg(Leg::Request, CorrelationId::parse("gone").unwrap())
            .apply(request.headers_mut());

        let response = app(&store, true).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(!marker::has_marker_headers(response.headers()));
    }

    #[test]
    fn test_status_mapping() {
        let timeout = HeavyError::Transport {
            leg: Leg::Request,
            role: crate::handoff::SessionRole::Download,
            id: CorrelationId::parse("a").unwrap(),
            source: TransportError::Timeout(Duration::from_secs(1)),
        };
        assert_eq!(status_for(&timeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            status_for(&HeavyError::Classification {
                leg: Leg::Response,
                source: crate::error::ClassificationError::Stream {
                    buffered: 0,
                    message: "reset".into(),
                },
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status_for(&HeavyError::Upstream("x".into())), StatusCode::BAD_GATEWAY);
    }
}
