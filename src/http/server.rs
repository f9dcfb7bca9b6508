//! HTTP server for the demo application.
//!
//! # Responsibilities
//! - Create the Axum router for the demo application
//! - Put the server connector in front of every handler
//! - Wire up tracing and request timeout layers
//! - Serve until the shutdown signal fires

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::HeavyConfig;
use crate::connector::ServerConnector;
use crate::engine::HeavyEngine;
use crate::http::handlers;

/// Demo application server.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: HeavyConfig, engine: Arc<HeavyEngine>) -> Self {
        let connector = Arc::new(ServerConnector::new(engine, config.server.expose_headers));
        let router = Self::build_router(&config, connector);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &HeavyConfig, connector: Arc<ServerConnector>) -> Router {
        // Rebuilt heavy bodies reach handlers at full size, up to the object cap.
        let body_limit = usize::try_from(config.exchange.max_object_bytes).unwrap_or(usize::MAX);
        let app = Router::new()
            .route("/echo", post(handlers::echo))
            .route("/payload/{size}", get(handlers::payload))
            .route("/health", get(handlers::health))
            .layer(DefaultBodyLimit::max(body_limit));

        connector
            .attach(app)
            .layer(TimeoutLayer::new(config.timeouts.request()))
            .layer(TraceLayer::new_for_http())
    }

    /// Router with every layer applied, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CorrelationId, Leg, ProtocolMarker, HEADER_ACTION};
    use crate::transporter::{MemoryTransporter, ObjectStore};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use bytes::Bytes;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_heavy_request_beyond_extractor_default_reaches_handler() {
        let config = HeavyConfig::default();
        let store = ObjectStore::default();
        let engine = HeavyEngine::from_config(&config, Arc::new(MemoryTransporter::new(store.clone())));
        let server = HttpServer::new(config, Arc::new(engine));

        let payload = handlers::pattern(3 * 1024 * 1024);
        let id = CorrelationId::parse("three-mib").unwrap();
        store.commit(&id, Bytes::from(payload.clone()), None);

        let mut request = Request::post("/echo").body(Body::empty()).unwrap();
        ProtocolMarker::for_leg(Leg::Request, id).apply(request.headers_mut());

        let response = server.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // The echoed body is over the response threshold, so it comes back diverted.
        assert_eq!(response.headers()[HEADER_ACTION], "fetch");
        let marker = ProtocolMarker::decode(response.headers(), Leg::Response).unwrap();
        assert_eq!(store.fetch(&marker.correlation_id).unwrap().bytes, Bytes::from(payload));
    }
}
