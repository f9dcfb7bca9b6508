//! Client-side connector.
//!
//! Diverts large request bodies before they hit the wire and resolves
//! marker-carrying responses before the caller sees them.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::sync::Arc;

use crate::connector::TransportHook;
use crate::engine::HeavyEngine;
use crate::error::{HeavyError, HeavyResult};
use crate::protocol::Leg;

/// HTTP client with heavy-payload handling on both legs.
#[derive(Clone)]
pub struct ClientConnector {
    engine: Arc<HeavyEngine>,
    client: Client<HttpConnector, Body>,
}

impl ClientConnector {
    pub fn new(engine: Arc<HeavyEngine>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self::with_client(engine, client)
    }

    pub fn with_client(engine: Arc<HeavyEngine>, client: Client<HttpConnector, Body>) -> Self {
        Self { engine, client }
    }

    pub fn engine(&self) -> &Arc<HeavyEngine> {
        &self.engine
    }

    /// Send a request and return the reconstructed response.
    ///
    /// If the request payload cannot be handed off, nothing is sent on the
    /// primary channel.
    pub async fn send(&self, request: Request<Body>) -> HeavyResult<Response<Body>> {
        let method = request.method().clone();
        let uri = request.uri().clone();
        let request = self.before_send(request).await?;

        let response = self.client.request(request).await.map_err(|e| {
            tracing::error!(method = %method, uri = %uri, error = %e, "Upstream request failed");
            HeavyError::Upstream(e.to_string())
        })?;
        tracing::debug!(method = %method, uri = %uri, status = %response.status(), "Upstream responded");

        self.after_receive(response.map(Body::new)).await
    }
}

#[async_trait]
impl TransportHook<Request<Body>, Response<Body>> for ClientConnector {
    async fn before_send(&self, request: Request<Body>) -> Result<Request<Body>, HeavyError> {
        let (mut parts, body) = request.into_parts();
        let prepared = self.engine.outbound(Leg::Request, &mut parts.headers, body).await?;
        Ok(Request::from_parts(parts, prepared.body))
    }

    async fn after_receive(&self, response: Response<Body>) -> Result<Response<Body>, HeavyError> {
        let (mut parts, body) = response.into_parts();
        let body = self.engine.inbound(Leg::Response, &mut parts.headers, body).await?;
        Ok(Response::from_parts(parts, body))
    }
}
