//! Transporter backed by a remote storage exchange.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, Response, StatusCode},
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::error::TransportError;
use crate::protocol::CorrelationId;
use crate::transporter::exchange::{HandleRequest, UploadReceipt};
use crate::transporter::{Download, HandleMethod, Transporter, TransporterHandle, UploadHints};

/// Handle and receipt bodies are tiny JSON documents.
const CONTROL_BODY_LIMIT: usize = 64 * 1024;

/// Talks to an exchange served by [`exchange_router`](crate::transporter::exchange_router).
#[derive(Clone)]
pub struct HttpTransporter {
    client: Client<HttpConnector, Body>,
    exchange_url: Url,
}

impl HttpTransporter {
    pub fn new(exchange_url: Url) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self::with_client(client, exchange_url)
    }

    pub fn with_client(client: Client<HttpConnector, Body>, exchange_url: Url) -> Self {
        Self {
            client,
            exchange_url,
        }
    }

    pub fn exchange_url(&self) -> &Url {
        &self.exchange_url
    }

    async fn request_handle(
        &self,
        id: &CorrelationId,
        method: HandleMethod,
        media_type: Option<String>,
    ) -> Result<TransporterHandle, TransportError> {
        let url = self
            .exchange_url
            .join("handles")
            .map_err(|e| TransportError::InvalidHandle(e.to_string()))?;
        let payload = serde_json::to_vec(&HandleRequest {
            id: id.clone(),
            method,
            media_type,
        })
        .map_err(TransportError::io)?;

        let request = Request::builder()
            .method(Method::POST)
            .uri(url.as_str())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload))
            .map_err(TransportError::io)?;

        let response = self.send(request).await?;
        if !response.status().is_success() {
            return Err(error_for_status(response.status(), id, None));
        }
        let bytes = read_control_body(response).await?;
        let handle: TransporterHandle = serde_json::from_slice(&bytes).map_err(TransportError::io)?;

        tracing::debug!(
            correlation_id = %id,
            method = method.as_str(),
            url = %handle.url,
            "Exchange issued handle"
        );
        Ok(handle)
    }

    async fn send(&self, request: Request<Body>) -> Result<Response<Incoming>, TransportError> {
        self.client.request(request).await.map_err(TransportError::io)
    }
}

#[async_trait]
impl Transporter for HttpTransporter {
    async fn create_upload_handle(
        &self,
        id: &CorrelationId,
        hints: &UploadHints,
    ) -> Result<TransporterHandle, TransportError> {
        self.request_handle(id, HandleMethod::Put, hints.media_type.clone())
            .await
    }

    async fn create_download_handle(
        &self,
        id: &CorrelationId,
    ) -> Result<TransporterHandle, TransportError> {
        self.request_handle(id, HandleMethod::Get, None).await
    }

    async fn put(
        &self,
        handle: &TransporterHandle,
        hints: &UploadHints,
        body: Body,
    ) -> Result<u64, TransportError> {
        handle.ensure_usable(HandleMethod::Put)?;

        let mut request = Request::builder()
            .method(Method::PUT)
            .uri(handle.url.as_str());
        if let Some(media_type) = &hints.media_type {
            request = request.header(header::CONTENT_TYPE, media_type.as_str());
        }
        if let Some(size) = hints.exact_size() {
            request = request.header(header::CONTENT_LENGTH, size);
        }
        let request = request.body(body).map_err(TransportError::io)?;

        let response = self.send(request).await?;
        if !response.status().is_success() {
            let id = handle.correlation_id();
            return Err(error_for_status(response.status(), id.as_ref(), Some(handle)));
        }
        let bytes = read_control_body(response).await?;
        let receipt: UploadReceipt = serde_json::from_slice(&bytes).map_err(TransportError::io)?;
        Ok(receipt.stored)
    }

    async fn get(&self, handle: &TransporterHandle) -> Result<Download, TransportError> {
        handle.ensure_usable(HandleMethod::Get)?;

        let request = Request::builder()
            .method(Method::GET)
            .uri(handle.url.as_str())
            .body(Body::empty())
            .map_err(TransportError::io)?;

        let response = self.send(request).await?;
        if !response.status().is_success() {
            let id = handle.correlation_id();
            return Err(error_for_status(response.status(), id.as_ref(), Some(handle)));
        }

        let media_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let content_length = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        Ok(Download {
            media_type,
            content_length,
            body: Body::new(response.into_body()),
        })
    }
}

async fn read_control_body(response: Response<Incoming>) -> Result<bytes::Bytes, TransportError> {
    axum::body::to_bytes(Body::new(response.into_body()), CONTROL_BODY_LIMIT)
        .await
        .map_err(TransportError::io)
}

/// Map an exchange status back onto the failure it stands for.
fn error_for_status<'a>(
    status: StatusCode,
    id: impl Into<Option<&'a CorrelationId>>,
    handle: Option<&TransporterHandle>,
) -> TransportError {
    match (status, id.into(), handle) {
        (StatusCode::GONE, _, Some(handle)) => TransportError::Expired {
            expired_at: handle.expires_at,
        },
        (StatusCode::CONFLICT, _, _) => TransportError::HandleConsumed,
        (StatusCode::NOT_FOUND, Some(id), _) => TransportError::NotFound(id.clone()),
        (StatusCode::FORBIDDEN, _, _) => TransportError::InvalidHandle(format!(
            "exchange refused handle ({})",
            status
        )),
        _ => TransportError::Rejected {
            status: status.as_u16(),
        },
    }
}
