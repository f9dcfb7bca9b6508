//! HTTP storage exchange.
//!
//! Exposes an [`ObjectStore`] the way object stores expose presigned URLs:
//!
//! ```text
//! POST /handles          {"id", "method", "media_type"?} → TransporterHandle
//! PUT  /objects/{id}?token=...   upload body            → {"stored": n}
//! GET  /objects/{id}?token=...   stored payload
//! GET  /health
//! ```
//!
//! Handle urls are built from the configured public url, so the exchange
//! can sit behind a proxy.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use url::Url;

use crate::error::TransportError;
use crate::protocol::CorrelationId;
use crate::transporter::store::{Grant, ObjectStore};
use crate::transporter::{HandleMethod, TransporterHandle};

/// Body of `POST /handles`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleRequest {
    pub id: CorrelationId,
    pub method: HandleMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

/// Body returned by a successful upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub stored: u64,
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: String,
}

#[derive(Clone)]
struct ExchangeState {
    store: ObjectStore,
    public_url: Url,
}

/// Build the exchange router over `store`.
pub fn exchange_router(store: ObjectStore, public_url: Url) -> Router {
    let state = ExchangeState { store, public_url };
    Router::new()
        .route("/handles", post(create_handle))
        .route("/objects/{id}", put(upload_object).get(download_object))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}

/// Status code the exchange answers with for a store failure.
pub fn status_for(err: &TransportError) -> StatusCode {
    match err {
        TransportError::Expired { .. } => StatusCode::GONE,
        TransportError::HandleConsumed => StatusCode::CONFLICT,
        TransportError::InvalidHandle(_) => StatusCode::FORBIDDEN,
        TransportError::NotFound(_) => StatusCode::NOT_FOUND,
        TransportError::Incomplete { .. } | TransportError::Io(_) => StatusCode::BAD_REQUEST,
        TransportError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        TransportError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        TransportError::Rejected { .. } => StatusCode::BAD_GATEWAY,
    }
}

fn reject(err: TransportError) -> Response {
    (status_for(&err), err.to_string()).into_response()
}

fn handle_url(public_url: &Url, grant: &Grant) -> Result<Url, TransportError> {
    let mut url = public_url
        .join(&format!("objects/{}", grant.id))
        .map_err(|e| TransportError::InvalidHandle(e.to_string()))?;
    url.query_pairs_mut().append_pair("token", &grant.token);
    Ok(url)
}

async fn create_handle(
    State(state): State<ExchangeState>,
    Json(request): Json<HandleRequest>,
) -> Response {
    let grant = match state
        .store
        .issue(&request.id, request.method, request.media_type)
    {
        Ok(grant) => grant,
        Err(e) => return reject(e),
    };
    match handle_url(&state.public_url, &grant) {
        Ok(url) => Json(TransporterHandle {
            method: grant.method,
            url,
            expires_at: grant.expires_at,
        })
        .into_response(),
        Err(e) => reject(e),
    }
}

async fn upload_object(
    State(state): State<ExchangeState>,
    Path(id): Path<String>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let Some(id) = CorrelationId::parse(&id) else {
        return (StatusCode::BAD_REQUEST, "Invalid correlation id").into_response();
    };
    let grant = match state.store.redeem(&query.token, &id, HandleMethod::Put) {
        Ok(grant) => grant,
        Err(e) => {
            tracing::warn!(correlation_id = %id, error = %e, "Upload rejected");
            return reject(e);
        }
    };

    let media_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or(grant.media_type);
    let expected = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());

    match state.store.receive(&id, media_type, body, expected).await {
        Ok(stored) => (StatusCode::CREATED, Json(UploadReceipt { stored })).into_response(),
        Err(e) => {
            tracing::warn!(correlation_id = %id, error = %e, "Upload failed");
            reject(e)
        }
    }
}

async fn download_object(
    State(state): State<ExchangeState>,
    Path(id): Path<String>,
    Query(query): Query<TokenQuery>,
) -> Response {
    let Some(id) = CorrelationId::parse(&id) else {
        return (StatusCode::BAD_REQUEST, "Invalid correlation id").into_response();
    };
    let object = match state
        .store
        .redeem(&query.token, &id, HandleMethod::Get)
        .and_then(|_| state.store.fetch(&id))
    {
        Ok(object) => object,
        Err(e) => {
            tracing::warn!(correlation_id = %id, error = %e, "Download rejected");
            return reject(e);
        }
    };

    let mut response = Response::new(Body::from(object.bytes));
    if let Some(value) = object
        .media_type
        .as_deref()
        .and_then(|m| HeaderValue::from_str(m).ok())
    {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    response
}

/// Periodically purge expired payloads until shutdown.
pub async fn run_purge(store: ObjectStore, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(interval);
    tracing::info!(interval_secs = interval.as_secs(), "Exchange purge task starting");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                store.purge_expired();
            }
            _ = shutdown.recv() => {
                tracing::info!("Exchange purge task received shutdown signal, exiting loop");
                break;
            }
        }
    }
}
