//! End-to-end scenarios over real sockets: client connector, server
//! connector, and an HTTP storage exchange between them.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use heavy_http::error::TransportError;
use heavy_http::handoff::SessionRole;
use heavy_http::protocol::{CorrelationId, Leg, HEADER_ACTION, HEADER_ID};
use heavy_http::transporter::{
    Download, HandleMethod, HttpTransporter, ObjectStore, Transporter, TransporterHandle, UploadHints,
};
use heavy_http::{ClientConnector, HeavyError, Shutdown};

mod common;
use common::Observed;

async fn body_bytes(body: Body) -> Vec<u8> {
    axum::body::to_bytes(body, usize::MAX).await.unwrap().to_vec()
}

#[tokio::test]
async fn test_heavy_request_is_reconstructed_on_server() {
    let shutdown = Shutdown::new();
    let store = ObjectStore::default();
    let exchange = common::start_exchange(&store, &shutdown).await;

    let observed = Arc::new(Observed::default());
    let server_engine = common::http_engine(4096, &exchange);
    let addr = common::serve(common::observed_echo_app(server_engine, observed.clone()), &shutdown).await;

    let client = ClientConnector::new(common::http_engine(1024, &exchange));
    let payload = common::payload(2048);
    let request = Request::post(format!("http://{}/echo", addr))
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from(payload.clone()))
        .unwrap();

    let response = client.send(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let raw = observed.last_raw_headers();
    assert_eq!(raw[HEADER_ACTION], "upload-ready");
    assert!(CorrelationId::parse(raw[HEADER_ID].to_str().unwrap()).is_some());
    assert_eq!(&observed.last_handler_body()[..], &payload[..]);

    // 2048 bytes stay under the server's 4096-byte response threshold.
    assert!(!response.headers().contains_key(HEADER_ID));
    assert_eq!(body_bytes(response.into_body()).await, payload);

    shutdown.trigger();
}

#[tokio::test]
async fn test_multi_megabyte_request_reaches_handler_intact() {
    let shutdown = Shutdown::new();
    let store = ObjectStore::default();
    let exchange = common::start_exchange(&store, &shutdown).await;

    let observed = Arc::new(Observed::default());
    let addr = common::serve(
        common::observed_echo_app(common::http_engine(1024 * 1024, &exchange), observed.clone()),
        &shutdown,
    )
    .await;

    let client = ClientConnector::new(common::http_engine(1024 * 1024, &exchange));
    let payload = common::payload(3 * 1024 * 1024);
    let response = client
        .send(
            Request::post(format!("http://{}/echo", addr))
                .body(Body::from(payload.clone()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(observed.last_raw_headers()[HEADER_ACTION], "upload-ready");
    assert_eq!(observed.last_handler_body().len(), payload.len());
    assert_eq!(body_bytes(response.into_body()).await, payload);

    shutdown.trigger();
}

#[tokio::test]
async fn test_heavy_response_is_reconstructed_on_client() {
    let shutdown = Shutdown::new();
    let store = ObjectStore::default();
    let exchange = common::start_exchange(&store, &shutdown).await;

    let observed = Arc::new(Observed::default());
    let addr = common::serve(
        common::observed_echo_app(common::http_engine(1024, &exchange), observed.clone()),
        &shutdown,
    )
    .await;

    let client = ClientConnector::new(common::http_engine(1024 * 1024, &exchange));
    let payload = common::payload(5000);
    let request = Request::post(format!("http://{}/echo", addr))
        .body(Body::from(payload.clone()))
        .unwrap();

    let response = client.send(request).await.unwrap();
    assert!(!response.headers().contains_key(HEADER_ACTION));
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "5000");
    assert_eq!(body_bytes(response.into_body()).await, payload);

    // The request itself went directly.
    assert!(!observed.last_raw_headers().contains_key(HEADER_ID));
    shutdown.trigger();
}

#[tokio::test]
async fn test_small_payload_goes_direct() {
    let shutdown = Shutdown::new();
    let store = ObjectStore::default();
    let exchange = common::start_exchange(&store, &shutdown).await;

    let observed = Arc::new(Observed::default());
    let addr = common::serve(
        common::observed_echo_app(common::http_engine(1024, &exchange), observed.clone()),
        &shutdown,
    )
    .await;

    let client = ClientConnector::new(common::http_engine(1024, &exchange));
    let payload = common::payload(512);
    let response = client
        .send(
            Request::post(format!("http://{}/echo", addr))
                .body(Body::from(payload.clone()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(!observed.last_raw_headers().contains_key(HEADER_ACTION));
    assert!(!observed.last_raw_headers().contains_key(HEADER_ID));
    assert_eq!(body_bytes(response.into_body()).await, payload);
    assert!(store.is_empty());
    assert_eq!(store.grant_count(), 0);

    shutdown.trigger();
}

#[tokio::test]
async fn test_protocol_unaware_peer_sees_plain_http() {
    let shutdown = Shutdown::new();
    let store = ObjectStore::default();
    let exchange = common::start_exchange(&store, &shutdown).await;

    let observed = Arc::new(Observed::default());
    let addr = common::serve(
        common::observed_echo_app(common::http_engine(1024, &exchange), observed.clone()),
        &shutdown,
    )
    .await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/echo", addr))
        .body(common::payload(512))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert!(response.headers().get(HEADER_ACTION).is_none());
    assert!(response.headers().get(HEADER_ID).is_none());
    assert_eq!(response.bytes().await.unwrap().to_vec(), common::payload(512));

    shutdown.trigger();
}

/// Never answers a handle request.
struct StalledTransporter;

#[async_trait]
impl Transporter for StalledTransporter {
    async fn create_upload_handle(
        &self,
        _id: &CorrelationId,
        _hints: &UploadHints,
    ) -> Result<TransporterHandle, TransportError> {
        std::future::pending().await
    }

    async fn create_download_handle(&self, _id: &CorrelationId) -> Result<TransporterHandle, TransportError> {
        std::future::pending().await
    }

    async fn put(&self, _handle: &TransporterHandle, _hints: &UploadHints, _body: Body) -> Result<u64, TransportError> {
        panic!("put must not be reached without a handle");
    }

    async fn get(&self, _handle: &TransporterHandle) -> Result<Download, TransportError> {
        panic!("get must not be reached without a handle");
    }
}

#[tokio::test]
async fn test_upload_timeout_never_contacts_server() {
    let shutdown = Shutdown::new();
    let store = ObjectStore::default();
    let exchange = common::start_exchange(&store, &shutdown).await;

    let observed = Arc::new(Observed::default());
    let addr = common::serve(
        common::observed_echo_app(common::http_engine(1024, &exchange), observed.clone()),
        &shutdown,
    )
    .await;

    let client = ClientConnector::new(common::engine(
        1024,
        Arc::new(StalledTransporter),
        Duration::from_millis(100),
    ));
    let err = client
        .send(
            Request::post(format!("http://{}/echo", addr))
                .body(Body::from(common::payload(2048)))
                .unwrap(),
        )
        .await
        .unwrap_err();

    match &err {
        HeavyError::Transport { leg, role, source, .. } => {
            assert_eq!(*leg, Leg::Request);
            assert_eq!(*role, SessionRole::Upload);
            assert!(source.is_timeout());
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(observed.request_count(), 0);

    shutdown.trigger();
}

#[tokio::test]
async fn test_missing_payload_on_server_is_bad_gateway() {
    let shutdown = Shutdown::new();
    let store = ObjectStore::default();
    let exchange = common::start_exchange(&store, &shutdown).await;

    let observed = Arc::new(Observed::default());
    let addr = common::serve(
        common::observed_echo_app(common::http_engine(1024, &exchange), observed.clone()),
        &shutdown,
    )
    .await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/echo", addr))
        .header(HEADER_ACTION, "upload-ready")
        .header(HEADER_ID, "never-uploaded")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
    assert!(observed.handler_bodies.lock().unwrap().is_empty());

    shutdown.trigger();
}

#[tokio::test]
async fn test_exchange_rejects_expired_handle() {
    let shutdown = Shutdown::new();
    let store = ObjectStore::new(Duration::from_millis(50), Duration::from_secs(60));
    let exchange = common::start_exchange(&store, &shutdown).await;
    let transporter = HttpTransporter::new(exchange);

    let id = CorrelationId::parse("expiring").unwrap();
    let hints = UploadHints::default();
    let handle = transporter.create_upload_handle(&id, &hints).await.unwrap();
    assert_eq!(handle.method, HandleMethod::Put);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Caught locally from the handle's own expiry.
    let err = transporter.put(&handle, &hints, Body::from("late")).await.unwrap_err();
    assert!(err.is_expired());

    // Caught by the exchange even if the client clock disagrees.
    let mut forged = handle.clone();
    forged.expires_at = SystemTime::now() + Duration::from_secs(3600);
    let err = transporter.put(&forged, &hints, Body::from("late")).await.unwrap_err();
    assert!(err.is_expired());
    assert!(store.is_empty());

    shutdown.trigger();
}

#[tokio::test]
async fn test_exchange_handles_are_single_use() {
    let shutdown = Shutdown::new();
    let store = ObjectStore::default();
    let exchange = common::start_exchange(&store, &shutdown).await;
    let transporter = HttpTransporter::new(exchange);

    let id = CorrelationId::parse("once").unwrap();
    let hints = UploadHints::default();
    let handle = transporter.create_upload_handle(&id, &hints).await.unwrap();
    assert_eq!(transporter.put(&handle, &hints, Body::from("first")).await.unwrap(), 5);

    let err = transporter.put(&handle, &hints, Body::from("second")).await.unwrap_err();
    assert_eq!(err, TransportError::HandleConsumed);

    let download = transporter.create_download_handle(&id).await.unwrap();
    let fetched = transporter.get(&download).await.unwrap();
    assert_eq!(fetched.content_length, Some(5));
    assert_eq!(body_bytes(fetched.body).await, b"first");

    shutdown.trigger();
}
