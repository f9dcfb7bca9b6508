//! Shared utilities for integration testing.

#![allow(dead_code)]

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Request, State},
    http::HeaderMap,
    middleware::{self, Next},
    response::Response,
    routing::post,
    Router,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use url::Url;

use heavy_http::protocol::{Threshold, Thresholds};
use heavy_http::transporter::{exchange_router, HttpTransporter, ObjectStore, Transporter};
use heavy_http::{HeavyEngine, Shutdown};

/// Serve `router` on an ephemeral port until `shutdown` fires.
pub async fn serve(router: Router, shutdown: &Shutdown) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let signal = shutdown.signalled();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).with_graceful_shutdown(signal).await;
    });
    addr
}

/// Start a storage exchange over `store`; returns its base URL.
pub async fn start_exchange(store: &ObjectStore, shutdown: &Shutdown) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
    let router = exchange_router(store.clone(), url.clone());
    let signal = shutdown.signalled();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).with_graceful_shutdown(signal).await;
    });
    url
}

pub fn engine(limit: u64, transporter: Arc<dyn Transporter>, timeout: Duration) -> Arc<HeavyEngine> {
    Arc::new(HeavyEngine::new(
        Thresholds::new(Threshold::bytes(limit), Threshold::bytes(limit)),
        transporter,
        timeout,
    ))
}

pub fn http_engine(limit: u64, exchange: &Url) -> Arc<HeavyEngine> {
    engine(
        limit,
        Arc::new(HttpTransporter::new(exchange.clone())),
        Duration::from_secs(5),
    )
}

/// What the server saw on the wire, before the connector touched it.
#[derive(Default)]
pub struct Observed {
    pub requests: AtomicUsize,
    pub raw_headers: Mutex<Vec<HeaderMap>>,
    pub handler_bodies: Mutex<Vec<Bytes>>,
}

impl Observed {
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn last_raw_headers(&self) -> HeaderMap {
        self.raw_headers.lock().unwrap().last().cloned().unwrap()
    }

    pub fn last_handler_body(&self) -> Bytes {
        self.handler_bodies.lock().unwrap().last().cloned().unwrap()
    }
}

async fn record_raw(State(observed): State<Arc<Observed>>, request: Request, next: Next) -> Response {
    observed.requests.fetch_add(1, Ordering::SeqCst);
    observed.raw_headers.lock().unwrap().push(request.headers().clone());
    next.run(request).await
}

/// Echo application behind a server connector, recording raw traffic.
pub fn observed_echo_app(engine: Arc<HeavyEngine>, observed: Arc<Observed>) -> Router {
    let connector = Arc::new(heavy_http::ServerConnector::new(engine, true));
    let handler_observed = observed.clone();
    let app = Router::new().route(
        "/echo",
        post(move |body: Bytes| {
            let observed = handler_observed.clone();
            async move {
                observed.handler_bodies.lock().unwrap().push(body.clone());
                Body::from(body)
            }
        }),
    )
    .layer(DefaultBodyLimit::disable());
    connector
        .attach(app)
        .layer(middleware::from_fn_with_state(observed, record_raw))
}

pub fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i * 31 % 256) as u8).collect()
}
