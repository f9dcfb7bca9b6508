//! heavy-http daemon
//!
//! Runs the storage exchange and a demo application behind the server
//! connector.
//!
//! ```text
//!   :8090  storage exchange  (POST /handles, PUT|GET /objects/{id})
//!   :8080  demo application  (POST /echo, GET /payload/{size}, GET /health)
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use url::Url;

use heavy_http::config::{load_config, HeavyConfig, TransporterKind};
use heavy_http::lifecycle::{spawn_signal_handler, Shutdown};
use heavy_http::observability::{logging, metrics};
use heavy_http::transporter::{
    exchange::run_purge, exchange_router, HttpTransporter, MemoryTransporter, ObjectStore, Transporter,
};
use heavy_http::{HeavyEngine, HttpServer};

#[derive(Parser)]
#[command(name = "heavy-http")]
#[command(about = "Heavy-payload HTTP exchange and demo server", long_about = None)]
struct Args {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => HeavyConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "heavy-http starting");
    tracing::info!(
        request_threshold = config.thresholds.request_bytes,
        response_threshold = config.thresholds.response_bytes,
        transporter = ?config.transporter.kind,
        transporter_timeout_secs = config.timeouts.transporter_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let store = ObjectStore::new(config.transporter.handle_ttl(), config.transporter.object_ttl())
        .with_max_object_bytes(config.exchange.max_object_bytes);

    // Spent handles and expired payloads only leave the store through purges.
    if config.uses_object_store() {
        tokio::spawn(run_purge(
            store.clone(),
            config.exchange.purge_interval(),
            shutdown.subscribe(),
        ));
    }

    let exchange_task = if config.exchange.enabled {
        let public_url = Url::parse(&config.exchange.public_url())?;
        let listener = TcpListener::bind(&config.exchange.bind_address).await?;
        tracing::info!(
            address = %listener.local_addr()?,
            public_url = %public_url,
            "Storage exchange listening"
        );

        let app = exchange_router(store.clone(), public_url).layer(TraceLayer::new_for_http());
        let signal = shutdown.signalled();
        Some(tokio::spawn(async move {
            axum::serve(listener, app).with_graceful_shutdown(signal).await
        }))
    } else {
        None
    };

    let transporter: Arc<dyn Transporter> = match config.transporter.kind {
        TransporterKind::Memory => Arc::new(MemoryTransporter::new(store.clone())),
        TransporterKind::Http => {
            Arc::new(HttpTransporter::new(Url::parse(&config.transporter.exchange_url)?))
        }
    };
    let engine = Arc::new(HeavyEngine::from_config(&config, transporter));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let receiver = shutdown.subscribe();
    HttpServer::new(config, engine).run(listener, receiver).await?;

    // The server only returns early on error; make sure the exchange stops too.
    shutdown.trigger();
    if let Some(task) = exchange_task {
        task.await??;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
