use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use heavy_http::protocol::{Threshold, Thresholds};
use heavy_http::transporter::HttpTransporter;
use heavy_http::{ClientConnector, HeavyEngine};

#[derive(Parser)]
#[command(name = "heavy-cli")]
#[command(about = "Send payloads through the heavy-HTTP client connector", long_about = None)]
struct Cli {
    /// Base URL of the server running the server connector.
    #[arg(short, long, default_value = "http://127.0.0.1:8080")]
    url: String,

    /// Storage exchange both peers share.
    #[arg(short, long, default_value = "http://127.0.0.1:8090/")]
    exchange: String,

    /// Request bodies larger than this many bytes are diverted. 0 disables.
    #[arg(long, default_value_t = 1024 * 1024)]
    request_threshold: u64,

    /// Response threshold used if this client ever sends a response.
    #[arg(long, default_value_t = 1024 * 1024)]
    response_threshold: u64,

    /// Bound on every transporter call, in seconds.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// POST a file and report what came back
    Send {
        /// File to upload.
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long, default_value = "/echo")]
        path: String,

        #[arg(long, default_value = "application/octet-stream")]
        content_type: String,

        /// Write the response body here instead of discarding it.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// GET a path and report what came back
    Get {
        path: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn threshold(bytes: u64) -> Threshold {
    if bytes == 0 {
        Threshold::disabled()
    } else {
        Threshold::bytes(bytes)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let engine = HeavyEngine::new(
        Thresholds::new(threshold(cli.request_threshold), threshold(cli.response_threshold)),
        Arc::new(HttpTransporter::new(Url::parse(&cli.exchange)?)),
        Duration::from_secs(cli.timeout_secs),
    );
    let connector = ClientConnector::new(Arc::new(engine));
    let base = Url::parse(&cli.url)?;

    let (request, output) = match cli.command {
        Commands::Send {
            file,
            path,
            content_type,
            output,
        } => {
            let bytes = tokio::fs::read(&file).await?;
            println!("Sending {} ({} bytes)", file.display(), bytes.len());
            let request = Request::builder()
                .method(Method::POST)
                .uri(base.join(&path)?.as_str())
                .header(header::CONTENT_TYPE, HeaderValue::from_str(&content_type)?)
                .header(header::CONTENT_LENGTH, bytes.len())
                .body(Body::from(bytes))?;
            (request, output)
        }
        Commands::Get { path, output } => {
            let request = Request::builder()
                .method(Method::GET)
                .uri(base.join(&path)?.as_str())
                .body(Body::empty())?;
            (request, output)
        }
    };

    let response = connector.send(request).await?;
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;

    println!("Status: {}", status);
    println!("Content-Type: {}", content_type);
    println!("Body: {} bytes", body.len());

    if let Some(path) = output {
        tokio::fs::write(&path, &body).await?;
        println!("Wrote {}", path.display());
    } else if !status.is_success() {
        eprintln!("{}", String::from_utf8_lossy(&body));
    }

    Ok(())
}
