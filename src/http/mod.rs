//! HTTP surface of the daemon.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, trace + timeout layers)
//!     → connector::server (resolve heavy request / divert heavy response)
//!     → handlers.rs (demo application)
//! ```

pub mod handlers;
pub mod server;

pub use server::HttpServer;
