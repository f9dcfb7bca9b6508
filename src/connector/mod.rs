//! Connectors that bind the engine to each end of an HTTP exchange.
//!
//! # Data Flow
//! ```text
//! client.rs                                  server.rs
//!   before_send(request)   ── HTTP ──▶   after_receive(request)
//!                                              │
//!                                         application
//!                                              │
//!   after_receive(response) ◀── HTTP ──  before_send(response)
//! ```
//!
//! # Design Decisions
//! - Both connectors share one [`HeavyEngine`](crate::engine::HeavyEngine);
//!   the only difference is which leg is outbound.
//! - A connector never falls back to sending a heavy payload directly.

use async_trait::async_trait;

use crate::error::HeavyError;

pub mod client;
pub mod server;

pub use client::ClientConnector;
pub use server::{heavy_middleware, ServerConnector};

/// Interception points around a transport.
///
/// `Out` is the message this side sends, `In` the one it receives.
#[async_trait]
pub trait TransportHook<Out, In>: Send + Sync
where
    Out: Send + 'static,
    In: Send + 'static,
{
    /// Runs just before `message` is handed to the transport.
    async fn before_send(&self, message: Out) -> Result<Out, HeavyError>;

    /// Runs as soon as `message` is received, before anyone reads its body.
    async fn after_receive(&self, message: In) -> Result<In, HeavyError>;
}
