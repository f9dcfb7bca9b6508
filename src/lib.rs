//! heavy-http
//!
//! Moves large HTTP payloads out of band. A body over the configured
//! threshold goes to a transporter; the HTTP message itself carries only
//! two marker headers naming where the payload went.
//!
//! # Architecture Overview
//!
//! ```text
//!        CLIENT PROCESS                                   SERVER PROCESS
//!  ┌───────────────────────────┐                  ┌───────────────────────────┐
//!  │ application               │                  │ application (handlers)    │
//!  │     │             ▲       │                  │     ▲             │       │
//!  │     ▼             │       │  marker headers  │     │             ▼       │
//!  │ connector::client ────────┼──── or direct ───┼─▶ connector::server       │
//!  │     │             ▲       │      bodies      │     │             ▲       │
//!  │     ▼             │       │                  │     ▼             │       │
//!  │        engine            │                  │        engine             │
//!  │  protocol  +  handoff     │                  │  protocol  +  handoff     │
//!  └──────────┬────────────────┘                  └──────────┬────────────────┘
//!             │        PUT / GET via single-use handles      │
//!             └──────────────▶  transporter  ◀───────────────┘
//!                        (memory store or HTTP exchange)
//!
//!  Cross-cutting: config, observability, lifecycle, error
//! ```

// Protocol core
pub mod engine;
pub mod error;
pub mod handoff;
pub mod protocol;
pub mod transporter;

// Integration points
pub mod connector;
pub mod http;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::HeavyConfig;
pub use connector::{ClientConnector, ServerConnector, TransportHook};
pub use engine::HeavyEngine;
pub use error::{HeavyError, HeavyResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
