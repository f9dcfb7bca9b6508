//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! engine / handoff sessions / object store
//!     → logging.rs (structured tracing events, correlation id as a field)
//!     → metrics.rs (counters, histograms, gauges)
//!
//! Consumers:
//!     → stdout via tracing-subscriber
//!     → Prometheus scrape endpoint (optional)
//! ```

pub mod logging;
pub mod metrics;
