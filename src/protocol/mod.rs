//! Protocol primitives shared by both connectors.
//!
//! # Data Flow
//! ```text
//! outbound message
//!     → classifier.rs (size estimate, bounded read-ahead)
//!     → threshold.rs (DIRECT | HEAVY)
//!     → correlation.rs (id for a HEAVY transfer)
//!     → marker.rs (x-heavy-http-* headers on the primary channel)
//!
//! inbound message
//!     → marker.rs (decode; anything malformed is DIRECT)
//! ```
//!
//! None of these modules perform I/O against a transporter; that is the
//! handoff session's job.

pub mod classifier;
pub mod correlation;
pub mod marker;
pub mod threshold;

pub use classifier::{classify, PayloadEnvelope, PayloadSource};
pub use correlation::{CorrelationId, CorrelationIdGenerator, InvalidCorrelationId};
pub use marker::{Action, Leg, ProtocolMarker, HEADER_ACTION, HEADER_ID};
pub use threshold::{decide, Decision, Threshold, Thresholds};
