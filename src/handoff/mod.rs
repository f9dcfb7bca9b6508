//! Handoff of one heavy payload off the primary channel and back.
//!
//! # States
//! ```text
//! CLASSIFIED → AWAITING_HANDLE → TRANSFERRING → COMPLETE
//!      └──────────────┴──────────────┴────────→ FAILED
//! ```
//!
//! - Upload sessions start at CLASSIFIED; download sessions start at
//!   AWAITING_HANDLE when a marker is detected
//! - Every transporter call is bounded by the session timeout
//! - A session holds at most one outstanding transporter call
//! - No automatic retries: a single-use handle may need replacing first

pub mod session;

pub use session::{HandoffSession, SessionRole, SessionState};
