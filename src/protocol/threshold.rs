//! Threshold evaluation.
//!
//! HEAVY iff the size estimate is strictly greater than the threshold; a
//! payload exactly at the threshold is DIRECT. A disabled threshold is
//! DIRECT for every payload.

use crate::config::ThresholdConfig;
use crate::protocol::classifier::PayloadEnvelope;
use crate::protocol::marker::Leg;

/// Upper bound on DIRECT payload size for one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold(Option<u64>);

impl Threshold {
    pub const fn bytes(limit: u64) -> Self {
        Self(Some(limit))
    }

    pub const fn disabled() -> Self {
        Self(None)
    }

    pub fn limit(&self) -> Option<u64> {
        self.0
    }

    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }
}

/// Independent request and response thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub request: Threshold,
    pub response: Threshold,
}

impl Thresholds {
    pub fn new(request: Threshold, response: Threshold) -> Self {
        Self { request, response }
    }

    pub fn for_leg(&self, leg: Leg) -> Threshold {
        match leg {
            Leg::Request => self.request,
            Leg::Response => self.response,
        }
    }
}

impl From<&ThresholdConfig> for Thresholds {
    fn from(config: &ThresholdConfig) -> Self {
        let pick = |enabled: bool, bytes: u64| {
            if enabled {
                Threshold::bytes(bytes)
            } else {
                Threshold::disabled()
            }
        };
        Self {
            request: pick(config.request_enabled, config.request_bytes),
            response: pick(config.response_enabled, config.response_bytes),
        }
    }
}

/// Outcome of the threshold check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Direct,
    Heavy,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Direct => "direct",
            Decision::Heavy => "heavy",
        }
    }
}

/// Pure threshold decision for one envelope.
pub fn decide(envelope: &PayloadEnvelope, threshold: Threshold) -> Decision {
    decide_size(envelope.size_estimate, threshold)
}

pub(crate) fn decide_size(size_estimate: u64, threshold: Threshold) -> Decision {
    match threshold.limit() {
        Some(limit) if size_estimate > limit => Decision::Heavy,
        _ => Decision::Direct,
    }
}
