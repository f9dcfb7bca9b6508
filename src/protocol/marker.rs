//! Protocol marker codec.
//!
//! A heavy message carries exactly two reserved headers:
//!
//! | header                | value                                   |
//! |-----------------------|-----------------------------------------|
//! | `x-heavy-http-action` | `upload-ready` (request) / `fetch` (response) |
//! | `x-heavy-http-id`     | the correlation id                      |
//!
//! The leg is implied by the direction of the message, so it is not put on
//! the wire. Decoding is the only place that tells HEAVY from DIRECT and it
//! never fails: a missing, duplicated, or malformed header means DIRECT.

use axum::http::{HeaderMap, HeaderValue};

use crate::protocol::correlation::CorrelationId;

/// Header carrying the marker action.
pub const HEADER_ACTION: &str = "x-heavy-http-action";

/// Header carrying the correlation id.
pub const HEADER_ID: &str = "x-heavy-http-id";

/// Which logical leg of an exchange a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Leg {
    Request,
    Response,
}

impl Leg {
    pub fn as_str(&self) -> &'static str {
        match self {
            Leg::Request => "request",
            Leg::Response => "response",
        }
    }
}

impl std::fmt::Display for Leg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker action telling the receiver what to do with the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// The request payload was uploaded; the server downloads it.
    UploadReady,
    /// The response payload was uploaded; the client fetches it.
    Fetch,
}

impl Action {
    /// The only action valid on a given leg.
    pub fn for_leg(leg: Leg) -> Self {
        match leg {
            Leg::Request => Action::UploadReady,
            Leg::Response => Action::Fetch,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::UploadReady => "upload-ready",
            Action::Fetch => "fetch",
        }
    }

    /// Lenient parse: surrounding whitespace and ASCII case are ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("upload-ready") {
            Some(Action::UploadReady)
        } else if raw.eq_ignore_ascii_case("fetch") {
            Some(Action::Fetch)
        } else {
            None
        }
    }
}

/// Marker flagging a message as heavy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolMarker {
    pub leg: Leg,
    pub correlation_id: CorrelationId,
    pub action: Action,
}

impl ProtocolMarker {
    /// Build the marker announcing a completed upload on `leg`.
    pub fn for_leg(leg: Leg, correlation_id: CorrelationId) -> Self {
        Self {
            leg,
            correlation_id,
            action: Action::for_leg(leg),
        }
    }

    /// Encode into a fresh header set holding exactly the two marker headers.
    pub fn encode(&self) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(2);
        self.apply(&mut headers);
        headers
    }

    /// Write the marker into `headers`, replacing any previous marker.
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(HEADER_ACTION, HeaderValue::from_static(self.action.as_str()));
        // Correlation ids are validated to [A-Za-z0-9_-] so this cannot fail.
        if let Ok(value) = HeaderValue::from_str(self.correlation_id.as_str()) {
            headers.insert(HEADER_ID, value);
        }
    }

    /// Decode a marker from a message travelling on `leg`.
    pub fn decode(headers: &HeaderMap, leg: Leg) -> Option<Self> {
        let action = single_value(headers, HEADER_ACTION)?;
        let id = single_value(headers, HEADER_ID)?;

        let Some(action) = Action::parse(action) else {
            tracing::debug!(leg = %leg, action = %action, "Ignoring unknown marker action");
            return None;
        };
        if action != Action::for_leg(leg) {
            tracing::debug!(leg = %leg, action = action.as_str(), "Ignoring marker for the other leg");
            return None;
        }
        let Some(correlation_id) = CorrelationId::parse(id.trim()) else {
            tracing::debug!(leg = %leg, "Ignoring marker with malformed correlation id");
            return None;
        };

        Some(Self {
            leg,
            correlation_id,
            action,
        })
    }
}

/// True if either marker header is present at all, well-formed or not.
pub fn has_marker_headers(headers: &HeaderMap) -> bool {
    headers.contains_key(HEADER_ACTION) || headers.contains_key(HEADER_ID)
}

/// Remove every marker header. Returns whether anything was removed.
pub fn strip(headers: &mut HeaderMap) -> bool {
    let had_action = headers.remove(HEADER_ACTION).is_some();
    let had_id = headers.remove(HEADER_ID).is_some();
    had_action || had_id
}

fn single_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let mut values = headers.get_all(name).iter();
    let first = values.next()?;
    if values.next().is_some() {
        return None;
    }
    first.to_str().ok()
}
