//! Handoff session state machine.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::TransportError;
use crate::observability::metrics;
use crate::protocol::{CorrelationId, Leg, PayloadEnvelope, ProtocolMarker};
use crate::transporter::store::{collect_limited, DEFAULT_MAX_OBJECT_BYTES};
use crate::transporter::{HandleMethod, Transporter, TransporterHandle, UploadHints};

/// Which side of the storage exchange a session drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionRole {
    Upload,
    Download,
}

impl SessionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionRole::Upload => "upload",
            SessionRole::Download => "download",
        }
    }
}

impl std::fmt::Display for SessionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Classified,
    AwaitingHandle,
    Transferring,
    Complete,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Complete | SessionState::Failed)
    }

    /// Forward-only transitions, plus FAILED from any non-terminal state.
    pub fn can_advance_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Classified, AwaitingHandle) | (AwaitingHandle, Transferring) | (Transferring, Complete) => true,
            (current, Failed) => !current.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Classified => "classified",
            SessionState::AwaitingHandle => "awaiting_handle",
            SessionState::Transferring => "transferring",
            SessionState::Complete => "complete",
            SessionState::Failed => "failed",
        }
    }
}

/// In-flight bookkeeping for one (correlation id, role) transfer.
///
/// Not persisted. Dropping a session before it reaches a terminal state
/// (for example because the HTTP connection was aborted) cancels the
/// outstanding transporter call and is recorded as an abandoned transfer.
#[derive(Debug)]
pub struct HandoffSession {
    correlation_id: CorrelationId,
    leg: Leg,
    role: SessionRole,
    state: SessionState,
    last_error: Option<TransportError>,
    timeout: Duration,
    max_bytes: u64,
    started: Instant,
}

impl HandoffSession {
    /// Session for a payload that was just classified HEAVY.
    pub fn upload(correlation_id: CorrelationId, leg: Leg, timeout: Duration) -> Self {
        Self::with_state(correlation_id, leg, SessionRole::Upload, SessionState::Classified, timeout)
    }

    /// Session for a detected marker.
    pub fn download(marker: &ProtocolMarker, timeout: Duration) -> Self {
        Self::with_state(
            marker.correlation_id.clone(),
            marker.leg,
            SessionRole::Download,
            SessionState::AwaitingHandle,
            timeout,
        )
    }

    fn with_state(
        correlation_id: CorrelationId,
        leg: Leg,
        role: SessionRole,
        state: SessionState,
        timeout: Duration,
    ) -> Self {
        tracing::debug!(
            correlation_id = %correlation_id,
            leg = %leg,
            role = %role,
            state = state.as_str(),
            "Handoff session created"
        );
        Self {
            correlation_id,
            leg,
            role,
            state,
            last_error: None,
            timeout,
            max_bytes: DEFAULT_MAX_OBJECT_BYTES,
            started: Instant::now(),
        }
    }

    /// Cap on the payload a download session will buffer.
    pub fn with_max_bytes(mut self, limit: u64) -> Self {
        self.max_bytes = limit;
        self
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn leg(&self) -> Leg {
        self.leg
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn last_error(&self) -> Option<&TransportError> {
        self.last_error.as_ref()
    }

    /// Upload the payload and yield the marker for the primary channel.
    pub async fn upload_payload(
        &mut self,
        transporter: &dyn Transporter,
        envelope: PayloadEnvelope,
    ) -> Result<ProtocolMarker, TransportError> {
        debug_assert_eq!(self.role, SessionRole::Upload);
        let id = self.correlation_id.clone();
        let hints = UploadHints::from(&envelope);

        self.advance(SessionState::AwaitingHandle);
        let result = within(self.timeout, transporter.create_upload_handle(&id, &hints)).await;
        let handle = self.settle(result)?;
        self.check_handle(&handle, HandleMethod::Put)?;

        self.advance(SessionState::Transferring);
        let result = within(self.timeout, transporter.put(&handle, &hints, envelope.into_body())).await;
        let written = self.settle(result)?;
        if let Some(expected) = hints.exact_size() {
            if written != expected {
                return Err(self.fail(TransportError::Incomplete {
                    expected,
                    actual: written,
                }));
            }
        }

        self.complete(written);
        Ok(ProtocolMarker::for_leg(self.leg, id))
    }

    /// Download the payload named by the marker and rebuild its envelope.
    pub async fn download_payload(
        &mut self,
        transporter: &dyn Transporter,
    ) -> Result<PayloadEnvelope, TransportError> {
        debug_assert_eq!(self.role, SessionRole::Download);
        let id = self.correlation_id.clone();

        let result = within(self.timeout, transporter.create_download_handle(&id)).await;
        let handle = self.settle(result)?;
        self.check_handle(&handle, HandleMethod::Get)?;

        self.advance(SessionState::Transferring);
        let limit = self.max_bytes;
        let result = within(self.timeout, async {
            let download = transporter.get(&handle).await?;
            if download.content_length.is_some_and(|len| len > limit) {
                return Err(TransportError::TooLarge { limit });
            }
            let bytes = collect_limited(download.body, limit).await?;
            Ok::<_, TransportError>((download.media_type, download.content_length, bytes))
        })
        .await;
        let (media_type, content_length, bytes) = self.settle(result)?;

        let actual = bytes.len() as u64;
        if let Some(expected) = content_length {
            if expected != actual {
                return Err(self.fail(TransportError::Incomplete { expected, actual }));
            }
        }

        self.complete(actual);
        Ok(PayloadEnvelope::from_bytes(bytes, media_type))
    }

    fn check_handle(&mut self, handle: &TransporterHandle, method: HandleMethod) -> Result<(), TransportError> {
        handle.ensure_usable(method).map_err(|e| self.fail(e))
    }

    fn advance(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid handoff transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::trace!(
            correlation_id = %self.correlation_id,
            role = %self.role,
            from = self.state.as_str(),
            to = next.as_str(),
            "Handoff transition"
        );
        self.state = next;
    }

    fn settle<T>(&mut self, result: Result<T, TransportError>) -> Result<T, TransportError> {
        result.map_err(|e| self.fail(e))
    }

    fn fail(&mut self, err: TransportError) -> TransportError {
        tracing::warn!(
            correlation_id = %self.correlation_id,
            leg = %self.leg,
            role = %self.role,
            state = self.state.as_str(),
            error = %err,
            "Handoff failed"
        );
        self.advance(SessionState::Failed);
        self.last_error = Some(err.clone());
        metrics::record_handoff(self.role, "failed", self.started);
        err
    }

    fn complete(&mut self, bytes: u64) {
        self.advance(SessionState::Complete);
        metrics::record_handoff(self.role, "complete", self.started);
        metrics::record_handoff_bytes(self.role, bytes);
        tracing::info!(
            correlation_id = %self.correlation_id,
            leg = %self.leg,
            role = %self.role,
            bytes,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Handoff complete"
        );
    }
}

impl Drop for HandoffSession {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            tracing::warn!(
                correlation_id = %self.correlation_id,
                leg = %self.leg,
                role = %self.role,
                state = self.state.as_str(),
                "Handoff abandoned before completion"
            );
            metrics::record_handoff(self.role, "abandoned", self.started);
        }
    }
}

/// Bound one transporter call by `limit`. Dropping the inner future on
/// timeout cancels the call.
async fn within<T, F>(limit: Duration, call: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(limit)),
    }
}
