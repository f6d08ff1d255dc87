use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use super::events::{EventSink, Operation};
use super::state::SessionState;
use crate::error::{Result, SyncError};
use crate::exam::ExamService;

/// Result of one fetch-and-replace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Updated,
    /// Room replaced and the server reports it finished
    Finished,
    /// The server no longer knows the session
    Missing,
    /// Transient failure, previous snapshot kept
    Failed,
    /// Response arrived after the session stopped and was dropped
    Discarded,
}

/// Command Gateway
///
/// Sole writer of network results into the [`SessionState`]. Every call is
/// bounded by the request timeout, and every failure is logged and reported
/// through the [`EventSink`].
pub struct CommandGateway {
    service: Arc<dyn ExamService>,
    session_id: String,
    state: Arc<SessionState>,
    events: EventSink,
    request_timeout: Duration,
    closed: AtomicBool,
}

impl CommandGateway {
    pub fn new(
        service: Arc<dyn ExamService>,
        session_id: String,
        state: Arc<SessionState>,
        events: EventSink,
        request_timeout: Duration,
    ) -> Self {
        Self {
            service,
            session_id,
            state,
            events,
            request_timeout,
            closed: AtomicBool::new(false),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn call<T, F>(&self, operation: Operation, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match timeout(self.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(format!(
                "{} exceeded {}ms",
                operation,
                self.request_timeout.as_millis()
            ))),
        }
    }

    fn report(&self, operation: Operation, error: &SyncError) {
        tracing::warn!(
            session_id = %self.session_id,
            operation = %operation,
            error = %error,
            "Exam service call failed"
        );
        self.events.report(operation, error);
    }

    /// Best effort; the previous code stays displayed on failure
    pub async fn rotate_code(&self) -> bool {
        match self
            .call(Operation::RotateCode, self.service.rotate_code(&self.session_id))
            .await
        {
            Ok(()) => {
                tracing::info!(session_id = %self.session_id, "Access code rotated");
                true
            }
            Err(e) => {
                self.report(Operation::RotateCode, &e);
                false
            }
        }
    }

    pub async fn refresh_room(&self) -> FetchOutcome {
        match self
            .call(Operation::RefreshRoom, self.service.session_info(&self.session_id))
            .await
        {
            Ok(room) => {
                let finished = room.status.is_finished();
                if !self.state.replace_room(room) {
                    tracing::debug!(session_id = %self.session_id, "Discarding late room snapshot");
                    return FetchOutcome::Discarded;
                }
                if finished {
                    FetchOutcome::Finished
                } else {
                    FetchOutcome::Updated
                }
            }
            Err(e) if e.is_session_missing() => {
                self.report(Operation::RefreshRoom, &e);
                FetchOutcome::Missing
            }
            Err(e) => {
                self.report(Operation::RefreshRoom, &e);
                FetchOutcome::Failed
            }
        }
    }

    pub async fn refresh_roster(&self) -> FetchOutcome {
        match self
            .call(Operation::RefreshRoster, self.service.roster(&self.session_id))
            .await
        {
            Ok(roster) => {
                let count = roster.len();
                if !self.state.replace_roster(roster) {
                    tracing::debug!(session_id = %self.session_id, "Discarding late roster snapshot");
                    return FetchOutcome::Discarded;
                }
                tracing::debug!(session_id = %self.session_id, participants = count, "Roster refreshed");
                FetchOutcome::Updated
            }
            Err(e) if e.is_session_missing() => {
                self.report(Operation::RefreshRoster, &e);
                FetchOutcome::Missing
            }
            Err(e) => {
                self.report(Operation::RefreshRoster, &e);
                FetchOutcome::Failed
            }
        }
    }

    /// Toggles a participant's check-in and applies the new value locally
    /// before the next roster refresh confirms it. Returns the new value.
    pub async fn check_in(&self, participant_id: &str) -> Result<bool> {
        let before = self
            .state
            .is_checked_in(participant_id)
            .ok_or_else(|| SyncError::ParticipantNotFound(participant_id.to_string()))?;

        let result = self
            .call(
                Operation::CheckIn,
                self.service.check_in(&self.session_id, participant_id),
            )
            .await;

        match result {
            Ok(()) => {
                // The toggle applies to whatever the server held, so flip the
                // latest known value rather than the one read before the call
                let current = self.state.is_checked_in(participant_id).unwrap_or(before);
                let checked_in = !current;
                self.state.set_checked_in(participant_id, checked_in);
                tracing::info!(
                    session_id = %self.session_id,
                    participant_id = %participant_id,
                    checked_in,
                    "Participant check-in toggled"
                );
                Ok(checked_in)
            }
            Err(e) => {
                self.report(Operation::CheckIn, &e);
                Err(e)
            }
        }
    }

    /// Terminal close command; succeeds at most once
    pub async fn close(&self) -> Result<()> {
        if self.is_closed() {
            return Err(SyncError::AlreadyClosed(self.session_id.clone()));
        }

        match self
            .call(Operation::Close, self.service.close_session(&self.session_id))
            .await
        {
            Ok(()) => {
                self.closed.store(true, Ordering::Release);
                Ok(())
            }
            Err(e) if e.is_session_missing() => {
                tracing::warn!(
                    session_id = %self.session_id,
                    "Session already gone on the server, treating close as done"
                );
                self.closed.store(true, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    session_id = %self.session_id,
                    error = %e,
                    "Failed to close exam session"
                );
                self.events.report(Operation::Close, &e);
                Err(e)
            }
        }
    }
}
