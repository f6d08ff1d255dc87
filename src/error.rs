use thiserror::Error;

/// Error types for the exam-session synchronizer
#[derive(Debug, Error)]
pub enum SyncError {
    /// Exam service errors
    #[error("Session {0} not found")]
    SessionNotFound(String),

    #[error("Participant {0} not found")]
    ParticipantNotFound(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Exam service returned {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    DecodeFailed(String),

    /// Session state errors
    #[error("Session is read-only")]
    ReadOnlySession,

    #[error("Attendance has been confirmed, check-in is locked")]
    AttendanceLocked,

    #[error("Session is not polling")]
    NotPolling,

    #[error("Another refresh or close is already in progress")]
    Busy,

    #[error("Session {0} is already closed")]
    AlreadyClosed(String),

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Missing required configuration: {0}")]
    MissingConfiguration(String),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results using SyncError
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Helper to create Internal errors with context
    pub fn internal(msg: impl Into<String>) -> Self {
        SyncError::Internal(msg.into())
    }

    /// Helper to create network errors
    pub fn network(msg: impl Into<String>) -> Self {
        SyncError::NetworkError(msg.into())
    }

    /// The server no longer knows the session; callers treat this like a
    /// remote "finished" signal.
    pub fn is_session_missing(&self) -> bool {
        matches!(self, SyncError::SessionNotFound(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(err.to_string())
        } else if err.is_decode() {
            SyncError::DecodeFailed(err.to_string())
        } else {
            SyncError::NetworkError(err.to_string())
        }
    }
}
