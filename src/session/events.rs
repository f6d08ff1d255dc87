use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::SyncError;

/// Outbound operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    RotateCode,
    RefreshRoom,
    RefreshRoster,
    CheckIn,
    Close,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::RotateCode => "rotate_code",
            Operation::RefreshRoom => "refresh_room",
            Operation::RefreshRoster => "refresh_roster",
            Operation::CheckIn => "check_in",
            Operation::Close => "close",
        };
        f.write_str(name)
    }
}

/// Why the session ended without a local close
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The server reported the room as finished
    Finished,
    /// The server no longer knows the session
    SessionMissing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportedError {
    pub operation: Operation,
    pub message: String,
}

/// Notifications delivered to the layer that owns the synchronizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Sent at most once; the caller should leave the session view
    EndedRemotely { reason: EndReason },
    Error(ReportedError),
}

/// Sending half of the event stream
#[derive(Clone)]
pub struct EventSink {
    sender: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn report(&self, operation: Operation, error: &SyncError) {
        self.emit(SessionEvent::Error(ReportedError {
            operation,
            message: error.to_string(),
        }));
    }

    pub fn ended(&self, reason: EndReason) {
        self.emit(SessionEvent::EndedRemotely { reason });
    }

    fn emit(&self, event: SessionEvent) {
        // The receiver going away only means nobody is listening anymore
        if self.sender.send(event).is_err() {
            tracing::debug!("Session event receiver dropped");
        }
    }
}
