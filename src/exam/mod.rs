//! Exam service collaborator
//!
//! The synchronizer never talks HTTP directly. It depends on the
//! [`ExamService`] trait, which [`HttpExamService`] implements against the
//! exam platform's REST API.
//!
//! # Usage
//!
//! ```rust,ignore
//! use proctor_sync::exam::{ExamService, HttpExamService};
//!
//! let service = HttpExamService::new(&config.exam_service)?;
//! let room = service.session_info("session-7").await?;
//! ```

mod client;
mod types;

#[cfg(test)]
pub(crate) mod fake;

pub use client::HttpExamService;
pub use types::{HistoryStatus, ParticipantRecord, RoomSnapshot, RoomStatus};

use async_trait::async_trait;

use crate::error::Result;

/// Operations the synchronizer needs from the exam platform
///
/// Implementations report a vanished session as
/// [`SyncError::SessionNotFound`](crate::error::SyncError::SessionNotFound).
#[async_trait]
pub trait ExamService: Send + Sync {
    async fn session_info(&self, session_id: &str) -> Result<RoomSnapshot>;

    async fn roster(&self, session_id: &str) -> Result<Vec<ParticipantRecord>>;

    async fn rotate_code(&self, session_id: &str) -> Result<()>;

    /// Toggles the check-in flag of one participant
    async fn check_in(&self, session_id: &str, participant_id: &str) -> Result<()>;

    async fn close_session(&self, session_id: &str) -> Result<()>;
}
