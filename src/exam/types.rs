use serde::{Deserialize, Serialize};

/// Server-side status of an exam room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Scheduled,
    Open,
    Finished,
    #[serde(other)]
    Unknown,
}

impl RoomStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, RoomStatus::Finished)
    }
}

/// Snapshot of a session's room info, replaced wholesale on every fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub session_id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub slot: String,
    #[serde(default)]
    pub room: String,
    /// Code students type to enter the exam
    #[serde(default)]
    pub access_code: Option<String>,
    pub status: RoomStatus,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    NotStarted,
    InProgress,
    Submitted,
}

impl Default for HistoryStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}

/// One expected participant of the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRecord {
    pub id: String,
    #[serde(default)]
    pub display_code: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub checked_in: bool,
    #[serde(default)]
    pub history_status: HistoryStatus,
}
