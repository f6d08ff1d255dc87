use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::types::{HistoryStatus, ParticipantRecord, RoomSnapshot, RoomStatus};
use super::ExamService;
use crate::error::{Result, SyncError};

/// Scripted in-memory exam service for unit tests
pub(crate) struct FakeExamService {
    inner: Mutex<FakeState>,
}

struct FakeState {
    room: Option<RoomSnapshot>,
    roster: Vec<ParticipantRecord>,
    calls: Vec<String>,
    rotations: u32,
    fail_room: bool,
    fail_roster: bool,
    fail_rotate: bool,
    fail_check_in: bool,
    fail_close: bool,
    persist_check_ins: bool,
    roster_delay: Option<Duration>,
    check_in_delay: Option<Duration>,
}

pub(crate) fn participant(id: &str, checked_in: bool) -> ParticipantRecord {
    ParticipantRecord {
        id: id.to_string(),
        display_code: format!("SV{}", id),
        full_name: format!("Student {}", id),
        checked_in,
        history_status: HistoryStatus::NotStarted,
    }
}

pub(crate) fn room(session_id: &str, status: RoomStatus) -> RoomSnapshot {
    RoomSnapshot {
        session_id: session_id.to_string(),
        subject: "Mathematics".to_string(),
        slot: "Morning".to_string(),
        room: "A101".to_string(),
        access_code: Some("000000".to_string()),
        status,
        start_time: None,
        end_time: None,
    }
}

impl FakeExamService {
    pub(crate) fn new(session_id: &str, roster: Vec<ParticipantRecord>) -> Self {
        Self {
            inner: Mutex::new(FakeState {
                room: Some(room(session_id, RoomStatus::Open)),
                roster,
                calls: Vec::new(),
                rotations: 0,
                fail_room: false,
                fail_roster: false,
                fail_rotate: false,
                fail_check_in: false,
                fail_close: false,
                persist_check_ins: true,
                roster_delay: None,
                check_in_delay: None,
            }),
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.as_str() == call)
            .count()
    }

    pub(crate) fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    pub(crate) fn set_status(&self, status: RoomStatus) {
        if let Some(room) = self.inner.lock().unwrap().room.as_mut() {
            room.status = status;
        }
    }

    pub(crate) fn remove_session(&self) {
        self.inner.lock().unwrap().room = None;
    }

    pub(crate) fn set_roster(&self, roster: Vec<ParticipantRecord>) {
        self.inner.lock().unwrap().roster = roster;
    }

    pub(crate) fn fail_room(&self, fail: bool) {
        self.inner.lock().unwrap().fail_room = fail;
    }

    pub(crate) fn fail_roster(&self, fail: bool) {
        self.inner.lock().unwrap().fail_roster = fail;
    }

    pub(crate) fn fail_rotate(&self, fail: bool) {
        self.inner.lock().unwrap().fail_rotate = fail;
    }

    pub(crate) fn fail_check_in(&self, fail: bool) {
        self.inner.lock().unwrap().fail_check_in = fail;
    }

    pub(crate) fn fail_close(&self, fail: bool) {
        self.inner.lock().unwrap().fail_close = fail;
    }

    pub(crate) fn persist_check_ins(&self, persist: bool) {
        self.inner.lock().unwrap().persist_check_ins = persist;
    }

    pub(crate) fn delay_roster(&self, delay: Option<Duration>) {
        self.inner.lock().unwrap().roster_delay = delay;
    }

    pub(crate) fn delay_check_in(&self, delay: Option<Duration>) {
        self.inner.lock().unwrap().check_in_delay = delay;
    }

    pub(crate) fn roster_snapshot(&self) -> Vec<ParticipantRecord> {
        self.inner.lock().unwrap().roster.clone()
    }

    fn record(&self, call: &str) -> std::sync::MutexGuard<'_, FakeState> {
        let mut state = self.inner.lock().unwrap();
        state.calls.push(call.to_string());
        state
    }
}

#[async_trait]
impl ExamService for FakeExamService {
    async fn session_info(&self, session_id: &str) -> Result<RoomSnapshot> {
        let state = self.record("session_info");
        if state.fail_room {
            return Err(SyncError::network("connection reset"));
        }
        state
            .room
            .clone()
            .ok_or_else(|| SyncError::SessionNotFound(session_id.to_string()))
    }

    async fn roster(&self, session_id: &str) -> Result<Vec<ParticipantRecord>> {
        let delay = {
            let state = self.record("roster");
            if state.fail_roster {
                return Err(SyncError::network("connection reset"));
            }
            if state.room.is_none() {
                return Err(SyncError::SessionNotFound(session_id.to_string()));
            }
            state.roster_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.inner.lock().unwrap().roster.clone())
    }

    async fn rotate_code(&self, session_id: &str) -> Result<()> {
        let mut state = self.record("rotate_code");
        if state.fail_rotate {
            return Err(SyncError::network("connection reset"));
        }
        state.rotations += 1;
        let code = format!("{:06}", state.rotations);
        match state.room.as_mut() {
            Some(room) => {
                room.access_code = Some(code);
                Ok(())
            }
            None => Err(SyncError::SessionNotFound(session_id.to_string())),
        }
    }

    async fn check_in(&self, _session_id: &str, participant_id: &str) -> Result<()> {
        let delay = {
            let state = self.record("check_in");
            if state.fail_check_in {
                return Err(SyncError::network("connection reset"));
            }
            state.check_in_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.inner.lock().unwrap();
        let persist = state.persist_check_ins;
        let participant = state
            .roster
            .iter_mut()
            .find(|p| p.id == participant_id)
            .ok_or_else(|| SyncError::ParticipantNotFound(participant_id.to_string()))?;
        if persist {
            participant.checked_in = !participant.checked_in;
        }
        Ok(())
    }

    async fn close_session(&self, _session_id: &str) -> Result<()> {
        let mut state = self.record("close_session");
        if state.fail_close {
            return Err(SyncError::network("connection reset"));
        }
        if let Some(room) = state.room.as_mut() {
            room.status = RoomStatus::Finished;
        }
        Ok(())
    }
}
