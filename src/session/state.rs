use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::exam::{ParticipantRecord, RoomSnapshot};

/// How the session was opened; fixed for the lifetime of the synchronizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Proctor supervising a live room
    Active,
    /// After-the-fact viewer
    ReadOnly,
}

impl SessionMode {
    pub fn rotates_code(self) -> bool {
        matches!(self, SessionMode::Active)
    }

    pub fn accepts_check_in(self) -> bool {
        matches!(self, SessionMode::Active)
    }

    /// Whether a remote finish or a vanished session ends this synchronizer
    pub fn follows_remote_end(self) -> bool {
        matches!(self, SessionMode::Active)
    }

    pub fn issues_close(self) -> bool {
        matches!(self, SessionMode::Active)
    }
}

impl FromStr for SessionMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(SessionMode::Active),
            "read_only" | "readonly" | "observer" => Ok(SessionMode::ReadOnly),
            other => Err(SyncError::InvalidConfiguration(format!(
                "unknown session mode {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Initializing,
    Polling,
    Closing,
    Closed,
}

/// Participant id -> checked in
pub type CheckInIndex = BTreeMap<String, bool>;

struct StateInner {
    room: Option<Arc<RoomSnapshot>>,
    roster: Arc<Vec<ParticipantRecord>>,
    check_ins: Arc<CheckInIndex>,
    lifecycle: LifecycleState,
    attendance_confirmed: bool,
    /// Set by `stop()`; snapshot writes are dropped from then on
    sealed: bool,
}

/// Session State Holder
///
/// Readers get cheap `Arc` clones of the current snapshots. Writers are the
/// command gateway (network results) and the synchronizer (lifecycle). Every
/// snapshot write replaces the whole value under one lock acquisition.
pub struct SessionState {
    inner: RwLock<StateInner>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StateInner {
                room: None,
                roster: Arc::new(Vec::new()),
                check_ins: Arc::new(CheckInIndex::new()),
                lifecycle: LifecycleState::Initializing,
                attendance_confirmed: false,
                sealed: false,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StateInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StateInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn room(&self) -> Option<Arc<RoomSnapshot>> {
        self.read().room.clone()
    }

    pub fn roster(&self) -> Arc<Vec<ParticipantRecord>> {
        self.read().roster.clone()
    }

    pub fn check_in_index(&self) -> Arc<CheckInIndex> {
        self.read().check_ins.clone()
    }

    pub fn is_checked_in(&self, participant_id: &str) -> Option<bool> {
        self.read().check_ins.get(participant_id).copied()
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.read().lifecycle
    }

    pub fn attendance_confirmed(&self) -> bool {
        self.read().attendance_confirmed
    }

    pub fn is_sealed(&self) -> bool {
        self.read().sealed
    }

    /// Returns false when the write was dropped because the session stopped
    pub(crate) fn replace_room(&self, room: RoomSnapshot) -> bool {
        let mut inner = self.write();
        if inner.sealed {
            return false;
        }
        inner.room = Some(Arc::new(room));
        true
    }

    /// Replaces the roster and rebuilds the check-in index from it; the
    /// fetched roster overrides any optimistic toggle.
    pub(crate) fn replace_roster(&self, roster: Vec<ParticipantRecord>) -> bool {
        let index: CheckInIndex = roster
            .iter()
            .map(|p| (p.id.clone(), p.checked_in))
            .collect();

        let mut inner = self.write();
        if inner.sealed {
            return false;
        }
        inner.roster = Arc::new(roster);
        inner.check_ins = Arc::new(index);
        true
    }

    /// Optimistic local update after a successful check-in toggle
    pub(crate) fn set_checked_in(&self, participant_id: &str, checked_in: bool) -> bool {
        let mut inner = self.write();
        if inner.sealed || !inner.check_ins.contains_key(participant_id) {
            return false;
        }
        Arc::make_mut(&mut inner.check_ins).insert(participant_id.to_string(), checked_in);
        true
    }

    /// Moves `Initializing` to `Polling`; refused once sealed or past it
    pub(crate) fn begin_polling(&self) -> bool {
        let mut inner = self.write();
        if inner.sealed || inner.lifecycle != LifecycleState::Initializing {
            return false;
        }
        inner.lifecycle = LifecycleState::Polling;
        true
    }

    pub(crate) fn set_lifecycle(&self, lifecycle: LifecycleState) -> LifecycleState {
        let mut inner = self.write();
        std::mem::replace(&mut inner.lifecycle, lifecycle)
    }

    pub(crate) fn seal(&self) {
        self.write().sealed = true;
    }

    /// Returns true on the first confirmation only
    pub(crate) fn confirm_attendance(&self) -> bool {
        let mut inner = self.write();
        !std::mem::replace(&mut inner.attendance_confirmed, true)
    }
}
