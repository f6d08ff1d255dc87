use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use super::events::{EndReason, EventSink, SessionEvent};
use super::gateway::{CommandGateway, FetchOutcome};
use super::schedule::{Countdown, PeriodicTask, ScheduleSet, TickBody};
use super::state::{CheckInIndex, LifecycleState, SessionMode, SessionState};
use crate::config::SessionConfig;
use crate::error::{Result, SyncError};
use crate::exam::{ExamService, ParticipantRecord, RoomSnapshot};

/// Everything a UI needs to render the session, captured at one instant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: String,
    pub mode: SessionMode,
    pub lifecycle: LifecycleState,
    pub room: Option<RoomSnapshot>,
    pub roster: Vec<ParticipantRecord>,
    pub check_ins: BTreeMap<String, bool>,
    pub code_countdown: u32,
    pub roster_countdown: u32,
    pub busy: bool,
    pub attendance_confirmed: bool,
}

struct Shared {
    config: SessionConfig,
    state: Arc<SessionState>,
    gateway: CommandGateway,
    events: EventSink,
    code_countdown: Arc<Countdown>,
    roster_countdown: Arc<Countdown>,
    token: CancellationToken,
    schedule: Mutex<Option<ScheduleSet>>,
    /// Held for the whole of a code cycle
    code_cycle_running: AsyncMutex<()>,
    /// Held for the whole of a roster cycle, and by check-in so no roster
    /// lands while a toggle is in flight
    roster_cycle_running: AsyncMutex<()>,
    started: AtomicBool,
    busy: AtomicBool,
    ended: AtomicBool,
}

/// Clears the busy flag when the guarded command returns
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Live synchronizer for one proctored exam session
///
/// Owns the session state, the two polling cycles with their countdowns, and
/// the command gateway. Dropping it stops every timer.
pub struct SessionSynchronizer {
    shared: Arc<Shared>,
}

impl SessionSynchronizer {
    /// Creates the synchronizer in `Initializing`; nothing runs until
    /// [`start`](Self::start).
    pub fn open(
        service: Arc<dyn ExamService>,
        config: SessionConfig,
    ) -> Result<(Self, UnboundedReceiver<SessionEvent>)> {
        config.validate()?;

        let state = Arc::new(SessionState::new());
        let (events, receiver) = EventSink::channel();
        let gateway = CommandGateway::new(
            service,
            config.session_id.clone(),
            state.clone(),
            events.clone(),
            config.request_timeout,
        );

        let shared = Arc::new(Shared {
            code_countdown: Arc::new(Countdown::for_period(config.code_rotation_interval)),
            roster_countdown: Arc::new(Countdown::for_period(config.roster_refresh_interval)),
            config,
            state,
            gateway,
            events,
            token: CancellationToken::new(),
            schedule: Mutex::new(None),
            code_cycle_running: AsyncMutex::new(()),
            roster_cycle_running: AsyncMutex::new(()),
            started: AtomicBool::new(false),
            busy: AtomicBool::new(false),
            ended: AtomicBool::new(false),
        });

        Ok((Self { shared }, receiver))
    }

    /// Initial rotation (Active only), one combined fetch, then arms polling.
    /// A session that was already stopped, left or closed cannot be started.
    pub async fn start(&self) -> Result<()> {
        let shared = &self.shared;
        let lifecycle = shared.state.lifecycle();
        if shared.token.is_cancelled()
            || matches!(lifecycle, LifecycleState::Closing | LifecycleState::Closed)
        {
            return Err(SyncError::AlreadyClosed(shared.config.session_id.clone()));
        }
        if shared.started.swap(true, Ordering::AcqRel) {
            return Err(SyncError::internal("session already started"));
        }

        tracing::info!(
            session_id = %shared.config.session_id,
            mode = ?shared.config.mode,
            "Opening exam session"
        );

        if shared.config.mode.rotates_code() {
            shared.gateway.rotate_code().await;
        }

        if shared.token.is_cancelled() {
            return Ok(());
        }

        let (room, roster) = tokio::join!(
            shared.gateway.refresh_room(),
            shared.gateway.refresh_roster()
        );
        if shared.observe(room) || shared.observe(roster) {
            return Ok(());
        }

        if shared.arm() {
            tracing::info!(session_id = %shared.config.session_id, "Session polling started");
        }
        Ok(())
    }

    /// Runs both cycle bodies once, outside the schedule, then resets both
    /// countdowns. The periodic phase is unchanged.
    pub async fn manual_refresh(&self) -> Result<()> {
        let shared = &self.shared;
        if shared.state.lifecycle() != LifecycleState::Polling {
            return Err(SyncError::NotPolling);
        }
        let _busy = shared.try_busy()?;

        tracing::debug!(session_id = %shared.config.session_id, "Manual refresh");
        shared.code_cycle().await;
        if !shared.ended.load(Ordering::Acquire) {
            shared.roster_cycle().await;
        }

        shared.code_countdown.reset();
        shared.roster_countdown.reset();
        Ok(())
    }

    /// Toggles one participant's check-in; returns the new local value
    pub async fn check_in(&self, participant_id: &str) -> Result<bool> {
        let shared = &self.shared;
        if !shared.config.mode.accepts_check_in() {
            return Err(SyncError::ReadOnlySession);
        }
        if shared.state.attendance_confirmed() {
            return Err(SyncError::AttendanceLocked);
        }
        if shared.state.lifecycle() != LifecycleState::Polling {
            return Err(SyncError::NotPolling);
        }
        let _roster = shared.roster_cycle_running.lock().await;
        shared.gateway.check_in(participant_id).await
    }

    /// Local lock against further check-in edits
    pub fn confirm_attendance(&self) -> Result<()> {
        let shared = &self.shared;
        if !shared.config.mode.accepts_check_in() {
            return Err(SyncError::ReadOnlySession);
        }
        if shared.state.confirm_attendance() {
            tracing::info!(session_id = %shared.config.session_id, "Attendance confirmed");
        }
        Ok(())
    }

    /// Stops every timer and issues the close command. On failure the
    /// session stays in `Closing` and the call can be retried.
    pub async fn finish(&self) -> Result<()> {
        let shared = &self.shared;
        if shared.state.lifecycle() == LifecycleState::Closed {
            return Err(SyncError::AlreadyClosed(shared.config.session_id.clone()));
        }
        let _busy = shared.try_busy()?;

        if !shared.config.mode.issues_close() {
            shared.stop();
            shared.state.set_lifecycle(LifecycleState::Closed);
            return Ok(());
        }

        shared.state.set_lifecycle(LifecycleState::Closing);
        shared.stop();

        shared.gateway.close().await?;
        shared.state.set_lifecycle(LifecycleState::Closed);
        tracing::info!(session_id = %shared.config.session_id, "Exam session closed");
        Ok(())
    }

    /// Navigate-away path: stops everything without a close command
    pub fn leave(&self) {
        self.shared.stop();
        self.shared.state.set_lifecycle(LifecycleState::Closed);
    }

    /// Cancels all timers; idempotent and safe from any state
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn view(&self) -> SessionView {
        let shared = &self.shared;
        let state = &shared.state;
        SessionView {
            session_id: shared.config.session_id.clone(),
            mode: shared.config.mode,
            lifecycle: state.lifecycle(),
            room: state.room().map(|room| (*room).clone()),
            roster: (*state.roster()).clone(),
            check_ins: (*state.check_in_index()).clone(),
            code_countdown: shared.code_countdown.remaining(),
            roster_countdown: shared.roster_countdown.remaining(),
            busy: self.is_busy(),
            attendance_confirmed: state.attendance_confirmed(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.shared.config.session_id
    }

    pub fn mode(&self) -> SessionMode {
        self.shared.config.mode
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.shared.state.lifecycle()
    }

    pub fn room(&self) -> Option<Arc<RoomSnapshot>> {
        self.shared.state.room()
    }

    pub fn roster(&self) -> Arc<Vec<ParticipantRecord>> {
        self.shared.state.roster()
    }

    pub fn check_in_index(&self) -> Arc<CheckInIndex> {
        self.shared.state.check_in_index()
    }

    pub fn code_countdown(&self) -> u32 {
        self.shared.code_countdown.remaining()
    }

    pub fn roster_countdown(&self) -> u32 {
        self.shared.roster_countdown.remaining()
    }

    pub fn is_busy(&self) -> bool {
        self.shared.busy.load(Ordering::Acquire)
    }

    /// Timers still running; zero once stopped
    pub fn active_timers(&self) -> usize {
        self.shared
            .schedule
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, ScheduleSet::active_timers)
    }
}

impl Drop for SessionSynchronizer {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

impl Shared {
    fn try_busy(&self) -> Result<BusyGuard<'_>> {
        if self.busy.swap(true, Ordering::AcqRel) {
            return Err(SyncError::Busy);
        }
        Ok(BusyGuard(&self.busy))
    }

    fn stop(&self) {
        if self.token.is_cancelled() {
            return;
        }
        self.token.cancel();
        self.state.seal();
        tracing::info!(session_id = %self.config.session_id, "Session timers stopped");
    }

    /// Arms both cycles and their countdowns together, or nothing at all
    fn arm(self: &Arc<Self>) -> bool {
        let mut schedule = self.schedule.lock().unwrap_or_else(PoisonError::into_inner);
        if self.token.is_cancelled() || !self.state.begin_polling() {
            return false;
        }

        // A tick that finds its cycle still running (a manual refresh) is skipped
        let code = self.clone();
        let code_body: TickBody = Arc::new(move || {
            let shared = code.clone();
            Box::pin(async move {
                match shared.code_cycle_running.try_lock() {
                    Ok(_cycle) => shared.run_code_cycle().await,
                    Err(_) => tracing::debug!(task = "code-rotation", "Cycle already running, skipping tick"),
                }
            })
        });

        let roster = self.clone();
        let roster_body: TickBody = Arc::new(move || {
            let shared = roster.clone();
            Box::pin(async move {
                match shared.roster_cycle_running.try_lock() {
                    Ok(_cycle) => shared.run_roster_cycle().await,
                    Err(_) => tracing::debug!(task = "roster-refresh", "Cycle already running, skipping tick"),
                }
            })
        });

        *schedule = Some(ScheduleSet::arm(
            self.token.clone(),
            vec![
                PeriodicTask {
                    name: "code-rotation",
                    period: self.config.code_rotation_interval,
                    body: code_body,
                    countdown: self.code_countdown.clone(),
                },
                PeriodicTask {
                    name: "roster-refresh",
                    period: self.config.roster_refresh_interval,
                    body: roster_body,
                    countdown: self.roster_countdown.clone(),
                },
            ],
        ));
        true
    }

    /// Waits for any code cycle in flight, then runs one
    async fn code_cycle(&self) {
        let _cycle = self.code_cycle_running.lock().await;
        self.run_code_cycle().await;
    }

    /// Waits for any roster cycle in flight, then runs one
    async fn roster_cycle(&self) {
        let _cycle = self.roster_cycle_running.lock().await;
        self.run_roster_cycle().await;
    }

    /// Rotate (Active only), then re-fetch the room
    async fn run_code_cycle(&self) {
        if self.config.mode.rotates_code() {
            self.gateway.rotate_code().await;
        }
        let room = self.gateway.refresh_room().await;
        self.observe(room);
    }

    /// Re-fetch the room for its status, then the roster
    async fn run_roster_cycle(&self) {
        let room = self.gateway.refresh_room().await;
        if self.observe(room) {
            return;
        }
        let roster = self.gateway.refresh_roster().await;
        self.observe(roster);
    }

    /// Returns true once the session has ended remotely
    fn observe(&self, outcome: FetchOutcome) -> bool {
        if !self.config.mode.follows_remote_end() {
            return false;
        }
        match outcome {
            FetchOutcome::Finished => self.end_remotely(EndReason::Finished),
            FetchOutcome::Missing => self.end_remotely(EndReason::SessionMissing),
            FetchOutcome::Discarded => true,
            FetchOutcome::Updated | FetchOutcome::Failed => false,
        }
    }

    /// Runs at most once per session. Contains no await so it cannot be cut
    /// short by the cancellation it triggers.
    fn end_remotely(&self, reason: EndReason) -> bool {
        if self.ended.swap(true, Ordering::AcqRel) {
            return true;
        }
        tracing::info!(
            session_id = %self.config.session_id,
            ?reason,
            "Session ended remotely"
        );
        self.stop();
        self.state.set_lifecycle(LifecycleState::Closed);
        self.events.ended(reason);
        true
    }
}
