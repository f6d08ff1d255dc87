use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Display countdowns advance once per second
pub const COUNTDOWN_STEP: Duration = Duration::from_secs(1);

/// Body of one periodic task; must not return errors
pub type TickBody = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Seconds until the next scheduled run, for display only
#[derive(Debug)]
pub struct Countdown {
    start: u32,
    remaining: AtomicU32,
}

impl Countdown {
    pub fn new(start: u32) -> Self {
        let start = start.max(1);
        Self {
            start,
            remaining: AtomicU32::new(start),
        }
    }

    /// Countdown matching a task period, rounded down to whole seconds
    pub fn for_period(period: Duration) -> Self {
        Self::new(u32::try_from(period.as_secs()).unwrap_or(u32::MAX))
    }

    pub fn start_value(&self) -> u32 {
        self.start
    }

    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.remaining.store(self.start, Ordering::Release);
    }

    /// Decrements by one; a value that would hit zero wraps to the start
    /// value. Never triggers work.
    pub fn tick(&self) -> u32 {
        let start = self.start;
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(if v <= 1 { start } else { v - 1 })
            })
            .unwrap_or(start);
        if previous <= 1 {
            start
        } else {
            previous - 1
        }
    }
}

/// A periodic task and the countdown that mirrors it
pub struct PeriodicTask {
    pub name: &'static str,
    pub period: Duration,
    pub body: TickBody,
    pub countdown: Arc<Countdown>,
}

/// Timers driven by each spawned task: the period and its 1 Hz countdown
const TIMERS_PER_TASK: usize = 2;

/// The owned set of session timers
///
/// Every periodic task is armed together with its 1 Hz countdown, all under
/// one cancellation token. Arming is synchronous, so either the whole set is
/// running or none of it is. Dropping the set cancels it.
pub struct ScheduleSet {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl ScheduleSet {
    pub fn arm(token: CancellationToken, tasks: Vec<PeriodicTask>) -> Self {
        if token.is_cancelled() {
            return Self {
                token,
                handles: Vec::new(),
            };
        }

        let handles = tasks
            .into_iter()
            .map(|task| {
                tracing::debug!(
                    task = task.name,
                    period_ms = task.period.as_millis() as u64,
                    "Arming periodic task"
                );
                tokio::spawn(run_periodic(token.clone(), task))
            })
            .collect();

        Self { token, handles }
    }

    /// Idempotent; safe from any task, including a tick body of this set
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Number of timers that have not exited yet
    pub fn active_timers(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count() * TIMERS_PER_TASK
    }

    pub fn armed_timers(&self) -> usize {
        self.handles.len() * TIMERS_PER_TASK
    }
}

impl Drop for ScheduleSet {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Runs one task and its countdown from a single loop, so a completed run
/// always leaves the countdown at its start value.
async fn run_periodic(token: CancellationToken, task: PeriodicTask) {
    let armed_at = Instant::now();
    let mut period = interval_at(armed_at + task.period, task.period);
    period.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut step = interval_at(armed_at + COUNTDOWN_STEP, COUNTDOWN_STEP);
    step.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = period.tick() => {
                tracing::debug!(task = task.name, "Periodic tick");

                // An in-flight body is dropped as soon as cancellation is requested
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = (task.body)() => {}
                }

                task.countdown.reset();
                step.reset();
            }
            _ = step.tick() => {
                task.countdown.tick();
            }
        }
    }

    tracing::debug!(task = task.name, "Periodic task stopped");
}
