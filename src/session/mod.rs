//! Live exam-session synchronizer
//!
//! Keeps a proctor's view of a running exam room consistent with the exam
//! service while the access code and the roster change underneath it.
//!
//! # Architecture
//!
//! - `state`: the session state holder (room, roster, check-in index, lifecycle)
//! - `schedule`: the owned set of periodic tasks and display countdowns
//! - `gateway`: outbound commands and fetches, with timeouts and reporting
//! - `events`: notifications for the owning layer
//! - `synchronizer`: the per-session object tying the above together
//!
//! # Usage
//!
//! ```rust,ignore
//! use proctor_sync::session::{SessionEvent, SessionMode, SessionSynchronizer};
//!
//! let (sync, mut events) = SessionSynchronizer::open(service, SessionConfig::new("42", SessionMode::Active))?;
//! sync.start().await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let SessionEvent::EndedRemotely { .. } = event {
//!         break;
//!     }
//! }
//! ```

mod events;
mod gateway;
mod schedule;
mod state;
mod synchronizer;

pub use events::{EndReason, EventSink, Operation, ReportedError, SessionEvent};
pub use gateway::{CommandGateway, FetchOutcome};
pub use schedule::{Countdown, PeriodicTask, ScheduleSet, TickBody, COUNTDOWN_STEP};
pub use state::{CheckInIndex, LifecycleState, SessionMode, SessionState};
pub use synchronizer::{SessionSynchronizer, SessionView};
