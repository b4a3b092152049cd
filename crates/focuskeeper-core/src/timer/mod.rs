//! Session timer: durable state, the session plan, and the service that
//! drives both.

mod driver;
mod plan;
mod router;
mod service;
mod state;

pub use driver::{ServiceHandle, TimerDriver};
pub use plan::{PlannedSession, SessionPlan};
pub use router::TapOutcome;
pub use service::{
    Command, CompletionOutcome, CompletionSurface, CompletionTrigger, SessionTimerService,
};
pub use state::{RunStatus, SessionKind, TaskRef, TimerSnapshot, TimerState};
