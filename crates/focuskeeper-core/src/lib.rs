//! # Focuskeeper Core Library
//!
//! Session timing and notification coordination for a focus timer. The CLI
//! binary and any GUI shell are thin layers over this crate.
//!
//! ## Architecture
//!
//! - **Timer Store**: one durable record describing the current session,
//!   written through to SQLite on every change
//! - **Timer Service**: the state machine. Deadlines are absolute epoch
//!   milliseconds, so completion survives suspension, process death and
//!   restarts
//! - **Notification Gateway**: OS notifications now or at an instant, plus
//!   the payloads that route taps back into the app
//! - **Lifecycle Observer**: debounced foreground/background tracking
//!
//! ## Key Components
//!
//! - [`SessionTimerService`]: start/pause/resume/reset/skip and guarded completion
//! - [`TimerDriver`]: the single async loop that owns the service
//! - [`TimerStore`]: durable timer record with change subscriptions
//! - [`Config`]: application configuration management

pub mod clock;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod notify;
pub mod observer;
pub mod storage;
pub mod store;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, GatewayError, Rejection, ServiceStopped, StorageError};
pub use events::{Event, NavigationTarget};
pub use lifecycle::{AppLifecycle, LifecycleObserver, RawLifecycleSignal};
pub use notify::{
    CancelOutcome, DesktopGateway, GatewayActivation, NotificationGateway, NotificationHandle,
    NotificationPayload, RecordingGateway,
};
pub use storage::{Config, Database};
pub use store::{MemoryBackend, SqliteBackend, StateBackend, TimerStore};
pub use timer::{
    Command, CompletionOutcome, CompletionSurface, CompletionTrigger, ServiceHandle,
    SessionKind, SessionPlan, SessionTimerService, TapOutcome, TaskRef, TimerDriver,
    TimerSnapshot, TimerState,
};
