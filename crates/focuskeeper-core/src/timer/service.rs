//! Session timer service.
//!
//! Owns the durable timer record and drives it through its transitions.
//! Time is never counted: every check compares the injected clock against
//! `expected_end_epoch_ms`, so a process that was suspended or killed picks
//! up exactly where the wall clock says it should be.
//!
//! ## Completion
//!
//! ```text
//! poll tick ─┐
//! foreground ┤
//! restart ───┼─> complete(trigger) ─> guard ─> SessionCompleted + one surface
//! tap ───────┤
//! pause ─────┘
//! ```
//!
//! The guard is check-then-set on `completion_handled` with nothing in
//! between that can yield. The service is driven through `&mut self`, so
//! there is a single writer and the first trigger to arrive wins. Every
//! later trigger for the same session is a no-op.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::plan::SessionPlan;
use super::state::{RunStatus, SessionKind, TaskRef, TimerSnapshot, TimerState};
use crate::clock::Clock;
use crate::error::{GatewayError, Rejection};
use crate::events::{timestamp, Event};
use crate::lifecycle::{AppLifecycle, LifecycleObserver, RawLifecycleSignal};
use crate::notify::{
    CancelOutcome, NotificationGateway, NotificationHandle, NotificationOptions,
    NotificationPayload,
};
use crate::observer::Subscription;
use crate::storage::Config;
use crate::store::TimerStore;

const EVENT_CAPACITY: usize = 64;

/// What noticed that the deadline passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionTrigger {
    PollTick,
    Foreground,
    Restart,
    NotificationTap,
    /// A user action (pause) found the deadline already behind it.
    Interaction,
}

/// How the user learned that the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionSurface {
    /// Foreground, another screen: a [`Event::CompletionPrompt`] was emitted.
    InAppPrompt,
    /// Foreground on the timer screen, which renders completion itself.
    TimerScreen,
    /// Background: a notification was shown immediately.
    Notification,
    /// The user already saw it (they tapped it, or the backstop fired).
    AlreadyPresented,
    /// Notifications are disabled or the gateway failed.
    Suppressed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOutcome {
    pub event: Event,
    pub surface: CompletionSurface,
}

/// User commands, in the form the driver and the CLI pass them around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start {
        duration_secs: u64,
        kind: SessionKind,
        task: TaskRef,
    },
    /// Start whatever session the record or the plan says comes next.
    StartNext {
        task: Option<TaskRef>,
    },
    Pause,
    Resume,
    Reset,
    Skip,
    Advance,
    Abandon,
}

/// Result of cancelling the backstop notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backstop {
    None,
    Cancelled,
    AlreadyDelivered,
    Unknown,
}

pub struct SessionTimerService {
    store: TimerStore,
    gateway: Box<dyn NotificationGateway>,
    lifecycle: LifecycleObserver,
    clock: Arc<dyn Clock>,
    plan: SessionPlan,
    events: broadcast::Sender<Event>,
    on_timer_screen: bool,
    notifications_enabled: bool,
    tap_tolerance_ms: u64,
}

impl SessionTimerService {
    pub fn new(
        store: TimerStore,
        gateway: impl NotificationGateway + 'static,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            gateway: Box::new(gateway),
            lifecycle: LifecycleObserver::default(),
            clock,
            plan: SessionPlan::default(),
            events,
            on_timer_screen: false,
            notifications_enabled: true,
            tap_tolerance_ms: 2_000,
        }
    }

    /// Build a service tuned by the `[schedule]`, `[timer]` and
    /// `[notifications]` sections.
    pub fn from_config(
        config: &Config,
        store: TimerStore,
        gateway: impl NotificationGateway + 'static,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(store, gateway, clock)
            .with_plan(config.plan())
            .with_lifecycle(LifecycleObserver::new(
                AppLifecycle::Foreground,
                config.timer.lifecycle_debounce_ms,
            ))
            .with_notifications(config.notifications.enabled)
            .with_tap_tolerance_ms(config.timer.tap_tolerance_ms)
    }

    pub fn with_plan(mut self, plan: SessionPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: LifecycleObserver) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notifications_enabled = enabled;
        self
    }

    pub fn with_tap_tolerance_ms(mut self, tolerance_ms: u64) -> Self {
        self.tap_tolerance_ms = tolerance_ms;
        self
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn current(&self) -> Option<&TimerState> {
        self.store.get()
    }

    pub fn snapshot(&self) -> Option<TimerSnapshot> {
        let now = self.clock.now_ms();
        self.store.get().map(|state| TimerSnapshot::of(state, now))
    }

    pub fn plan(&self) -> &SessionPlan {
        &self.plan
    }

    pub fn lifecycle(&self) -> AppLifecycle {
        self.lifecycle.current()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// True while the durable record lags the in-memory one.
    pub fn has_unsaved_state(&self) -> bool {
        self.store.is_dirty()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<Event> {
        self.events.clone()
    }

    pub fn subscribe_state<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&Option<TimerState>) + Send + 'static,
    {
        self.store.subscribe(callback)
    }

    pub fn subscribe_lifecycle<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&AppLifecycle) + Send + 'static,
    {
        self.lifecycle.subscribe(callback)
    }

    // ── Commands ────────────────────────────────────────────────────────

    pub fn execute(&mut self, command: Command) -> Result<Event, Rejection> {
        match command {
            Command::Start {
                duration_secs,
                kind,
                task,
            } => self.start(duration_secs, kind, task),
            Command::StartNext { task } => self.start_next(task),
            Command::Pause => self.pause(),
            Command::Resume => self.resume(),
            Command::Reset => self.reset(),
            Command::Skip => self.skip(),
            Command::Advance => self.acknowledge_and_advance(),
            Command::Abandon => self.abandon(),
        }
    }

    /// Start a session of `duration_secs` linked to `task`.
    ///
    /// The deadline is fixed here and a backstop notification is scheduled
    /// for it. An Idle record keeps its position in the plan; with no
    /// record the session is index 0.
    pub fn start(
        &mut self,
        duration_secs: u64,
        kind: SessionKind,
        task: TaskRef,
    ) -> Result<Event, Rejection> {
        if duration_secs == 0 {
            return Err(Rejection::ZeroDuration);
        }
        let (index, stale_handle) = match self.store.get() {
            None => (0, None),
            Some(state) => match state.run_status {
                RunStatus::Running if state.completion_handled => {
                    return Err(Rejection::CompletionPending)
                }
                RunStatus::Running => return Err(Rejection::AlreadyRunning),
                RunStatus::Paused => return Err(Rejection::SessionPaused),
                RunStatus::Idle => (
                    state.session_sequence_index,
                    state.pending_notification_handle.clone(),
                ),
            },
        };
        if let Some(handle) = stale_handle {
            self.cancel_backstop(&handle);
        }

        let now = self.clock.now_ms();
        let deadline = now.saturating_add(duration_secs.saturating_mul(1000));
        let handle = self.schedule_backstop(index, kind, &task, deadline);

        self.store.save(TimerState {
            session_sequence_index: index,
            session_kind: kind,
            planned_duration_seconds: duration_secs,
            run_status: RunStatus::Running,
            started_at_epoch_ms: Some(now),
            expected_end_epoch_ms: Some(deadline),
            remaining_seconds_at_pause: None,
            completion_handled: false,
            linked_task_id: task.id.clone(),
            linked_task_title: task.title.clone(),
            pending_notification_handle: handle,
        });
        info!(index, kind = %kind, duration_secs, task = %task.id, "session started");

        Ok(self.emit(Event::SessionStarted {
            session_index: index,
            session_kind: kind,
            duration_secs,
            expected_end_epoch_ms: deadline,
            task_id: task.id,
            at: timestamp(now),
        }))
    }

    /// Start the session the record points at, acknowledging a completed
    /// one first. With no record the plan starts from the top for `task`.
    pub fn start_next(&mut self, task: Option<TaskRef>) -> Result<Event, Rejection> {
        let completed = self
            .store
            .get()
            .filter(|s| s.is_running() && s.completion_handled)
            .map(|s| s.session_sequence_index);
        if let Some(index) = completed {
            if self.plan.get(index + 1).is_none() {
                return Err(Rejection::PlanExhausted);
            }
            self.acknowledge_and_advance()?;
        }

        match self.store.get() {
            Some(state) => {
                let (duration, kind, linked) = (
                    state.planned_duration_seconds,
                    state.session_kind,
                    state.task(),
                );
                self.start(duration, kind, linked)
            }
            None => {
                let task = task.ok_or(Rejection::NoActiveSession)?;
                let (duration, kind) = match self.plan.get(0) {
                    Some(first) => (first.duration_secs, first.kind),
                    None => return Err(Rejection::PlanExhausted),
                };
                self.start(duration, kind, task)
            }
        }
    }

    /// Freeze the remaining time and cancel the backstop.
    ///
    /// Pausing after the deadline cannot freeze anything: the session is
    /// completed on the spot and the pause is refused.
    pub fn pause(&mut self) -> Result<Event, Rejection> {
        let now = self.clock.now_ms();
        let state = self.store.get().ok_or(Rejection::NoActiveSession)?;
        if !state.is_running() {
            return Err(Rejection::NotRunning);
        }
        if state.completion_handled {
            return Err(Rejection::CompletionPending);
        }
        let (due, remaining, index) = (
            state.is_due(now),
            state.remaining_seconds(now),
            state.session_sequence_index,
        );
        if due {
            self.complete(CompletionTrigger::Interaction);
            return Err(Rejection::CompletionPending);
        }

        let handle = self
            .store
            .update(|s| {
                s.run_status = RunStatus::Paused;
                s.started_at_epoch_ms = None;
                s.expected_end_epoch_ms = None;
                s.remaining_seconds_at_pause = Some(remaining);
                s.pending_notification_handle.take()
            })
            .flatten();
        if let Some(handle) = handle {
            self.cancel_backstop(&handle);
        }
        info!(index, remaining, "session paused");

        Ok(self.emit(Event::SessionPaused {
            session_index: index,
            remaining_secs: remaining,
            at: timestamp(now),
        }))
    }

    /// Set a fresh deadline from the frozen remainder.
    pub fn resume(&mut self) -> Result<Event, Rejection> {
        let now = self.clock.now_ms();
        let state = self.store.get().ok_or(Rejection::NoActiveSession)?;
        if state.run_status != RunStatus::Paused {
            return Err(Rejection::NotPaused);
        }

        let remaining = state
            .remaining_seconds_at_pause
            .unwrap_or(state.planned_duration_seconds);
        let (index, kind, task) = (
            state.session_sequence_index,
            state.session_kind,
            state.task(),
        );
        let deadline = now.saturating_add(remaining.saturating_mul(1000));
        let handle = self.schedule_backstop(index, kind, &task, deadline);

        self.store.update(|s| {
            s.run_status = RunStatus::Running;
            s.started_at_epoch_ms = Some(now);
            s.expected_end_epoch_ms = Some(deadline);
            s.remaining_seconds_at_pause = None;
            s.pending_notification_handle = handle;
        });
        info!(index, remaining, "session resumed");

        Ok(self.emit(Event::SessionResumed {
            session_index: index,
            remaining_secs: remaining,
            expected_end_epoch_ms: deadline,
            at: timestamp(now),
        }))
    }

    /// Back to Idle with the full planned duration.
    pub fn reset(&mut self) -> Result<Event, Rejection> {
        let state = self.store.get().ok_or(Rejection::NoActiveSession)?;
        match state.run_status {
            RunStatus::Idle => return Err(Rejection::NotRunning),
            _ if state.completion_handled => return Err(Rejection::CompletionPending),
            _ => {}
        }
        let (index, duration) = (state.session_sequence_index, state.planned_duration_seconds);

        let handle = self
            .store
            .update(|s| {
                s.run_status = RunStatus::Idle;
                s.started_at_epoch_ms = None;
                s.expected_end_epoch_ms = None;
                s.remaining_seconds_at_pause = None;
                s.completion_handled = false;
                s.pending_notification_handle.take()
            })
            .flatten();
        if let Some(handle) = handle {
            self.cancel_backstop(&handle);
        }
        info!(index, "session reset");

        Ok(self.emit(Event::SessionReset {
            session_index: index,
            duration_secs: duration,
            at: timestamp(self.clock.now_ms()),
        }))
    }

    /// Leave a break early. Focus sessions cannot be skipped.
    pub fn skip(&mut self) -> Result<Event, Rejection> {
        let state = self
            .store
            .get()
            .cloned()
            .ok_or(Rejection::NoActiveSession)?;
        if state.session_kind == SessionKind::Focus {
            return Err(Rejection::FocusNotSkippable);
        }
        if let Some(handle) = &state.pending_notification_handle {
            self.cancel_backstop(handle);
        }

        let from = state.session_sequence_index;
        info!(from, kind = %state.session_kind, "break skipped");
        let skipped = self.emit(Event::SessionSkipped {
            from_index: from,
            to_index: from + 1,
            at: timestamp(self.clock.now_ms()),
        });
        self.advance_past(&state);
        Ok(skipped)
    }

    /// Move past a completed session to the next planned one.
    ///
    /// The next session is left Idle. Once the plan is exhausted the record
    /// is destroyed and [`Event::PlanFinished`] is returned.
    pub fn acknowledge_and_advance(&mut self) -> Result<Event, Rejection> {
        let state = self
            .store
            .get()
            .cloned()
            .ok_or(Rejection::NoActiveSession)?;
        if !(state.is_running() && state.completion_handled) {
            return Err(Rejection::NotCompleted);
        }
        Ok(self.advance_past(&state))
    }

    /// Drop the plan for the linked task entirely.
    pub fn abandon(&mut self) -> Result<Event, Rejection> {
        let state = self
            .store
            .get()
            .cloned()
            .ok_or(Rejection::NoActiveSession)?;
        if let Some(handle) = &state.pending_notification_handle {
            self.cancel_backstop(handle);
        }
        self.store.clear();
        info!(task = %state.linked_task_id, "plan abandoned");

        Ok(self.emit(Event::PlanAbandoned {
            task_id: state.linked_task_id,
            at: timestamp(self.clock.now_ms()),
        }))
    }

    fn advance_past(&mut self, state: &TimerState) -> Event {
        let now = self.clock.now_ms();
        let next = state.session_sequence_index + 1;
        match self.plan.get(next).cloned() {
            Some(planned) => {
                let mut idle =
                    TimerState::idle(next, planned.kind, planned.duration_secs, &state.task());
                // Only an explicit start of the next session clears the flag.
                idle.completion_handled = state.completion_handled;
                self.store.save(idle);
                debug!(next, kind = %planned.kind, "advanced to next session");
                self.emit(Event::SessionAdvanced {
                    session_index: next,
                    session_kind: planned.kind,
                    duration_secs: planned.duration_secs,
                    at: timestamp(now),
                })
            }
            None => {
                self.store.clear();
                info!(task = %state.linked_task_id, "plan finished");
                self.emit(Event::PlanFinished {
                    task_id: state.linked_task_id.clone(),
                    at: timestamp(now),
                })
            }
        }
    }

    // ── Completion ──────────────────────────────────────────────────────

    /// Handle the end of the running session exactly once.
    ///
    /// Returns `None` when nothing is running or the session was already
    /// handled by an earlier trigger.
    pub fn complete(&mut self, trigger: CompletionTrigger) -> Option<CompletionOutcome> {
        let claimable = self
            .store
            .get()
            .is_some_and(|s| s.is_running() && !s.completion_handled);
        if !claimable {
            debug!(?trigger, "completion already handled");
            return None;
        }
        let handle = self
            .store
            .update(|s| {
                s.completion_handled = true;
                s.pending_notification_handle.take()
            })
            .flatten();
        let state = self.store.get().cloned()?;

        let backstop = match &handle {
            Some(handle) => self.cancel_backstop(handle),
            None => Backstop::None,
        };
        info!(
            index = state.session_sequence_index,
            kind = %state.session_kind,
            ?trigger,
            "session completed"
        );

        let now = self.clock.now_ms();
        let event = self.emit(Event::SessionCompleted {
            task_id: state.linked_task_id.clone(),
            task_title: state.linked_task_title.clone(),
            session_kind: state.session_kind,
            session_index: state.session_sequence_index,
            trigger,
            at: timestamp(now),
        });
        let surface = self.present_completion(&state, trigger, backstop, now);
        Some(CompletionOutcome { event, surface })
    }

    /// Complete the running session if its deadline has passed.
    pub fn check_deadline(&mut self, trigger: CompletionTrigger) -> Option<CompletionOutcome> {
        let now = self.clock.now_ms();
        let due = self.store.get().is_some_and(|s| s.is_due(now));
        if due {
            self.complete(trigger)
        } else {
            None
        }
    }

    /// One pass of the in-process detector: retry unsaved state, publish a
    /// settled lifecycle transition, then compare clock and deadline.
    pub fn poll_tick(&mut self) -> Option<CompletionOutcome> {
        if self.store.is_dirty() {
            self.store.flush();
        }
        let now = self.clock.now_ms();
        if self.lifecycle.settle(now) == Some(AppLifecycle::Foreground) {
            if let Some(outcome) = self.check_deadline(CompletionTrigger::Foreground) {
                return Some(outcome);
            }
        }
        self.check_deadline(CompletionTrigger::PollTick)
    }

    /// Feed a host lifecycle signal. Returning to the foreground runs an
    /// immediate deadline check.
    pub fn on_lifecycle_signal(&mut self, raw: RawLifecycleSignal) -> Option<CompletionOutcome> {
        let now = self.clock.now_ms();
        match self.lifecycle.on_raw_signal(raw, now) {
            Some(AppLifecycle::Foreground) => self.check_deadline(CompletionTrigger::Foreground),
            _ => None,
        }
    }

    /// Reload the durable record after process start.
    pub fn restore(&mut self) -> Option<CompletionOutcome> {
        match self.store.load() {
            Some(state) => info!(
                index = state.session_sequence_index,
                status = ?state.run_status,
                handled = state.completion_handled,
                "timer record restored"
            ),
            None => debug!("no timer record to restore"),
        }
        self.check_deadline(CompletionTrigger::Restart)
    }

    pub fn set_timer_screen_visible(&mut self, visible: bool) {
        self.on_timer_screen = visible;
    }

    fn present_completion(
        &mut self,
        state: &TimerState,
        trigger: CompletionTrigger,
        backstop: Backstop,
        now: u64,
    ) -> CompletionSurface {
        if trigger == CompletionTrigger::NotificationTap {
            return CompletionSurface::AlreadyPresented;
        }
        // A foreground report still inside the debounce window already
        // means the user is looking at the app.
        self.lifecycle.settle(now);
        match (self.lifecycle.latest(), self.on_timer_screen) {
            (AppLifecycle::Foreground, true) => CompletionSurface::TimerScreen,
            (AppLifecycle::Foreground, false) => {
                self.emit(Event::CompletionPrompt {
                    task_id: state.linked_task_id.clone(),
                    task_title: state.linked_task_title.clone(),
                    session_kind: state.session_kind,
                    at: timestamp(now),
                });
                CompletionSurface::InAppPrompt
            }
            (AppLifecycle::Background, _) if backstop == Backstop::AlreadyDelivered => {
                debug!("backstop notification already delivered");
                CompletionSurface::AlreadyPresented
            }
            (AppLifecycle::Background, _) => self.show_completion_notification(state),
        }
    }

    fn show_completion_notification(&mut self, state: &TimerState) -> CompletionSurface {
        if !self.notifications_enabled {
            debug!("notifications disabled, completion not surfaced");
            return CompletionSurface::Suppressed;
        }
        let payload = NotificationPayload::SessionComplete {
            session_kind: state.session_kind,
            task_id: state.linked_task_id.clone(),
            task_title: state.linked_task_title.clone(),
            session_index: Some(state.session_sequence_index),
            expected_end_epoch_ms: state.expected_end_epoch_ms,
        };
        let (title, body) = completion_copy(state.session_kind, &state.linked_task_title);
        let options = NotificationOptions::with_data(payload.to_map());
        match self.gateway.show_now(&title, &body, &options) {
            Ok(handle) => {
                debug!(%handle, "completion notification shown");
                CompletionSurface::Notification
            }
            Err(e) => {
                warn!("completion notification failed: {e}");
                CompletionSurface::Suppressed
            }
        }
    }

    fn schedule_backstop(
        &mut self,
        index: usize,
        kind: SessionKind,
        task: &TaskRef,
        deadline: u64,
    ) -> Option<NotificationHandle> {
        if !self.notifications_enabled {
            return None;
        }
        let payload = NotificationPayload::SessionComplete {
            session_kind: kind,
            task_id: task.id.clone(),
            task_title: task.title.clone(),
            session_index: Some(index),
            expected_end_epoch_ms: Some(deadline),
        };
        let (title, body) = completion_copy(kind, &task.title);
        match self
            .gateway
            .schedule_at(deadline, &title, &body, &payload.to_map())
        {
            Ok(handle) => {
                debug!(%handle, deadline, "backstop notification scheduled");
                Some(handle)
            }
            Err(e) => {
                warn!("backstop notification not scheduled: {e}");
                None
            }
        }
    }

    fn cancel_backstop(&mut self, handle: &NotificationHandle) -> Backstop {
        match self.gateway.cancel(handle) {
            Ok(CancelOutcome::Cancelled) => Backstop::Cancelled,
            Ok(CancelOutcome::AlreadyDelivered) => {
                debug!(%handle, "backstop already delivered");
                Backstop::AlreadyDelivered
            }
            Err(GatewayError::UnknownHandle(_)) => {
                // Scheduled by an earlier process; whether it fired is unknown.
                debug!(%handle, "backstop unknown to this gateway");
                Backstop::Unknown
            }
            Err(e) => {
                warn!(%handle, "failed to cancel backstop notification: {e}");
                Backstop::Unknown
            }
        }
    }

    pub(super) fn tap_tolerance_ms(&self) -> u64 {
        self.tap_tolerance_ms
    }

    pub(super) fn emit(&self, event: Event) -> Event {
        if self.events.send(event.clone()).is_err() {
            debug!("no event subscribers");
        }
        event
    }
}

impl std::fmt::Debug for SessionTimerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTimerService")
            .field("store", &self.store)
            .field("lifecycle", &self.lifecycle)
            .field("on_timer_screen", &self.on_timer_screen)
            .field("notifications_enabled", &self.notifications_enabled)
            .finish_non_exhaustive()
    }
}

fn completion_copy(kind: SessionKind, task_title: &str) -> (String, String) {
    let title = match kind {
        SessionKind::Focus => "Focus session complete",
        SessionKind::ShortBreak => "Break is over",
        SessionKind::LongBreak => "Long break is over",
    };
    let body = match (kind, task_title.is_empty()) {
        (SessionKind::Focus, true) => "Time for a break.".to_string(),
        (SessionKind::Focus, false) => format!("Nice work on \"{task_title}\". Time for a break."),
        (_, true) => "Ready for the next focus session?".to_string(),
        (_, false) => format!("Ready to get back to \"{task_title}\"?"),
    };
    (title.to_string(), body)
}
