//! Notification tap routing.
//!
//! A tap carries only the flat payload map. A completion payload may finish
//! the session it names; every tap also requests navigation. Taps on stale
//! notifications (a session that was already handled, reset or superseded)
//! navigate without touching the timer.

use tracing::{debug, info, warn};

use super::service::{CompletionOutcome, CompletionTrigger, SessionTimerService};
use crate::events::{timestamp, Event, NavigationTarget};
use crate::notify::{NotificationPayload, PayloadMap, KEY_TYPE};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TapOutcome {
    /// Set when this tap was the trigger that completed the session.
    pub completion: Option<CompletionOutcome>,
    pub navigation: Option<NavigationTarget>,
}

impl SessionTimerService {
    pub fn on_notification_tap(&mut self, data: &PayloadMap) -> TapOutcome {
        let payload = match NotificationPayload::from_map(data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("ignoring notification tap: {e}");
                return TapOutcome::default();
            }
        };
        debug!(task = payload.task_id(), "notification tapped");

        match payload {
            NotificationPayload::SessionComplete {
                task_id,
                task_title,
                session_index,
                expected_end_epoch_ms,
                ..
            } => {
                let completion = if self.tap_names_due_session(session_index, expected_end_epoch_ms)
                {
                    self.complete(CompletionTrigger::NotificationTap)
                } else {
                    None
                };
                let target = NavigationTarget::Timer {
                    task_id,
                    task_title,
                };
                self.request_navigation(target.clone());
                TapOutcome {
                    completion,
                    navigation: Some(target),
                }
            }
            NotificationPayload::TaskReminder {
                task_id,
                project_id,
                ..
            } => {
                let target = NavigationTarget::Task {
                    task_id,
                    project_id,
                };
                self.request_navigation(target.clone());
                TapOutcome {
                    completion: None,
                    navigation: Some(target),
                }
            }
        }
    }

    /// Dismissals change nothing; they are recorded for diagnostics.
    pub fn on_notification_dismiss(&mut self, data: &PayloadMap) {
        let kind = data.get(KEY_TYPE).map(String::as_str).unwrap_or("unknown");
        info!(kind, "notification dismissed");
    }

    /// The tap refers to the running, unhandled session and its deadline is
    /// here (allowing for OS delivery arriving slightly early).
    fn tap_names_due_session(&self, index: Option<usize>, deadline: Option<u64>) -> bool {
        let Some(state) = self.current() else {
            debug!("tap for a session that no longer exists");
            return false;
        };
        if !state.is_running() || state.completion_handled {
            debug!("completion already resolved, navigating only");
            return false;
        }
        if index.is_some_and(|i| i != state.session_sequence_index) {
            debug!(?index, current = state.session_sequence_index, "tap for another session");
            return false;
        }
        let Some(current_deadline) = state.expected_end_epoch_ms else {
            return false;
        };
        deadline == Some(current_deadline)
            || self.now_ms().saturating_add(self.tap_tolerance_ms()) >= current_deadline
    }

    fn request_navigation(&self, target: NavigationTarget) {
        self.emit(Event::NavigationRequested {
            target,
            at: timestamp(self.now_ms()),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::notify::RecordingGateway;
    use crate::store::{MemoryBackend, TimerStore};
    use crate::timer::{CompletionSurface, SessionKind, TaskRef};

    fn service(clock: &ManualClock, gateway: &RecordingGateway) -> SessionTimerService {
        SessionTimerService::new(
            TimerStore::new(MemoryBackend::new()),
            gateway.clone(),
            Arc::new(clock.clone()),
        )
    }

    #[test]
    fn tap_on_backstop_completes_and_navigates() {
        let clock = ManualClock::new(1_000_000);
        let gateway = RecordingGateway::new();
        let mut service = service(&clock, &gateway);
        service
            .start(60, SessionKind::Focus, TaskRef::new("7", "Write"))
            .unwrap();
        clock.advance_secs(60);
        let fired = gateway.fire_due(clock.now_ms());

        let outcome = service.on_notification_tap(&fired[0].data);
        let completion = outcome.completion.unwrap();
        assert_eq!(completion.surface, CompletionSurface::AlreadyPresented);
        assert!(matches!(
            completion.event,
            Event::SessionCompleted {
                trigger: CompletionTrigger::NotificationTap,
                ..
            }
        ));
        assert_eq!(
            outcome.navigation,
            Some(NavigationTarget::Timer {
                task_id: "7".into(),
                task_title: "Write".into(),
            })
        );
    }

    #[test]
    fn tap_after_detector_only_navigates() {
        let clock = ManualClock::new(1_000_000);
        let gateway = RecordingGateway::new();
        let mut service = service(&clock, &gateway);
        service
            .start(60, SessionKind::Focus, TaskRef::new("7", "Write"))
            .unwrap();
        let payload = gateway.scheduled()[0].1.payload.clone();
        clock.advance_secs(61);
        assert!(service.poll_tick().is_some());

        let outcome = service.on_notification_tap(&payload);
        assert!(outcome.completion.is_none());
        assert!(outcome.navigation.is_some());
    }

    #[test]
    fn early_tap_on_stale_notification_does_not_complete() {
        let clock = ManualClock::new(1_000_000);
        let gateway = RecordingGateway::new();
        let mut service = service(&clock, &gateway);
        service
            .start(600, SessionKind::Focus, TaskRef::new("7", "Write"))
            .unwrap();

        let mut stale = gateway.scheduled()[0].1.payload.clone();
        stale.insert("expectedEndEpochMs".into(), "1".into());
        let outcome = service.on_notification_tap(&stale);
        assert!(outcome.completion.is_none());
        assert!(!service.current().unwrap().completion_handled);
    }

    #[test]
    fn task_reminder_tap_navigates_to_task() {
        let clock = ManualClock::new(0);
        let gateway = RecordingGateway::new();
        let mut service = service(&clock, &gateway);
        let mut events = service.subscribe_events();

        let payload = NotificationPayload::TaskReminder {
            task_id: "42".into(),
            task_title: "Call back".into(),
            project_id: Some("p-1".into()),
        };
        let outcome = service.on_notification_tap(&payload.to_map());
        assert!(outcome.completion.is_none());
        assert!(matches!(
            events.try_recv().unwrap(),
            Event::NavigationRequested {
                target: NavigationTarget::Task { .. },
                ..
            }
        ));
    }

    #[test]
    fn malformed_tap_is_ignored() {
        let clock = ManualClock::new(0);
        let gateway = RecordingGateway::new();
        let mut service = service(&clock, &gateway);
        let outcome = service.on_notification_tap(&PayloadMap::new());
        assert_eq!(outcome, TapOutcome::default());
    }
}
