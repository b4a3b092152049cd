//! Integration tests for the race between a notification tap and the
//! in-process completion detector.

use std::sync::Arc;

use focuskeeper_core::{
    AppLifecycle, Clock, CompletionSurface, CompletionTrigger, Event, ManualClock, MemoryBackend,
    NavigationTarget, RawLifecycleSignal, RecordingGateway, SessionKind, SessionTimerService,
    TaskRef, TimerStore,
};

const T0: u64 = 1_700_000_000_000;

struct Fixture {
    service: SessionTimerService,
    clock: ManualClock,
    gateway: RecordingGateway,
}

fn backgrounded_focus_session() -> Fixture {
    let clock = ManualClock::new(T0);
    let gateway = RecordingGateway::new();
    let mut service = SessionTimerService::new(
        TimerStore::new(MemoryBackend::new()),
        gateway.clone(),
        Arc::new(clock.clone()),
    );
    service
        .start(25 * 60, SessionKind::Focus, TaskRef::new("7", "Write report"))
        .unwrap();
    service.on_lifecycle_signal(RawLifecycleSignal::Background);
    assert_eq!(service.lifecycle(), AppLifecycle::Background);
    Fixture {
        service,
        clock,
        gateway,
    }
}

#[test]
fn test_tap_before_detector_wins_the_race() {
    let mut f = backgrounded_focus_session();
    let mut events = f.service.subscribe_events();

    f.clock.advance_secs(25 * 60);
    let fired = f.gateway.fire_due(f.clock.now_ms());
    assert_eq!(fired.len(), 1);

    let tap = f.service.on_notification_tap(&fired[0].data);
    let completion = tap.completion.expect("tap should complete the session");
    assert_eq!(completion.surface, CompletionSurface::AlreadyPresented);

    // The detector runs right after and finds nothing to do.
    assert!(f.service.poll_tick().is_none());

    let seen: Vec<Event> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    let completed: Vec<&Event> = seen
        .iter()
        .filter(|e| matches!(e, Event::SessionCompleted { .. }))
        .collect();
    assert_eq!(completed.len(), 1);
    assert!(matches!(
        completed[0],
        Event::SessionCompleted {
            trigger: CompletionTrigger::NotificationTap,
            ..
        }
    ));
    assert!(!seen
        .iter()
        .any(|e| matches!(e, Event::CompletionPrompt { .. })));
    assert!(f.gateway.shown().is_empty());
}

#[test]
fn test_tap_after_detector_only_navigates() {
    let mut f = backgrounded_focus_session();
    let mut events = f.service.subscribe_events();

    f.clock.advance_secs(25 * 60 + 2);
    let fired = f.gateway.fire_due(f.clock.now_ms());
    let detected = f.service.poll_tick().unwrap();
    assert_eq!(detected.surface, CompletionSurface::AlreadyPresented);

    let tap = f.service.on_notification_tap(&fired[0].data);
    assert!(tap.completion.is_none());
    assert_eq!(
        tap.navigation,
        Some(NavigationTarget::Timer {
            task_id: "7".into(),
            task_title: "Write report".into(),
        })
    );

    let seen: Vec<Event> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert_eq!(
        seen.iter()
            .filter(|e| matches!(e, Event::SessionCompleted { .. }))
            .count(),
        1
    );
    assert!(seen
        .iter()
        .any(|e| matches!(e, Event::NavigationRequested { .. })));
}

#[test]
fn test_tap_for_previous_session_does_not_complete_current_one() {
    let mut f = backgrounded_focus_session();
    f.clock.advance_secs(25 * 60);
    let old = f.gateway.fire_due(f.clock.now_ms()).remove(0);
    f.service.poll_tick().unwrap();

    f.service.acknowledge_and_advance().unwrap();
    f.service.start_next(None).unwrap();
    f.clock.advance_secs(5 * 60 - 1);

    let tap = f.service.on_notification_tap(&old.data);
    assert!(tap.completion.is_none());
    assert!(!f.service.current().unwrap().completion_handled);
    assert_eq!(f.service.current().unwrap().session_sequence_index, 1);
}

#[test]
fn test_background_detection_before_backstop_fires_notifies() {
    let mut f = backgrounded_focus_session();
    f.clock.advance_secs(25 * 60);

    let outcome = f.service.poll_tick().unwrap();
    assert_eq!(outcome.surface, CompletionSurface::Notification);
    let shown = f.gateway.shown();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].data["type"], "session_complete");
    assert_eq!(shown[0].data["taskTitle"], "Write report");
    assert!(f.gateway.scheduled().is_empty());
}
