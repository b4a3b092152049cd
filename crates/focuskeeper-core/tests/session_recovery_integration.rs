//! Integration tests for session completion across suspension and restarts.
//!
//! A "restart" here drops the service and builds a new one over the same
//! durable backend, which is what a killed and relaunched process sees.

use std::sync::Arc;

use focuskeeper_core::{
    AppLifecycle, CompletionSurface, CompletionTrigger, Database, DesktopGateway, Event,
    LifecycleObserver, ManualClock, MemoryBackend, RawLifecycleSignal, RecordingGateway,
    Rejection, SessionKind, SessionTimerService, SqliteBackend, StateBackend, TaskRef,
    TimerStore,
};
use focuskeeper_core::timer::RunStatus;
use tokio::sync::broadcast;

const T0: u64 = 1_700_000_000_000;

fn service_over(
    backend: impl StateBackend + 'static,
    clock: &ManualClock,
    gateway: &RecordingGateway,
) -> SessionTimerService {
    SessionTimerService::new(
        TimerStore::new(backend),
        gateway.clone(),
        Arc::new(clock.clone()),
    )
}

fn drain(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}

fn completions(events: &[Event]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, Event::SessionCompleted { .. }))
        .count()
}

#[test]
fn test_restart_after_deadline_completes_once() {
    let clock = ManualClock::new(T0);
    let gateway = RecordingGateway::new();
    let backend = MemoryBackend::new();

    let mut first = service_over(backend.clone(), &clock, &gateway);
    first
        .start(25 * 60, SessionKind::Focus, TaskRef::new("7", "Write report"))
        .unwrap();
    drop(first);

    clock.set(T0 + (25 * 60 + 1) * 1000);
    let mut second = service_over(backend.clone(), &clock, &gateway);
    let mut events = second.subscribe_events();

    let outcome = second.restore().expect("restart should complete the session");
    assert!(matches!(
        outcome.event,
        Event::SessionCompleted {
            trigger: CompletionTrigger::Restart,
            session_index: 0,
            ..
        }
    ));
    assert_eq!(outcome.surface, CompletionSurface::InAppPrompt);

    // A second detector pass and a third process see the handled flag.
    assert!(second.poll_tick().is_none());
    drop(second);
    let mut third = service_over(backend, &clock, &gateway);
    assert!(third.restore().is_none());
    assert!(third.current().unwrap().completion_handled);

    assert_eq!(completions(&drain(&mut events)), 1);
}

#[test]
fn test_restart_before_deadline_resumes_countdown() {
    let clock = ManualClock::new(T0);
    let gateway = RecordingGateway::new();
    let backend = MemoryBackend::new();

    let mut first = service_over(backend.clone(), &clock, &gateway);
    first
        .start(1500, SessionKind::Focus, TaskRef::new("7", "Write"))
        .unwrap();
    drop(first);

    clock.advance_secs(600);
    let mut second = service_over(backend, &clock, &gateway);
    assert!(second.restore().is_none());

    let snapshot = second.snapshot().unwrap();
    assert_eq!(snapshot.state.run_status, RunStatus::Running);
    assert_eq!(snapshot.remaining_seconds, 900);
}

#[test]
fn test_background_restart_shows_notification_for_lost_backstop() {
    let clock = ManualClock::new(T0);
    let backend = MemoryBackend::new();

    let first_gateway = RecordingGateway::new();
    let mut first = service_over(backend.clone(), &clock, &first_gateway)
        .with_lifecycle(LifecycleObserver::new(AppLifecycle::Background, 500));
    first
        .start(60, SessionKind::Focus, TaskRef::new("7", "Write report"))
        .unwrap();
    assert!(first.current().unwrap().pending_notification_handle.is_some());
    drop(first);

    // The relaunched process has a gateway that never saw that backstop.
    clock.advance_secs(120);
    let second_gateway = RecordingGateway::new();
    let mut second = service_over(backend, &clock, &second_gateway)
        .with_lifecycle(LifecycleObserver::new(AppLifecycle::Background, 500));
    let outcome = second.restore().unwrap();

    assert_eq!(outcome.surface, CompletionSurface::Notification);
    let shown = second_gateway.shown();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].data["taskId"], "7");
}

#[tokio::test]
async fn test_background_restart_over_desktop_gateway_is_not_silent() {
    let clock = ManualClock::new(T0);
    let backend = MemoryBackend::new();
    let background = || LifecycleObserver::new(AppLifecycle::Background, 500);

    let mut first = SessionTimerService::new(
        TimerStore::new(backend.clone()),
        DesktopGateway::new("focuskeeper-test"),
        Arc::new(clock.clone()),
    )
    .with_lifecycle(background());
    first
        .start(60, SessionKind::Focus, TaskRef::new("7", "Write"))
        .unwrap();
    drop(first);

    clock.advance_secs(120);
    let mut second = SessionTimerService::new(
        TimerStore::new(backend),
        DesktopGateway::new("focuskeeper-test"),
        Arc::new(clock.clone()),
    )
    .with_lifecycle(background());
    let outcome = second.restore().unwrap();

    // Headless hosts have no notification daemon, so Suppressed is accepted.
    assert_ne!(outcome.surface, CompletionSurface::AlreadyPresented);
}

#[test]
fn test_suspension_is_caught_up_on_foreground() {
    let clock = ManualClock::new(T0);
    let gateway = RecordingGateway::new();
    let mut service = service_over(MemoryBackend::new(), &clock, &gateway);
    let mut events = service.subscribe_events();

    service
        .start(1500, SessionKind::Focus, TaskRef::new("7", "Write"))
        .unwrap();
    service.on_lifecycle_signal(RawLifecycleSignal::Background);

    // Suspended: no ticks at all while the clock jumps an hour.
    clock.advance_secs(3600);
    let outcome = service
        .on_lifecycle_signal(RawLifecycleSignal::Active)
        .unwrap();
    assert_eq!(outcome.surface, CompletionSurface::InAppPrompt);

    assert!(service.poll_tick().is_none());
    let seen = drain(&mut events);
    assert_eq!(completions(&seen), 1);
    assert!(seen
        .iter()
        .any(|e| matches!(e, Event::CompletionPrompt { .. })));
}

#[test]
fn test_paused_session_survives_restart_without_completing() {
    let clock = ManualClock::new(T0);
    let gateway = RecordingGateway::new();
    let backend = MemoryBackend::new();

    let mut first = service_over(backend.clone(), &clock, &gateway);
    first
        .start(300, SessionKind::ShortBreak, TaskRef::new("7", "Write"))
        .unwrap();
    clock.advance_secs(100);
    first.pause().unwrap();
    drop(first);

    clock.advance_secs(86_400);
    let mut second = service_over(backend, &clock, &gateway);
    assert!(second.restore().is_none());
    assert_eq!(second.snapshot().unwrap().remaining_seconds, 200);

    second.resume().unwrap();
    clock.advance_secs(200);
    assert!(second.poll_tick().is_some());
}

#[test]
fn test_sqlite_file_carries_state_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("focuskeeper.db");
    let clock = ManualClock::new(T0);
    let gateway = RecordingGateway::new();

    {
        let backend = SqliteBackend::new(Database::open_at(&path).unwrap());
        let mut service = service_over(backend, &clock, &gateway);
        service
            .start(60, SessionKind::Focus, TaskRef::new("7", "Write"))
            .unwrap();
    }

    clock.advance_secs(61);
    let backend = SqliteBackend::new(Database::open_at(&path).unwrap());
    let mut service = service_over(backend, &clock, &gateway);
    let outcome = service.restore().unwrap();
    assert!(matches!(
        outcome.event,
        Event::SessionCompleted {
            trigger: CompletionTrigger::Restart,
            ..
        }
    ));

    let reopened = SqliteBackend::new(Database::open_at(&path).unwrap());
    let stored = reopened.read().unwrap().unwrap();
    assert!(stored.completion_handled);
    assert_eq!(stored.linked_task_id, "7");
}

#[test]
fn test_reset_and_skip_rules() {
    let clock = ManualClock::new(T0);
    let gateway = RecordingGateway::new();
    let mut service = service_over(MemoryBackend::new(), &clock, &gateway);

    service
        .start(1500, SessionKind::Focus, TaskRef::new("7", "Write"))
        .unwrap();
    assert_eq!(service.skip(), Err(Rejection::FocusNotSkippable));

    clock.advance_secs(700);
    service.reset().unwrap();
    let snapshot = service.snapshot().unwrap();
    assert_eq!(snapshot.state.run_status, RunStatus::Idle);
    assert_eq!(snapshot.remaining_seconds, 1500);
    assert_eq!(snapshot.state.expected_end_epoch_ms, None);

    // The reset session never completes on its own.
    clock.advance_secs(10_000);
    assert!(service.poll_tick().is_none());
}
