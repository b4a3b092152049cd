//! Single cooperative loop that owns the timer service.
//!
//! Poll ticks, user commands, lifecycle signals and notification taps all
//! arrive on the same task and are applied one at a time, so no two of them
//! can interleave inside a transition.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::router::TapOutcome;
use super::service::{Command, SessionTimerService};
use super::state::TimerSnapshot;
use crate::error::{Rejection, ServiceStopped};
use crate::events::Event;
use crate::lifecycle::RawLifecycleSignal;
use crate::notify::PayloadMap;

const INPUT_CAPACITY: usize = 32;

enum Input {
    Command(Command, oneshot::Sender<Result<Event, Rejection>>),
    Lifecycle(RawLifecycleSignal),
    Tap(PayloadMap, oneshot::Sender<TapOutcome>),
    Dismiss(PayloadMap),
    TimerScreenVisible(bool),
    Snapshot(oneshot::Sender<Option<TimerSnapshot>>),
}

/// Cloneable front door to a running [`TimerDriver`].
#[derive(Clone)]
pub struct ServiceHandle {
    inputs: mpsc::Sender<Input>,
    events: broadcast::Sender<Event>,
}

impl ServiceHandle {
    pub async fn command(&self, command: Command) -> Result<Result<Event, Rejection>, ServiceStopped> {
        let (reply, rx) = oneshot::channel();
        self.send(Input::Command(command, reply)).await?;
        rx.await.map_err(|_| ServiceStopped)
    }

    pub async fn lifecycle(&self, signal: RawLifecycleSignal) -> Result<(), ServiceStopped> {
        self.send(Input::Lifecycle(signal)).await
    }

    pub async fn notification_tap(&self, data: PayloadMap) -> Result<TapOutcome, ServiceStopped> {
        let (reply, rx) = oneshot::channel();
        self.send(Input::Tap(data, reply)).await?;
        rx.await.map_err(|_| ServiceStopped)
    }

    pub async fn notification_dismiss(&self, data: PayloadMap) -> Result<(), ServiceStopped> {
        self.send(Input::Dismiss(data)).await
    }

    pub async fn set_timer_screen_visible(&self, visible: bool) -> Result<(), ServiceStopped> {
        self.send(Input::TimerScreenVisible(visible)).await
    }

    pub async fn snapshot(&self) -> Result<Option<TimerSnapshot>, ServiceStopped> {
        let (reply, rx) = oneshot::channel();
        self.send(Input::Snapshot(reply)).await?;
        rx.await.map_err(|_| ServiceStopped)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    async fn send(&self, input: Input) -> Result<(), ServiceStopped> {
        self.inputs.send(input).await.map_err(|_| ServiceStopped)
    }
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("closed", &self.inputs.is_closed())
            .finish()
    }
}

pub struct TimerDriver {
    service: SessionTimerService,
    inputs: mpsc::Receiver<Input>,
    poll_interval: Duration,
}

impl TimerDriver {
    pub fn new(service: SessionTimerService, poll_interval: Duration) -> (Self, ServiceHandle) {
        let (tx, rx) = mpsc::channel(INPUT_CAPACITY);
        let handle = ServiceHandle {
            inputs: tx,
            events: service.event_sender(),
        };
        let driver = Self {
            service,
            inputs: rx,
            poll_interval,
        };
        (driver, handle)
    }

    /// Restore the durable record, then serve until `shutdown` resolves or
    /// every handle is dropped. Hands the service back for inspection.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> SessionTimerService {
        self.service.restore();

        let mut tick = tokio::time::interval(self.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(poll_ms = self.poll_interval.as_millis() as u64, "timer driver running");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("timer driver shutting down");
                    break;
                }
                _ = tick.tick() => {
                    self.service.poll_tick();
                }
                input = self.inputs.recv() => match input {
                    Some(input) => self.apply(input),
                    None => {
                        debug!("all service handles dropped");
                        break;
                    }
                },
            }
        }
        self.service.poll_tick();
        self.service
    }

    fn apply(&mut self, input: Input) {
        match input {
            Input::Command(command, reply) => {
                let result = self.service.execute(command);
                if let Err(rejection) = &result {
                    debug!(%rejection, "command rejected");
                }
                let _ = reply.send(result);
            }
            Input::Lifecycle(signal) => {
                self.service.on_lifecycle_signal(signal);
            }
            Input::Tap(data, reply) => {
                let _ = reply.send(self.service.on_notification_tap(&data));
            }
            Input::Dismiss(data) => self.service.on_notification_dismiss(&data),
            Input::TimerScreenVisible(visible) => self.service.set_timer_screen_visible(visible),
            Input::Snapshot(reply) => {
                let _ = reply.send(self.service.snapshot());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::notify::RecordingGateway;
    use crate::store::{MemoryBackend, TimerStore};
    use crate::timer::{CompletionTrigger, SessionKind, TaskRef};

    #[tokio::test(start_paused = true)]
    async fn poll_loop_detects_deadline() {
        let clock = ManualClock::new(0);
        let service = SessionTimerService::new(
            TimerStore::new(MemoryBackend::new()),
            RecordingGateway::new(),
            Arc::new(clock.clone()),
        );
        let (driver, handle) = TimerDriver::new(service, Duration::from_millis(100));
        let mut events = handle.subscribe_events();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(driver.run(async {
            let _ = stop_rx.await;
        }));

        let started = handle
            .command(Command::Start {
                duration_secs: 5,
                kind: SessionKind::Focus,
                task: TaskRef::new("7", "Write"),
            })
            .await
            .unwrap();
        assert!(started.is_ok());
        assert!(matches!(events.recv().await.unwrap(), Event::SessionStarted { .. }));

        clock.advance_secs(5);
        tokio::time::sleep(Duration::from_millis(150)).await;

        let completed = events.recv().await.unwrap();
        assert!(matches!(
            completed,
            Event::SessionCompleted {
                trigger: CompletionTrigger::PollTick,
                ..
            }
        ));

        let snapshot = handle.snapshot().await.unwrap().unwrap();
        assert!(snapshot.state.completion_handled);

        stop_tx.send(()).unwrap();
        let service = task.await.unwrap();
        assert!(service.current().unwrap().completion_handled);
    }

    #[tokio::test]
    async fn handle_reports_stopped_driver() {
        let service = SessionTimerService::new(
            TimerStore::new(MemoryBackend::new()),
            RecordingGateway::new(),
            Arc::new(ManualClock::new(0)),
        );
        let (driver, handle) = TimerDriver::new(service, Duration::from_secs(1));
        driver.run(async {}).await;

        assert!(matches!(handle.snapshot().await, Err(ServiceStopped)));
    }
}
