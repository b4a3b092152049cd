//! Long-running timer owner.
//!
//! Runs the driver loop with desktop notifications, prints every event as a
//! JSON line on stdout and takes line commands on stdin:
//!
//! ```text
//! start <task_id> [title...]   next   pause   resume   reset   skip
//! advance   abandon   status   foreground   background   screen on|off
//! tap key=value...   dismiss key=value...   quit
//! ```
//!
//! Clicking or closing one of its desktop notifications is routed like the
//! `tap` and `dismiss` lines. While the daemon runs it is the only writer of
//! the timer record; one-shot timer commands should not be used alongside it.

use std::sync::Arc;

use focuskeeper_core::notify::PayloadMap;
use focuskeeper_core::{
    AppLifecycle, Command, Config, DesktopGateway, GatewayActivation, LifecycleObserver,
    RawLifecycleSignal, ServiceHandle, ServiceStopped, SessionTimerService, SqliteBackend,
    SystemClock, TaskRef, TimerDriver, TimerStore,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use super::notification::parse_pair;
use super::{print_json, CliResult};

#[derive(Debug, PartialEq, Eq)]
enum DaemonInput {
    Command(Command),
    Status,
    Lifecycle(RawLifecycleSignal),
    TimerScreen(bool),
    Tap(PayloadMap),
    Dismiss(PayloadMap),
    Quit,
}

fn parse_line(line: &str) -> Result<Option<DaemonInput>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let input = match verb.to_ascii_lowercase().as_str() {
        "start" => {
            let id = words.next().ok_or("usage: start <task_id> [title...]")?;
            let title = words.collect::<Vec<_>>().join(" ");
            DaemonInput::Command(Command::StartNext {
                task: Some(TaskRef::new(id, title)),
            })
        }
        "next" => DaemonInput::Command(Command::StartNext { task: None }),
        "pause" => DaemonInput::Command(Command::Pause),
        "resume" => DaemonInput::Command(Command::Resume),
        "reset" => DaemonInput::Command(Command::Reset),
        "skip" => DaemonInput::Command(Command::Skip),
        "advance" => DaemonInput::Command(Command::Advance),
        "abandon" => DaemonInput::Command(Command::Abandon),
        "status" => DaemonInput::Status,
        "screen" => match words.next() {
            Some("on") => DaemonInput::TimerScreen(true),
            Some("off") => DaemonInput::TimerScreen(false),
            _ => return Err("usage: screen on|off".into()),
        },
        "tap" => DaemonInput::Tap(parse_payload(words)?),
        "dismiss" => DaemonInput::Dismiss(parse_payload(words)?),
        "quit" | "exit" => DaemonInput::Quit,
        other => DaemonInput::Lifecycle(other.parse()?),
    };
    Ok(Some(input))
}

fn parse_payload<'a>(words: impl Iterator<Item = &'a str>) -> Result<PayloadMap, String> {
    words.map(parse_pair).collect()
}

pub fn run() -> CliResult {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve())
}

async fn serve() -> CliResult {
    let config = Config::load_or_default();
    let backend = SqliteBackend::open_default()?;
    let (activation_tx, activation_rx) = mpsc::unbounded_channel();
    let gateway =
        DesktopGateway::new(config.notifications.app_name.clone()).with_activations(activation_tx);
    // No window of its own: completions surface as desktop notifications.
    let service = SessionTimerService::from_config(
        &config,
        TimerStore::new(backend),
        gateway,
        Arc::new(SystemClock),
    )
    .with_lifecycle(LifecycleObserver::new(
        AppLifecycle::Background,
        config.timer.lifecycle_debounce_ms,
    ));

    let (driver, handle) = TimerDriver::new(service, config.poll_interval());
    tokio::spawn(print_events(handle.subscribe_events()));
    tokio::spawn(forward_activations(handle.clone(), activation_rx));

    let (quit_tx, quit_rx) = oneshot::channel();
    let reader = tokio::spawn(read_commands(handle.clone(), quit_tx));
    let shutdown = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("interrupt received"),
            Ok(()) = quit_rx => info!("quit requested"),
        }
    };

    let service = driver.run(shutdown).await;
    reader.abort();
    if service.has_unsaved_state() {
        warn!("timer record could not be saved before exit");
    }
    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<focuskeeper_core::Event>) {
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("failed to encode event: {e}"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event output fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Route clicks and dismissals on desktop notifications into the service.
async fn forward_activations(
    handle: ServiceHandle,
    mut activations: mpsc::UnboundedReceiver<GatewayActivation>,
) {
    while let Some(activation) = activations.recv().await {
        let delivered = match activation {
            GatewayActivation::Tapped { handle: id, data } => {
                debug!(notification = %id, "notification tapped");
                handle.notification_tap(data).await.map(|_| ())
            }
            GatewayActivation::Dismissed { handle: id, data } => {
                debug!(notification = %id, "notification dismissed");
                handle.notification_dismiss(data).await
            }
        };
        if delivered.is_err() {
            break;
        }
    }
}

async fn read_commands(handle: ServiceHandle, quit: oneshot::Sender<()>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("stdin closed, running until interrupted");
                return;
            }
            Err(e) => {
                warn!("failed to read stdin: {e}");
                return;
            }
        };
        let input = match parse_line(&line) {
            Ok(Some(input)) => input,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("error: {e}");
                continue;
            }
        };
        if input == DaemonInput::Quit {
            let _ = quit.send(());
            return;
        }
        if let Err(e) = dispatch(&handle, input).await {
            warn!("{e}");
            return;
        }
    }
}

async fn dispatch(handle: &ServiceHandle, input: DaemonInput) -> Result<(), ServiceStopped> {
    match input {
        DaemonInput::Command(command) => {
            if let Err(rejection) = handle.command(command).await? {
                eprintln!("rejected: {rejection}");
            }
        }
        DaemonInput::Status => {
            let snapshot = handle.snapshot().await?;
            if let Err(e) = print_json(&snapshot) {
                warn!("failed to print status: {e}");
            }
        }
        DaemonInput::Lifecycle(signal) => handle.lifecycle(signal).await?,
        DaemonInput::TimerScreen(visible) => handle.set_timer_screen_visible(visible).await?,
        DaemonInput::Tap(data) => {
            handle.notification_tap(data).await?;
        }
        DaemonInput::Dismiss(data) => handle.notification_dismiss(data).await?,
        DaemonInput::Quit => {}
    }
    Ok(())
}
