use clap::Subcommand;
use focuskeeper_core::{Command, SessionKind, TaskRef};

use super::{open_service, print_json, CliResult};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start a session for a task. Without --kind and a duration, starts
    /// the next session of the plan.
    Start {
        /// Task the session belongs to
        #[arg(long)]
        task_id: String,
        /// Task title shown in notifications
        #[arg(long, default_value = "")]
        title: String,
        /// focus, short_break or long_break
        #[arg(long)]
        kind: Option<SessionKind>,
        /// Session length in minutes
        #[arg(long, conflicts_with = "seconds")]
        minutes: Option<u64>,
        /// Session length in seconds
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Start the next planned session (acknowledging a completed one)
    Next {
        /// Needed only when no plan is in progress
        #[arg(long)]
        task_id: Option<String>,
        #[arg(long, default_value = "")]
        title: String,
    },
    /// Pause the running session
    Pause,
    /// Resume a paused session
    Resume,
    /// Reset the session to its full duration
    Reset,
    /// Skip the current break
    Skip,
    /// Acknowledge a completed session and move to the next one
    Advance,
    /// Drop the plan entirely
    Abandon,
    /// Print the current timer snapshot as JSON
    Status,
    /// Run one completion check against the wall clock
    Check,
}

pub fn run(action: TimerAction) -> CliResult {
    let mut service = open_service()?;

    let command = match action {
        TimerAction::Status => return print_json(&service.snapshot()),
        TimerAction::Check => {
            return match service.poll_tick() {
                Some(outcome) => print_json(&outcome.event),
                None => print_json(&service.snapshot()),
            };
        }
        TimerAction::Start {
            task_id,
            title,
            kind,
            minutes,
            seconds,
        } => {
            let task = TaskRef::new(task_id, title);
            let duration = minutes.map(|m| m.saturating_mul(60)).or(seconds);
            match (kind, duration) {
                (None, None) => Command::StartNext { task: Some(task) },
                (kind, duration) => {
                    let kind = kind.unwrap_or(SessionKind::Focus);
                    let duration_secs = match duration {
                        Some(secs) => secs,
                        None => service
                            .plan()
                            .sessions()
                            .iter()
                            .find(|s| s.kind == kind)
                            .map(|s| s.duration_secs)
                            .unwrap_or(25 * 60),
                    };
                    Command::Start {
                        duration_secs,
                        kind,
                        task,
                    }
                }
            }
        }
        TimerAction::Next { task_id, title } => Command::StartNext {
            task: task_id.map(|id| TaskRef::new(id, title)),
        },
        TimerAction::Pause => Command::Pause,
        TimerAction::Resume => Command::Resume,
        TimerAction::Reset => Command::Reset,
        TimerAction::Skip => Command::Skip,
        TimerAction::Advance => Command::Advance,
        TimerAction::Abandon => Command::Abandon,
    };

    let event = service.execute(command)?;
    print_json(&event)
}
