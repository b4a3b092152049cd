use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::{CompletionTrigger, SessionKind};

/// Every timer transition produces an Event.
/// UI collaborators subscribe to them on the service's broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    SessionStarted {
        session_index: usize,
        session_kind: SessionKind,
        duration_secs: u64,
        expected_end_epoch_ms: u64,
        task_id: String,
        at: DateTime<Utc>,
    },
    SessionPaused {
        session_index: usize,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    SessionResumed {
        session_index: usize,
        remaining_secs: u64,
        expected_end_epoch_ms: u64,
        at: DateTime<Utc>,
    },
    SessionReset {
        session_index: usize,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    SessionSkipped {
        from_index: usize,
        to_index: usize,
        at: DateTime<Utc>,
    },
    /// Fired at most once per session instance.
    SessionCompleted {
        task_id: String,
        task_title: String,
        session_kind: SessionKind,
        session_index: usize,
        trigger: CompletionTrigger,
        at: DateTime<Utc>,
    },
    /// The in-app completion prompt should be shown.
    CompletionPrompt {
        task_id: String,
        task_title: String,
        session_kind: SessionKind,
        at: DateTime<Utc>,
    },
    SessionAdvanced {
        session_index: usize,
        session_kind: SessionKind,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    PlanFinished {
        task_id: String,
        at: DateTime<Utc>,
    },
    PlanAbandoned {
        task_id: String,
        at: DateTime<Utc>,
    },
    NavigationRequested {
        target: NavigationTarget,
        at: DateTime<Utc>,
    },
}

/// Where a tapped notification should take the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "screen", rename_all = "snake_case")]
pub enum NavigationTarget {
    Timer {
        task_id: String,
        task_title: String,
    },
    Task {
        task_id: String,
        project_id: Option<String>,
    },
}

/// Event timestamp from an epoch-millisecond clock reading.
pub fn timestamp(epoch_ms: u64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms as i64).unwrap_or_default()
}
