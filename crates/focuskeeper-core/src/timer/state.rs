//! The durable timer record.
//!
//! At most one [`TimerState`] exists per device. It is stored as a flat
//! camelCase document so it survives process death and can be read back at
//! the next launch.
//!
//! Deadline-based: `expected_end_epoch_ms` is the only source of truth for
//! "is this session over". It is present if and only if the record is
//! `Running`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::notify::NotificationHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Focus,
    ShortBreak,
    LongBreak,
}

impl SessionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionKind::Focus => "focus",
            SessionKind::ShortBreak => "short_break",
            SessionKind::LongBreak => "long_break",
        }
    }

    pub fn is_break(self) -> bool {
        !matches!(self, SessionKind::Focus)
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "focus" => Ok(SessionKind::Focus),
            "short_break" | "shortbreak" => Ok(SessionKind::ShortBreak),
            "long_break" | "longbreak" => Ok(SessionKind::LongBreak),
            other => Err(format!("unknown session kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Idle,
    Running,
    Paused,
}

/// The task a session belongs to. Opaque here; only used to route navigation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskRef {
    pub id: String,
    pub title: String,
}

impl TaskRef {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub session_sequence_index: usize,
    pub session_kind: SessionKind,
    /// Duration of the current session. Never changes once it starts.
    pub planned_duration_seconds: u64,
    pub run_status: RunStatus,
    #[serde(default)]
    pub started_at_epoch_ms: Option<u64>,
    #[serde(default)]
    pub expected_end_epoch_ms: Option<u64>,
    #[serde(default)]
    pub remaining_seconds_at_pause: Option<u64>,
    #[serde(default)]
    pub completion_handled: bool,
    #[serde(default)]
    pub linked_task_id: String,
    #[serde(default)]
    pub linked_task_title: String,
    #[serde(default)]
    pub pending_notification_handle: Option<NotificationHandle>,
}

impl TimerState {
    /// A session that is ready to start but has no deadline yet.
    pub fn idle(index: usize, kind: SessionKind, duration_secs: u64, task: &TaskRef) -> Self {
        Self {
            session_sequence_index: index,
            session_kind: kind,
            planned_duration_seconds: duration_secs,
            run_status: RunStatus::Idle,
            started_at_epoch_ms: None,
            expected_end_epoch_ms: None,
            remaining_seconds_at_pause: None,
            completion_handled: false,
            linked_task_id: task.id.clone(),
            linked_task_title: task.title.clone(),
            pending_notification_handle: None,
        }
    }

    pub fn task(&self) -> TaskRef {
        TaskRef::new(self.linked_task_id.clone(), self.linked_task_title.clone())
    }

    pub fn is_running(&self) -> bool {
        self.run_status == RunStatus::Running
    }

    /// Running, not yet handled, and the deadline has passed.
    pub fn is_due(&self, now_ms: u64) -> bool {
        self.is_running()
            && !self.completion_handled
            && self.expected_end_epoch_ms.is_some_and(|end| now_ms >= end)
    }

    /// Whole seconds left, derived from the deadline while running.
    pub fn remaining_seconds(&self, now_ms: u64) -> u64 {
        match self.run_status {
            RunStatus::Running => self
                .expected_end_epoch_ms
                .map(|end| end.saturating_sub(now_ms) / 1000)
                .unwrap_or(0),
            RunStatus::Paused => self
                .remaining_seconds_at_pause
                .unwrap_or(self.planned_duration_seconds),
            RunStatus::Idle => self.planned_duration_seconds,
        }
    }

    /// Deadline present iff running; a pause snapshot only while paused.
    pub fn invariants_hold(&self) -> bool {
        let deadline_ok = self.expected_end_epoch_ms.is_some() == self.is_running();
        let pause_ok = self.remaining_seconds_at_pause.is_none()
            || self.run_status == RunStatus::Paused;
        deadline_ok && pause_ok
    }
}

/// Read-only view handed to renderers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub state: TimerState,
    pub remaining_seconds: u64,
    /// 0.0 .. 1.0 within the current session.
    pub progress: f64,
}

impl TimerSnapshot {
    pub fn of(state: &TimerState, now_ms: u64) -> Self {
        let remaining_seconds = state.remaining_seconds(now_ms);
        let total = state.planned_duration_seconds;
        let progress = if total == 0 || state.completion_handled {
            1.0
        } else {
            1.0 - (remaining_seconds.min(total) as f64 / total as f64)
        };
        Self {
            state: state.clone(),
            remaining_seconds,
            progress,
        }
    }
}
