use serde::{Deserialize, Serialize};

use super::state::SessionKind;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedSession {
    pub kind: SessionKind,
    pub duration_secs: u64,
    #[serde(default)]
    pub label: String,
}

impl PlannedSession {
    pub fn minutes(kind: SessionKind, minutes: u64, label: impl Into<String>) -> Self {
        Self {
            kind,
            duration_secs: minutes.saturating_mul(60),
            label: label.into(),
        }
    }
}

/// Ordered plan of sessions for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPlan {
    sessions: Vec<PlannedSession>,
}

impl SessionPlan {
    /// # Errors
    /// Returns an error if the plan is empty or a session has zero length.
    pub fn new(sessions: Vec<PlannedSession>) -> Result<Self, ConfigError> {
        if sessions.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "plan".into(),
                message: "a plan needs at least one session".into(),
            });
        }
        if let Some(pos) = sessions.iter().position(|s| s.duration_secs == 0) {
            return Err(ConfigError::InvalidValue {
                key: format!("plan[{pos}]"),
                message: "session duration must be greater than zero".into(),
            });
        }
        Ok(Self { sessions })
    }

    /// Focus / short break pairs, ending on a long break.
    pub fn classic(focus_min: u64, short_break_min: u64, long_break_min: u64, rounds: u32) -> Self {
        let rounds = rounds.max(1);
        let mut sessions = Vec::with_capacity(rounds as usize * 2);
        for i in 0..rounds {
            sessions.push(PlannedSession::minutes(
                SessionKind::Focus,
                focus_min.max(1),
                format!("Focus {}", i + 1),
            ));
            if i + 1 == rounds {
                sessions.push(PlannedSession::minutes(
                    SessionKind::LongBreak,
                    long_break_min.max(1),
                    "Long Break",
                ));
            } else {
                sessions.push(PlannedSession::minutes(
                    SessionKind::ShortBreak,
                    short_break_min.max(1),
                    "Short Break",
                ));
            }
        }
        Self { sessions }
    }

    pub fn get(&self, index: usize) -> Option<&PlannedSession> {
        self.sessions.get(index)
    }

    pub fn sessions(&self) -> &[PlannedSession] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn total_duration_secs(&self) -> u64 {
        self.sessions.iter().map(|s| s.duration_secs).sum()
    }

    pub fn focus_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|s| s.kind == SessionKind::Focus)
            .count()
    }
}

impl Default for SessionPlan {
    fn default() -> Self {
        Self::classic(25, 5, 15, 4)
    }
}
