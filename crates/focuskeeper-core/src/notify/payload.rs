//! Structured notification payloads.
//!
//! On the wire a payload is a flat string map. `type` selects the variant;
//! keys this version does not know are ignored so newer senders stay
//! readable.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::timer::SessionKind;

pub type PayloadMap = BTreeMap<String, String>;

pub const KEY_TYPE: &str = "type";
pub const KEY_TASK_ID: &str = "taskId";
pub const KEY_TASK_TITLE: &str = "taskTitle";
pub const KEY_SESSION_KIND: &str = "sessionKind";
pub const KEY_SESSION_INDEX: &str = "sessionIndex";
pub const KEY_DEADLINE: &str = "expectedEndEpochMs";
pub const KEY_PROJECT_ID: &str = "projectId";

pub const TYPE_SESSION_COMPLETE: &str = "session_complete";
pub const TYPE_TASK_REMINDER: &str = "task_reminder";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload is missing '{0}'")]
    MissingKey(&'static str),
    #[error("unknown payload type '{0}'")]
    UnknownType(String),
    #[error("invalid value for '{key}': {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationPayload {
    SessionComplete {
        session_kind: SessionKind,
        task_id: String,
        task_title: String,
        /// Which session of the plan fired. Absent in older payloads.
        session_index: Option<usize>,
        /// Deadline the notification was scheduled for.
        expected_end_epoch_ms: Option<u64>,
    },
    TaskReminder {
        task_id: String,
        task_title: String,
        project_id: Option<String>,
    },
}

impl NotificationPayload {
    pub fn task_id(&self) -> &str {
        match self {
            NotificationPayload::SessionComplete { task_id, .. }
            | NotificationPayload::TaskReminder { task_id, .. } => task_id,
        }
    }

    pub fn to_map(&self) -> PayloadMap {
        let mut map = PayloadMap::new();
        match self {
            NotificationPayload::SessionComplete {
                session_kind,
                task_id,
                task_title,
                session_index,
                expected_end_epoch_ms,
            } => {
                map.insert(KEY_TYPE.into(), TYPE_SESSION_COMPLETE.into());
                map.insert(KEY_SESSION_KIND.into(), session_kind.as_str().into());
                map.insert(KEY_TASK_ID.into(), task_id.clone());
                map.insert(KEY_TASK_TITLE.into(), task_title.clone());
                if let Some(index) = session_index {
                    map.insert(KEY_SESSION_INDEX.into(), index.to_string());
                }
                if let Some(deadline) = expected_end_epoch_ms {
                    map.insert(KEY_DEADLINE.into(), deadline.to_string());
                }
            }
            NotificationPayload::TaskReminder {
                task_id,
                task_title,
                project_id,
            } => {
                map.insert(KEY_TYPE.into(), TYPE_TASK_REMINDER.into());
                map.insert(KEY_TASK_ID.into(), task_id.clone());
                map.insert(KEY_TASK_TITLE.into(), task_title.clone());
                if let Some(project) = project_id {
                    map.insert(KEY_PROJECT_ID.into(), project.clone());
                }
            }
        }
        map
    }

    pub fn from_map(map: &PayloadMap) -> Result<Self, PayloadError> {
        let kind = required(map, KEY_TYPE)?;
        match kind {
            TYPE_SESSION_COMPLETE => {
                let session_kind = required(map, KEY_SESSION_KIND)?;
                let session_kind =
                    session_kind
                        .parse::<SessionKind>()
                        .map_err(|_| PayloadError::InvalidValue {
                            key: KEY_SESSION_KIND,
                            value: session_kind.to_string(),
                        })?;
                Ok(NotificationPayload::SessionComplete {
                    session_kind,
                    task_id: required(map, KEY_TASK_ID)?.to_string(),
                    task_title: optional(map, KEY_TASK_TITLE).unwrap_or_default(),
                    session_index: parsed(map, KEY_SESSION_INDEX)?,
                    expected_end_epoch_ms: parsed(map, KEY_DEADLINE)?,
                })
            }
            TYPE_TASK_REMINDER => Ok(NotificationPayload::TaskReminder {
                task_id: required(map, KEY_TASK_ID)?.to_string(),
                task_title: optional(map, KEY_TASK_TITLE).unwrap_or_default(),
                project_id: optional(map, KEY_PROJECT_ID),
            }),
            other => Err(PayloadError::UnknownType(other.to_string())),
        }
    }
}

fn required<'a>(map: &'a PayloadMap, key: &'static str) -> Result<&'a str, PayloadError> {
    map.get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or(PayloadError::MissingKey(key))
}

fn optional(map: &PayloadMap, key: &str) -> Option<String> {
    map.get(key).filter(|v| !v.is_empty()).cloned()
}

fn parsed<T: std::str::FromStr>(
    map: &PayloadMap,
    key: &'static str,
) -> Result<Option<T>, PayloadError> {
    match map.get(key).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| PayloadError::InvalidValue {
                key,
                value: raw.clone(),
            }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> PayloadMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn session_complete_uses_documented_keys() {
        let payload = NotificationPayload::SessionComplete {
            session_kind: SessionKind::Focus,
            task_id: "7".into(),
            task_title: "Write report".into(),
            session_index: Some(2),
            expected_end_epoch_ms: Some(1_700_000_000_000),
        };
        let encoded = payload.to_map();
        assert_eq!(encoded["type"], "session_complete");
        assert_eq!(encoded["sessionKind"], "focus");
        assert_eq!(encoded["taskId"], "7");
        assert_eq!(NotificationPayload::from_map(&encoded), Ok(payload));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let decoded = NotificationPayload::from_map(&map(&[
            ("type", "task_reminder"),
            ("taskId", "42"),
            ("projectId", "p-1"),
            ("badgeColor", "#ff0000"),
        ]))
        .unwrap();
        assert_eq!(
            decoded,
            NotificationPayload::TaskReminder {
                task_id: "42".into(),
                task_title: String::new(),
                project_id: Some("p-1".into()),
            }
        );
    }

    #[test]
    fn older_session_payload_without_index_decodes() {
        let decoded = NotificationPayload::from_map(&map(&[
            ("type", "session_complete"),
            ("sessionKind", "short_break"),
            ("taskId", "7"),
            ("taskTitle", "Write"),
        ]))
        .unwrap();
        assert!(matches!(
            decoded,
            NotificationPayload::SessionComplete {
                session_index: None,
                expected_end_epoch_ms: None,
                ..
            }
        ));
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert_eq!(
            NotificationPayload::from_map(&map(&[("taskId", "7")])),
            Err(PayloadError::MissingKey("type"))
        );
        assert_eq!(
            NotificationPayload::from_map(&map(&[("type", "promo")])),
            Err(PayloadError::UnknownType("promo".into()))
        );
        assert!(matches!(
            NotificationPayload::from_map(&map(&[
                ("type", "session_complete"),
                ("sessionKind", "nap"),
                ("taskId", "7"),
            ])),
            Err(PayloadError::InvalidValue { key: "sessionKind", .. })
        ));
    }
}
