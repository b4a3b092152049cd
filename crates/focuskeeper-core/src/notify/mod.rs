//! Local notification gateway.
//!
//! The gateway presents OS-level notifications now or at a wall-clock
//! instant, and cancels them. A gateway failure never blocks the timer state
//! machine; callers log it and carry on with degraded feedback.

mod desktop;
mod payload;
mod recording;

pub use desktop::DesktopGateway;
pub use payload::{
    NotificationPayload, PayloadError, PayloadMap, KEY_DEADLINE, KEY_PROJECT_ID, KEY_SESSION_INDEX,
    KEY_SESSION_KIND, KEY_TASK_ID, KEY_TASK_TITLE, KEY_TYPE, TYPE_SESSION_COMPLETE,
    TYPE_TASK_REMINDER,
};
pub use recording::{Delivered, RecordingGateway, Scheduled};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GatewayError;

/// Reference to a shown or scheduled notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationHandle(String);

impl NotificationHandle {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for NotificationHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for NotificationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationOptions {
    /// Round-tripped to the tap handler untouched.
    pub data: PayloadMap,
    pub silent: bool,
}

impl NotificationOptions {
    pub fn with_data(data: PayloadMap) -> Self {
        Self {
            data,
            silent: false,
        }
    }
}

/// What a successful [`NotificationGateway::cancel`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The notification was still pending and will not be presented.
    Cancelled,
    /// Its time already came; the OS has it.
    AlreadyDelivered,
}

/// User interaction with a presented notification, reported by gateways
/// that can observe it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayActivation {
    Tapped {
        handle: NotificationHandle,
        data: PayloadMap,
    },
    Dismissed {
        handle: NotificationHandle,
        data: PayloadMap,
    },
}

pub trait NotificationGateway: Send {
    fn show_now(
        &mut self,
        title: &str,
        body: &str,
        options: &NotificationOptions,
    ) -> Result<NotificationHandle, GatewayError>;

    fn schedule_at(
        &mut self,
        epoch_ms: u64,
        title: &str,
        body: &str,
        payload: &PayloadMap,
    ) -> Result<NotificationHandle, GatewayError>;

    /// Withdraw a scheduled notification.
    ///
    /// [`GatewayError::UnknownHandle`] means this gateway never scheduled the
    /// handle (for example, a previous process did), not that it fired.
    fn cancel(&mut self, handle: &NotificationHandle) -> Result<CancelOutcome, GatewayError>;
}

impl<G: NotificationGateway + ?Sized> NotificationGateway for Box<G> {
    fn show_now(
        &mut self,
        title: &str,
        body: &str,
        options: &NotificationOptions,
    ) -> Result<NotificationHandle, GatewayError> {
        (**self).show_now(title, body, options)
    }

    fn schedule_at(
        &mut self,
        epoch_ms: u64,
        title: &str,
        body: &str,
        payload: &PayloadMap,
    ) -> Result<NotificationHandle, GatewayError> {
        (**self).schedule_at(epoch_ms, title, body, payload)
    }

    fn cancel(&mut self, handle: &NotificationHandle) -> Result<CancelOutcome, GatewayError> {
        (**self).cancel(handle)
    }
}
