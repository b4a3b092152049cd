use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{
    CancelOutcome, NotificationGateway, NotificationHandle, NotificationOptions, PayloadMap,
};
use crate::error::GatewayError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub handle: NotificationHandle,
    pub title: String,
    pub body: String,
    pub data: PayloadMap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduled {
    pub at_epoch_ms: u64,
    pub title: String,
    pub body: String,
    pub payload: PayloadMap,
}

#[derive(Debug, Default)]
struct Inner {
    shown: Vec<Delivered>,
    scheduled: BTreeMap<NotificationHandle, Scheduled>,
    fired: Vec<Delivered>,
    cancelled: Vec<NotificationHandle>,
    failing: bool,
}

/// In-memory gateway that records every call.
///
/// Clones share state, so a test can hand one clone to the service and
/// inspect the other. [`RecordingGateway::fire_due`] plays the OS role of
/// delivering scheduled notifications whose time has come.
#[derive(Debug, Clone, Default)]
pub struct RecordingGateway {
    inner: Arc<Mutex<Inner>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    pub fn shown(&self) -> Vec<Delivered> {
        self.lock().shown.clone()
    }

    pub fn scheduled(&self) -> Vec<(NotificationHandle, Scheduled)> {
        self.lock()
            .scheduled
            .iter()
            .map(|(h, s)| (h.clone(), s.clone()))
            .collect()
    }

    pub fn cancelled(&self) -> Vec<NotificationHandle> {
        self.lock().cancelled.clone()
    }

    pub fn fired(&self) -> Vec<Delivered> {
        self.lock().fired.clone()
    }

    /// Deliver every scheduled notification due at `now_ms`.
    pub fn fire_due(&self, now_ms: u64) -> Vec<Delivered> {
        let mut inner = self.lock();
        let due: Vec<NotificationHandle> = inner
            .scheduled
            .iter()
            .filter(|(_, s)| s.at_epoch_ms <= now_ms)
            .map(|(h, _)| h.clone())
            .collect();

        let mut delivered = Vec::with_capacity(due.len());
        for handle in due {
            if let Some(s) = inner.scheduled.remove(&handle) {
                delivered.push(Delivered {
                    handle,
                    title: s.title,
                    body: s.body,
                    data: s.payload,
                });
            }
        }
        inner.fired.extend(delivered.iter().cloned());
        delivered
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl NotificationGateway for RecordingGateway {
    fn show_now(
        &mut self,
        title: &str,
        body: &str,
        options: &NotificationOptions,
    ) -> Result<NotificationHandle, GatewayError> {
        let mut inner = self.lock();
        if inner.failing {
            return Err(GatewayError::Unavailable("recording gateway set to fail".into()));
        }
        let handle = NotificationHandle::generate();
        inner.shown.push(Delivered {
            handle: handle.clone(),
            title: title.to_string(),
            body: body.to_string(),
            data: options.data.clone(),
        });
        Ok(handle)
    }

    fn schedule_at(
        &mut self,
        epoch_ms: u64,
        title: &str,
        body: &str,
        payload: &PayloadMap,
    ) -> Result<NotificationHandle, GatewayError> {
        let mut inner = self.lock();
        if inner.failing {
            return Err(GatewayError::Unavailable("recording gateway set to fail".into()));
        }
        let handle = NotificationHandle::generate();
        inner.scheduled.insert(
            handle.clone(),
            Scheduled {
                at_epoch_ms: epoch_ms,
                title: title.to_string(),
                body: body.to_string(),
                payload: payload.clone(),
            },
        );
        Ok(handle)
    }

    fn cancel(&mut self, handle: &NotificationHandle) -> Result<CancelOutcome, GatewayError> {
        let mut inner = self.lock();
        if inner.failing {
            return Err(GatewayError::Unavailable("recording gateway set to fail".into()));
        }
        if inner.scheduled.remove(handle).is_some() {
            inner.cancelled.push(handle.clone());
            return Ok(CancelOutcome::Cancelled);
        }
        if inner.fired.iter().any(|d| &d.handle == handle) {
            return Ok(CancelOutcome::AlreadyDelivered);
        }
        Err(GatewayError::UnknownHandle(handle.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fire_due_delivers_only_past_deadlines() {
        let mut gateway = RecordingGateway::new();
        gateway.schedule_at(1_000, "a", "", &PayloadMap::new()).unwrap();
        gateway.schedule_at(5_000, "b", "", &PayloadMap::new()).unwrap();

        let fired = gateway.fire_due(2_000);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].title, "a");
        assert_eq!(gateway.scheduled().len(), 1);
    }

    #[test]
    fn cancelled_notification_never_fires() {
        let mut gateway = RecordingGateway::new();
        let handle = gateway.schedule_at(1_000, "a", "", &PayloadMap::new()).unwrap();
        assert_eq!(gateway.cancel(&handle).unwrap(), CancelOutcome::Cancelled);
        assert!(gateway.fire_due(10_000).is_empty());
        assert_eq!(gateway.cancelled(), vec![handle]);
    }

    #[test]
    fn cancel_tells_fired_from_never_scheduled() {
        let mut gateway = RecordingGateway::new();
        let handle = gateway.schedule_at(1_000, "a", "", &PayloadMap::new()).unwrap();
        gateway.fire_due(1_000);
        assert_eq!(gateway.cancel(&handle).unwrap(), CancelOutcome::AlreadyDelivered);

        let stranger = NotificationHandle::generate();
        assert!(matches!(
            gateway.cancel(&stranger),
            Err(GatewayError::UnknownHandle(_))
        ));
        assert!(gateway.cancelled().is_empty());
    }

    #[test]
    fn failing_gateway_reports_errors() {
        let mut gateway = RecordingGateway::new();
        gateway.set_failing(true);
        assert!(gateway
            .show_now("t", "b", &NotificationOptions::default())
            .is_err());
        assert!(gateway.shown().is_empty());
    }
}
