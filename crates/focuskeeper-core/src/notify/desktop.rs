use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{
    CancelOutcome, GatewayActivation, NotificationGateway, NotificationHandle,
    NotificationOptions, PayloadMap,
};
use crate::clock::{Clock, SystemClock};
use crate::error::GatewayError;

struct Pending {
    task: JoinHandle<()>,
    fired: Arc<AtomicBool>,
    payload: PayloadMap,
}

/// Presents notifications through the desktop notification daemon.
///
/// Scheduled notifications are tokio tasks sleeping until their deadline,
/// so they only fire while this process is alive. A fired one stays tracked
/// until cancelled, which then reports it as delivered. Scheduling outside a
/// runtime reports [`GatewayError::NoRuntime`].
///
/// With [`DesktopGateway::with_activations`], taps and dismissals on hosts
/// that report notification actions are sent back with the original payload.
pub struct DesktopGateway {
    app_name: String,
    scheduled: HashMap<NotificationHandle, Pending>,
    activations: Option<UnboundedSender<GatewayActivation>>,
}

impl DesktopGateway {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            scheduled: HashMap::new(),
            activations: None,
        }
    }

    pub fn with_activations(mut self, sender: UnboundedSender<GatewayActivation>) -> Self {
        self.activations = Some(sender);
        self
    }

    pub fn pending_count(&self) -> usize {
        self.scheduled
            .values()
            .filter(|p| !p.fired.load(Ordering::Acquire))
            .count()
    }

    /// Payload a scheduled notification was created with.
    pub fn payload(&self, handle: &NotificationHandle) -> Option<&PayloadMap> {
        self.scheduled.get(handle).map(|p| &p.payload)
    }
}

struct Presentation<'a> {
    app_name: &'a str,
    title: &'a str,
    body: &'a str,
    data: &'a PayloadMap,
    silent: bool,
}

impl Presentation<'_> {
    fn show(
        &self,
        handle: &NotificationHandle,
        activations: Option<&UnboundedSender<GatewayActivation>>,
    ) -> Result<(), GatewayError> {
        let mut notification = notify_rust::Notification::new();
        notification
            .summary(self.title)
            .body(self.body)
            .appname(self.app_name);
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            use notify_rust::Hint;
            notification.action("default", "Open");
            for (key, value) in self.data {
                notification.hint(Hint::Custom(key.clone(), value.clone()));
            }
            if self.silent {
                notification.hint(Hint::SuppressSound(true));
            }
        }
        let shown = notification
            .show()
            .map_err(|e| GatewayError::PresentFailed(e.to_string()))?;
        if let Some(sender) = activations {
            watch_actions(shown, handle.clone(), self.data.clone(), sender.clone());
        }
        Ok(())
    }
}

/// Waits on the notification daemon's action signal off the runtime.
#[cfg(all(unix, not(target_os = "macos")))]
fn watch_actions(
    shown: notify_rust::NotificationHandle,
    handle: NotificationHandle,
    data: PayloadMap,
    sender: UnboundedSender<GatewayActivation>,
) {
    std::thread::spawn(move || {
        shown.wait_for_action(|action| {
            let activation = match action {
                "__closed" => GatewayActivation::Dismissed { handle, data },
                _ => GatewayActivation::Tapped { handle, data },
            };
            if sender.send(activation).is_err() {
                debug!("notification activation has no receiver");
            }
        });
    });
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
fn watch_actions<S>(
    _shown: S,
    _handle: NotificationHandle,
    _data: PayloadMap,
    _sender: UnboundedSender<GatewayActivation>,
) {
}

impl NotificationGateway for DesktopGateway {
    fn show_now(
        &mut self,
        title: &str,
        body: &str,
        options: &NotificationOptions,
    ) -> Result<NotificationHandle, GatewayError> {
        let handle = NotificationHandle::generate();
        Presentation {
            app_name: &self.app_name,
            title,
            body,
            data: &options.data,
            silent: options.silent,
        }
        .show(&handle, self.activations.as_ref())?;
        Ok(handle)
    }

    fn schedule_at(
        &mut self,
        epoch_ms: u64,
        title: &str,
        body: &str,
        payload: &PayloadMap,
    ) -> Result<NotificationHandle, GatewayError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| GatewayError::NoRuntime)?;

        let delay = Duration::from_millis(epoch_ms.saturating_sub(SystemClock.now_ms()));
        let app_name = self.app_name.clone();
        let title = title.to_string();
        let body = body.to_string();
        let data = payload.clone();
        let activations = self.activations.clone();
        let handle = NotificationHandle::generate();
        let task_handle = handle.clone();
        let fired = Arc::new(AtomicBool::new(false));
        let task_fired = Arc::clone(&fired);

        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            task_fired.store(true, Ordering::Release);
            let presentation = Presentation {
                app_name: &app_name,
                title: &title,
                body: &body,
                data: &data,
                silent: false,
            };
            if let Err(e) = presentation.show(&task_handle, activations.as_ref()) {
                warn!(handle = %task_handle, "scheduled notification failed: {e}");
            }
        });
        debug!(%handle, delay_ms = delay.as_millis() as u64, "notification scheduled");
        self.scheduled.insert(
            handle.clone(),
            Pending {
                task,
                fired,
                payload: payload.clone(),
            },
        );
        Ok(handle)
    }

    fn cancel(&mut self, handle: &NotificationHandle) -> Result<CancelOutcome, GatewayError> {
        let pending = self
            .scheduled
            .remove(handle)
            .ok_or_else(|| GatewayError::UnknownHandle(handle.to_string()))?;
        if pending.fired.load(Ordering::Acquire) {
            debug!(%handle, "notification already delivered");
            return Ok(CancelOutcome::AlreadyDelivered);
        }
        pending.task.abort();
        debug!(%handle, "notification cancelled");
        Ok(CancelOutcome::Cancelled)
    }
}

impl Drop for DesktopGateway {
    fn drop(&mut self) {
        for (_, pending) in self.scheduled.drain() {
            pending.task.abort();
        }
    }
}
