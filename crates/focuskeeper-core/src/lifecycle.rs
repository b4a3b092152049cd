//! Host foreground/background observer.
//!
//! Hosts report more than two states (mobile runtimes distinguish "active",
//! "inactive" and "background"). They are normalised to [`AppLifecycle`]:
//! only `active` counts as foreground.
//!
//! Debounce: a transition arriving within `debounce_ms` of the previous
//! published one is held as pending. It is published by [`LifecycleObserver::settle`]
//! once the window has passed, or dropped if the host flaps back first.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

use crate::observer::{Listeners, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppLifecycle {
    Foreground,
    Background,
}

/// Raw host signal before normalisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawLifecycleSignal {
    Active,
    Inactive,
    Background,
}

impl RawLifecycleSignal {
    pub fn normalize(self) -> AppLifecycle {
        match self {
            RawLifecycleSignal::Active => AppLifecycle::Foreground,
            RawLifecycleSignal::Inactive | RawLifecycleSignal::Background => {
                AppLifecycle::Background
            }
        }
    }
}

impl FromStr for RawLifecycleSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" | "foreground" | "resumed" => Ok(RawLifecycleSignal::Active),
            "inactive" | "paused" => Ok(RawLifecycleSignal::Inactive),
            "background" | "hidden" | "suspended" => Ok(RawLifecycleSignal::Background),
            other => Err(format!("unknown lifecycle signal: {other}")),
        }
    }
}

#[derive(Debug)]
pub struct LifecycleObserver {
    current: AppLifecycle,
    last_transition_ms: Option<u64>,
    pending: Option<AppLifecycle>,
    debounce_ms: u64,
    listeners: Listeners<AppLifecycle>,
}

impl LifecycleObserver {
    pub fn new(initial: AppLifecycle, debounce_ms: u64) -> Self {
        Self {
            current: initial,
            last_transition_ms: None,
            pending: None,
            debounce_ms,
            listeners: Listeners::new(),
        }
    }

    pub fn current(&self) -> AppLifecycle {
        self.current
    }

    /// What the host last reported, including a transition still held by
    /// the debounce window.
    pub fn latest(&self) -> AppLifecycle {
        self.pending.unwrap_or(self.current)
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&AppLifecycle) + Send + 'static,
    {
        self.listeners.subscribe(callback)
    }

    /// Feed a host signal. Returns the transition if one was published.
    pub fn on_raw_signal(&mut self, raw: RawLifecycleSignal, now_ms: u64) -> Option<AppLifecycle> {
        let target = raw.normalize();
        if target == self.current {
            if self.pending.take().is_some() {
                debug!(?target, "lifecycle flap absorbed");
            }
            return None;
        }

        if self.within_window(now_ms) {
            debug!(?target, "lifecycle transition deferred");
            self.pending = Some(target);
            return None;
        }

        Some(self.transition(target, now_ms))
    }

    /// Publish a deferred transition whose debounce window has elapsed.
    pub fn settle(&mut self, now_ms: u64) -> Option<AppLifecycle> {
        let target = self.pending?;
        if self.within_window(now_ms) {
            return None;
        }
        self.pending = None;
        if target == self.current {
            return None;
        }
        Some(self.transition(target, now_ms))
    }

    fn within_window(&self, now_ms: u64) -> bool {
        self.last_transition_ms
            .is_some_and(|last| now_ms.saturating_sub(last) < self.debounce_ms)
    }

    fn transition(&mut self, target: AppLifecycle, now_ms: u64) -> AppLifecycle {
        debug!(from = ?self.current, to = ?target, "lifecycle transition");
        self.current = target;
        self.pending = None;
        self.last_transition_ms = Some(now_ms);
        self.listeners.notify(&target);
        target
    }
}

impl Default for LifecycleObserver {
    fn default() -> Self {
        Self::new(AppLifecycle::Foreground, 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn inactive_and_background_both_normalise_to_background() {
        assert_eq!(RawLifecycleSignal::Inactive.normalize(), AppLifecycle::Background);
        assert_eq!(RawLifecycleSignal::Background.normalize(), AppLifecycle::Background);
        assert_eq!("active".parse(), Ok(RawLifecycleSignal::Active));
    }

    #[test]
    fn repeated_signal_is_not_republished() {
        let mut observer = LifecycleObserver::new(AppLifecycle::Foreground, 500);
        assert_eq!(observer.on_raw_signal(RawLifecycleSignal::Active, 0), None);
        assert_eq!(
            observer.on_raw_signal(RawLifecycleSignal::Background, 0),
            Some(AppLifecycle::Background)
        );
        assert_eq!(observer.on_raw_signal(RawLifecycleSignal::Inactive, 2_000), None);
    }

    #[test]
    fn rapid_flap_is_absorbed() {
        let mut observer = LifecycleObserver::new(AppLifecycle::Foreground, 500);
        observer.on_raw_signal(RawLifecycleSignal::Background, 1_000);
        assert_eq!(observer.on_raw_signal(RawLifecycleSignal::Active, 1_100), None);
        assert_eq!(observer.on_raw_signal(RawLifecycleSignal::Background, 1_200), None);
        assert_eq!(observer.settle(1_600), None);
        assert_eq!(observer.current(), AppLifecycle::Background);
    }

    #[test]
    fn deferred_transition_settles_after_window() {
        let mut observer = LifecycleObserver::new(AppLifecycle::Foreground, 500);
        observer.on_raw_signal(RawLifecycleSignal::Background, 1_000);
        assert_eq!(observer.on_raw_signal(RawLifecycleSignal::Active, 1_100), None);
        assert_eq!(observer.settle(1_400), None);
        assert_eq!(observer.settle(1_500), Some(AppLifecycle::Foreground));
        assert_eq!(observer.current(), AppLifecycle::Foreground);
    }

    #[test]
    fn latest_includes_held_transition() {
        let mut observer = LifecycleObserver::new(AppLifecycle::Foreground, 500);
        observer.on_raw_signal(RawLifecycleSignal::Background, 1_000);
        observer.on_raw_signal(RawLifecycleSignal::Active, 1_100);
        assert_eq!(observer.current(), AppLifecycle::Background);
        assert_eq!(observer.latest(), AppLifecycle::Foreground);

        assert_eq!(observer.settle(1_600), Some(AppLifecycle::Foreground));
        assert_eq!(observer.latest(), observer.current());
    }

    #[test]
    fn subscribers_see_published_transitions_only() {
        let mut observer = LifecycleObserver::new(AppLifecycle::Foreground, 500);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = observer.subscribe(move |state| sink.lock().unwrap().push(*state));

        observer.on_raw_signal(RawLifecycleSignal::Background, 0);
        observer.on_raw_signal(RawLifecycleSignal::Active, 100);
        observer.settle(600);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![AppLifecycle::Background, AppLifecycle::Foreground]
        );
    }
}
