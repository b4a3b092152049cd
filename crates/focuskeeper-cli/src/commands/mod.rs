pub mod config;
pub mod daemon;
pub mod notification;
pub mod timer;

use std::sync::Arc;

use focuskeeper_core::{
    Config, DesktopGateway, SessionTimerService, SqliteBackend, SystemClock, TimerStore,
};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Build a service over the on-disk record and catch up with the wall clock.
///
/// One-shot commands exit right away, so they cannot keep a backstop
/// notification alive; notifications are left to the daemon.
pub fn open_service() -> Result<SessionTimerService, Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let backend = SqliteBackend::open_default()?;
    let gateway = DesktopGateway::new(config.notifications.app_name.clone());
    let mut service = SessionTimerService::from_config(
        &config,
        TimerStore::new(backend),
        gateway,
        Arc::new(SystemClock),
    )
    .with_notifications(false);

    if let Some(outcome) = service.restore() {
        eprintln!(
            "session completed while away: {}",
            serde_json::to_string(&outcome.event)?
        );
    }
    Ok(service)
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
