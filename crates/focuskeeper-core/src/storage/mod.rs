mod config;
pub mod database;

pub use config::{Config, NotificationsConfig, ScheduleConfig, TimerConfig};
pub use database::Database;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/focuskeeper[-dev]/` based on FOCUSKEEPER_ENV.
///
/// Set FOCUSKEEPER_ENV=dev to use the development data directory, or
/// FOCUSKEEPER_DATA_DIR to point somewhere else entirely.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("FOCUSKEEPER_DATA_DIR") {
        Some(explicit) => PathBuf::from(explicit),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env =
                std::env::var("FOCUSKEEPER_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("focuskeeper-dev")
            } else {
                base_dir.join("focuskeeper")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::LoadFailed {
        path: dir.clone(),
        message: e.to_string(),
    })?;
    Ok(dir)
}
