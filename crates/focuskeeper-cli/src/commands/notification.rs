use clap::Subcommand;
use focuskeeper_core::notify::PayloadMap;

use super::{open_service, print_json, CliResult};

#[derive(Subcommand)]
pub enum NotificationAction {
    /// Deliver a notification tap
    Tap {
        /// Payload entry as key=value (repeatable)
        #[arg(long = "payload", value_parser = parse_pair)]
        payload: Vec<(String, String)>,
    },
    /// Deliver a notification dismissal
    Dismiss {
        #[arg(long = "payload", value_parser = parse_pair)]
        payload: Vec<(String, String)>,
    },
}

pub fn parse_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

pub fn run(action: NotificationAction) -> CliResult {
    let mut service = open_service()?;
    match action {
        NotificationAction::Tap { payload } => {
            let data: PayloadMap = payload.into_iter().collect();
            let outcome = service.on_notification_tap(&data);
            print_json(&serde_json::json!({
                "completed": outcome.completion.map(|c| c.event),
                "navigation": outcome.navigation,
            }))
        }
        NotificationAction::Dismiss { payload } => {
            let data: PayloadMap = payload.into_iter().collect();
            service.on_notification_dismiss(&data);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pair_splits_on_first_equals() {
        assert_eq!(
            parse_pair("taskTitle=a=b"),
            Ok(("taskTitle".to_string(), "a=b".to_string()))
        );
        assert!(parse_pair("novalue").is_err());
        assert!(parse_pair("=x").is_err());
    }
}
