use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};

/// Event label the shim reports for an unplanned process exit.
pub const PROCESS_FAILED_EVENT: &str = "pid failed";
/// Action label recorded on every alert raised by the failure listener.
pub const ALERT_ACTION_START: &str = "Start";
/// RFC 1123 with a numeric zone, e.g. `Mon, 02 Jan 2006 15:04:05 -0700`.
pub const ALERT_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Body a supervised process (or its shim) posts after an unplanned exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureEvent {
    pub event: String,
    pub process_name: String,
    pub exit_code: i64,
}

/// Normalized failure record handed to the job failure handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub service: String,
    pub event: String,
    pub action: String,
    pub date: String,
    pub description: String,
}

impl Alert {
    pub fn from_failure_event(event: FailureEvent) -> Self {
        Self::from_failure_event_at(event, &Local::now())
    }

    pub fn from_failure_event_at<Tz>(event: FailureEvent, at: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        Self {
            id: event.process_name.clone(),
            service: event.process_name,
            event: event.event,
            action: ALERT_ACTION_START.to_string(),
            date: at.format(ALERT_DATE_FORMAT).to_string(),
            description: format!("exited with code {}", event.exit_code),
        }
    }
}
