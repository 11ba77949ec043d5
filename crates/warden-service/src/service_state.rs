use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse run state of one native service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Stopped,
    StartPending,
    StopPending,
    Running,
    ContinuePending,
    PausePending,
    Paused,
}

impl ServiceState {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceState::Stopped => "stopped",
            ServiceState::StartPending => "starting",
            ServiceState::StopPending => "stop_pending",
            ServiceState::Running => "running",
            ServiceState::ContinuePending => "continue_pending",
            ServiceState::PausePending => "pause_pending",
            ServiceState::Paused => "paused",
        }
    }

    pub fn is_running(self) -> bool {
        matches!(self, ServiceState::Running)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub state: ServiceState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_service_state_labels_cover_every_variant() {
        let labels: Vec<&str> = [
            ServiceState::Running,
            ServiceState::StartPending,
            ServiceState::StopPending,
            ServiceState::ContinuePending,
            ServiceState::PausePending,
            ServiceState::Paused,
            ServiceState::Stopped,
        ]
        .into_iter()
        .map(ServiceState::as_str)
        .collect();
        assert_eq!(
            labels,
            vec![
                "running",
                "starting",
                "stop_pending",
                "continue_pending",
                "pause_pending",
                "paused",
                "stopped"
            ]
        );
    }
}
