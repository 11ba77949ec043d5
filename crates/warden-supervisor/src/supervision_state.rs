use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Whether failure events are dispatched to the registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisionState {
    Monitored,
    Unmonitored,
}

impl SupervisionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SupervisionState::Monitored => "monitored",
            SupervisionState::Unmonitored => "unmonitored",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            SupervisionState::Monitored => 0,
            SupervisionState::Unmonitored => 1,
        }
    }

    fn from_u8(raw: u8) -> Self {
        if raw == 0 {
            SupervisionState::Monitored
        } else {
            SupervisionState::Unmonitored
        }
    }
}

impl fmt::Display for SupervisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free cell holding one [`SupervisionState`]; starts monitored.
#[derive(Debug)]
pub struct AtomicSupervisionState {
    raw: AtomicU8,
}

impl Default for AtomicSupervisionState {
    fn default() -> Self {
        Self::new(SupervisionState::Monitored)
    }
}

impl AtomicSupervisionState {
    pub fn new(state: SupervisionState) -> Self {
        Self {
            raw: AtomicU8::new(state.to_u8()),
        }
    }

    pub fn load(&self) -> SupervisionState {
        SupervisionState::from_u8(self.raw.load(Ordering::SeqCst))
    }

    pub fn store(&self, state: SupervisionState) {
        self.raw.store(state.to_u8(), Ordering::SeqCst);
    }

    pub fn is_monitored(&self) -> bool {
        self.load() == SupervisionState::Monitored
    }
}
