//! Per-channel recording lifecycle states.

use serde::{Deserialize, Serialize};

/// Recording lifecycle state of a single channel.
///
/// `Idle` is both the initial and the terminal state; a channel cycles
/// through many sessions over its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No active session.
    #[default]
    Idle,
    /// A session is active and the capture backend is (being) started.
    Recording,
    /// A stop was requested and the session is being torn down.
    Stopping,
    /// The last capture attempt failed; a retry is pending.
    Error,
}

impl RecordingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Stopping => "stopping",
            Self::Error => "error",
        }
    }

    /// Numeric code exported to observability.
    pub fn code(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Recording => 1,
            Self::Stopping => 2,
            Self::Error => 3,
        }
    }

    /// Whether the lifecycle allows moving to `target`. Staying put is
    /// always allowed.
    pub fn can_transition_to(&self, target: RecordingState) -> bool {
        use RecordingState::*;

        match (self, target) {
            (from, to) if *from == to => true,
            (Idle, Recording) => true,
            (Recording, Stopping | Error | Idle) => true,
            (Error, Recording | Stopping | Idle) => true,
            (Stopping, Idle) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RecordingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
