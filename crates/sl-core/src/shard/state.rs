use serde::{Deserialize, Serialize};

/// Receiver-side lifecycle of a shard
///
/// State transitions:
/// ```text
///   Waiting
///    │ pairing code confirmed by operator
///    ▼
///   Verifying ── persisted ok ──► Saved
///    │
///    └── persist failed ────────► SaveFailed ── restart ──► Waiting
/// ```
///
/// Disconnection in a non-terminal state is reported as a failure by the
/// receiver; it never advances the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShardPersistentState {
    /// Channel established, pairing code not yet confirmed
    #[default]
    Waiting,

    /// Pairing code confirmed; awaiting and checking the shard
    Verifying,

    /// Shard persisted by the storage collaborator
    Saved,

    /// Persistence failed; the whole pairing must be retried
    SaveFailed,
}

impl ShardPersistentState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Saved | Self::SaveFailed)
    }

    pub fn on_code_confirmed(self) -> Option<Self> {
        match self {
            Self::Waiting => Some(Self::Verifying),
            _ => None,
        }
    }

    pub fn on_persisted(self, success: bool) -> Option<Self> {
        match self {
            Self::Verifying if success => Some(Self::Saved),
            Self::Verifying => Some(Self::SaveFailed),
            _ => None,
        }
    }

    /// A failed save is retried from the start of the pairing.
    pub fn restart(self) -> Option<Self> {
        match self {
            Self::SaveFailed => Some(Self::Waiting),
            _ => None,
        }
    }
}
