use serde::{Deserialize, Serialize};
use warden_core::{LockError, LockResult, OwnerToken};

/// Observable lifecycle state of a lock handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    /// No hold and no operation in flight.
    Unlocked,
    /// An acquisition attempt is in flight.
    Acquiring,
    /// At least one owner holds the lock through this handle.
    Held,
    /// A release is in flight.
    Releasing,
}

impl LockState {
    /// Returns stable state value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unlocked => "unlocked",
            Self::Acquiring => "acquiring",
            Self::Held => "held",
            Self::Releasing => "releasing",
        }
    }

    /// Parses state value.
    pub fn parse(value: &str) -> LockResult<Self> {
        match value {
            "unlocked" => Ok(Self::Unlocked),
            "acquiring" => Ok(Self::Acquiring),
            "held" => Ok(Self::Held),
            "releasing" => Ok(Self::Releasing),
            _ => Err(LockError::Validation(format!("unknown lock state '{value}'"))),
        }
    }
}

/// Result of one acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The lock is held by the given owner.
    Acquired(OwnerToken),
    /// The wait budget ran out before the lock was granted.
    TimedOut,
    /// A quorum composite gathered fewer members than required.
    QuorumNotReached {
        /// Members acquired before the attempt was abandoned.
        acquired: usize,
        /// Members required for the quorum.
        required: usize,
    },
}
