//! Shared primitives for all Rust crates in Warden.

#![forbid(unsafe_code)]

/// Owner tokens that fence lock ownership.
pub mod token;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use token::OwnerToken;

/// Result type used across Warden crates.
pub type LockResult<T> = Result<T, LockError>;

/// A validated lock key name.
///
/// Names identify one critical section in the shared store and must not be
/// empty or whitespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LockName(String);

impl LockName {
    /// Creates a validated lock name.
    pub fn new(value: impl Into<String>) -> LockResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(LockError::Validation(
                "lock name must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for LockName {
    type Error = LockError;

    fn try_from(value: String) -> LockResult<Self> {
        Self::new(value)
    }
}

impl From<LockName> for String {
    fn from(value: LockName) -> Self {
        value.0
    }
}

impl Display for LockName {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Lock coordination error categories.
#[derive(Debug, Error)]
pub enum LockError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Wait budget exhausted before the lock was obtained.
    #[error("lock acquisition timed out: {0}")]
    AcquisitionTimeout(String),

    /// Quorum composite could not gather a majority of its members.
    #[error("lock quorum not reached for {name}: acquired {acquired} of {required} required")]
    QuorumNotReached {
        /// Logical name of the critical section.
        name: String,
        /// Members acquired before the attempt was abandoned.
        acquired: usize,
        /// Members required for the quorum.
        required: usize,
    },

    /// Transport-level failure talking to the lock store.
    #[error("lock store unavailable: {0}")]
    StoreUnavailable(String),

    /// Releasing a held lock failed. Logged, never returned by the executor.
    #[error("lock release failed: {0}")]
    ReleaseFailed(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LockError {
    /// Returns true when the error reports contention rather than a failure.
    #[must_use]
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            Self::AcquisitionTimeout(_) | Self::QuorumNotReached { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{LockError, LockName};

    #[test]
    fn lock_name_rejects_whitespace() {
        let result = LockName::new("   ");
        assert!(matches!(result, Err(LockError::Validation(_))));
    }

    #[test]
    fn lock_names_order_lexicographically() {
        let alpha = LockName::new("alpha").unwrap_or_else(|_| unreachable!());
        let beta = LockName::new("beta").unwrap_or_else(|_| unreachable!());
        assert!(alpha < beta);
        assert_eq!(alpha.to_string(), "alpha");
    }

    #[test]
    fn contention_errors_are_distinct_from_store_failures() {
        assert!(LockError::AcquisitionTimeout("orders".to_owned()).is_contention());
        assert!(
            LockError::QuorumNotReached {
                name: "orders".to_owned(),
                acquired: 1,
                required: 2,
            }
            .is_contention()
        );
        assert!(!LockError::StoreUnavailable("connection refused".to_owned()).is_contention());
    }
}
