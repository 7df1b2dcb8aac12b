use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{LockError, LockResult};

const TOKEN_MASK: u64 = i64::MAX as u64;

/// Opaque proof of which acquisition attempt holds a lock.
///
/// Tokens are random 63-bit values so they stay positive when a store
/// interprets them as signed integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerToken(u64);

impl OwnerToken {
    /// Generates a random token from the operating system RNG.
    pub fn generate() -> LockResult<Self> {
        let mut bytes = [0u8; 8];
        getrandom::fill(&mut bytes)
            .map_err(|error| LockError::Internal(format!("failed to generate owner token: {error}")))?;

        Ok(Self::from_raw(u64::from_le_bytes(bytes)))
    }

    /// Creates a token from a raw value, clearing the sign bit.
    #[must_use]
    pub fn from_raw(value: u64) -> Self {
        Self(value & TOKEN_MASK)
    }

    /// Returns the underlying value.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for OwnerToken {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::OwnerToken;

    #[test]
    fn generated_tokens_fit_in_63_bits() {
        for _ in 0..64 {
            let token = OwnerToken::generate().unwrap_or_else(|_| unreachable!());
            assert!(i64::try_from(token.as_u64()).is_ok());
        }
    }

    #[test]
    fn from_raw_clears_sign_bit() {
        let token = OwnerToken::from_raw(u64::MAX);
        assert_eq!(token.as_u64(), i64::MAX as u64);
        assert_eq!(token.to_string(), i64::MAX.to_string());
    }
}
