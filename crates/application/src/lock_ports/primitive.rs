use std::time::Duration;

use async_trait::async_trait;
use warden_core::{LockName, LockResult, OwnerToken};

/// Distributed test-and-set port backed by a shared store.
///
/// Transport failures surface as `LockError::StoreUnavailable`, never as a
/// refused acquisition.
#[async_trait]
pub trait LockPrimitive: Send + Sync {
    /// Atomically takes the key for `owner`, or adds a counted hold when
    /// `owner` already has it. Sets or refreshes the TTL to `lease`.
    ///
    /// Returns false when another owner holds the key.
    async fn acquire(&self, name: &LockName, owner: OwnerToken, lease: Duration)
    -> LockResult<bool>;

    /// Drops one hold of `owner`, clearing the key when no holds remain.
    ///
    /// Returns false without error when `owner` does not hold the key.
    async fn release(&self, name: &LockName, owner: OwnerToken) -> LockResult<bool>;

    /// Returns true when any owner currently holds the key.
    async fn is_locked(&self, name: &LockName) -> LockResult<bool>;

    /// Returns whether `acquire` counts repeated holds by the same owner.
    fn supports_reentrancy(&self) -> bool {
        true
    }

    /// Suspends until the key may have been released or `max_wait` elapsed.
    async fn wait_for_release(&self, _name: &LockName, max_wait: Duration) {
        tokio::time::sleep(max_wait).await;
    }
}
