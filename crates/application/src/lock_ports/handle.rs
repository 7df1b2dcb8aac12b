use async_trait::async_trait;
use warden_core::{LockName, LockResult, OwnerToken};
use warden_domain::{AcquireOutcome, LockConfiguration, LockState};

/// Strategy-agnostic capability shared by single and composite locks.
#[async_trait]
pub trait LockHandle: Send + Sync {
    /// Returns the names of the store keys behind this handle.
    fn names(&self) -> Vec<LockName>;

    /// Returns the current lifecycle state.
    fn state(&self) -> LockState;

    /// Attempts to acquire the lock for `owner` within the configured wait budget.
    async fn try_acquire(
        &self,
        config: &LockConfiguration,
        owner: OwnerToken,
    ) -> LockResult<AcquireOutcome>;

    /// Releases the hold of `owner`. Releasing an unowned lock is a no-op.
    async fn release(&self, owner: OwnerToken) -> LockResult<()>;
}
