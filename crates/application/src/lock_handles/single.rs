use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;
use warden_core::{LockName, LockResult, OwnerToken};
use warden_domain::{AcquireOutcome, LockConfiguration, LockState};

use crate::{LockHandle, LockPrimitive};

use super::{InFlight, deadline_after};

/// Handle over one named key in the lock store.
///
/// The handle keeps a local `owner -> hold count` view. When the primitive
/// counts holds itself the view only mirrors the store; otherwise the view is
/// what makes reacquisition by the same owner reentrant.
pub struct SingleLockHandle {
    name: LockName,
    primitive: Arc<dyn LockPrimitive>,
    holds: Mutex<HashMap<OwnerToken, u32>>,
    acquiring: AtomicUsize,
    releasing: AtomicUsize,
}

impl SingleLockHandle {
    /// Creates a handle for `name` backed by `primitive`.
    #[must_use]
    pub fn new(name: LockName, primitive: Arc<dyn LockPrimitive>) -> Self {
        Self {
            name,
            primitive,
            holds: Mutex::new(HashMap::new()),
            acquiring: AtomicUsize::new(0),
            releasing: AtomicUsize::new(0),
        }
    }

    /// Returns the key name.
    #[must_use]
    pub fn name(&self) -> &LockName {
        &self.name
    }

    /// Returns how many holds `owner` has through this handle.
    #[must_use]
    pub fn hold_count(&self, owner: OwnerToken) -> u32 {
        self.holds().get(&owner).copied().unwrap_or(0)
    }

    /// Asks the store whether any owner holds the key.
    pub async fn is_locked(&self) -> LockResult<bool> {
        self.primitive.is_locked(&self.name).await
    }

    pub(super) async fn acquire_until(
        &self,
        owner: OwnerToken,
        lease: Duration,
        retry_interval: Duration,
        deadline: Instant,
    ) -> LockResult<AcquireOutcome> {
        let _in_flight = InFlight::enter(&self.acquiring);

        if !self.primitive.supports_reentrancy() && self.add_local_hold_if_held(owner) {
            debug!(lock_name = %self.name, owner = %owner, "reentrant lock hold added");
            return Ok(AcquireOutcome::Acquired(owner));
        }

        loop {
            if self.primitive.acquire(&self.name, owner, lease).await? {
                self.add_local_hold(owner);
                debug!(lock_name = %self.name, owner = %owner, "lock acquired");
                return Ok(AcquireOutcome::Acquired(owner));
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(lock_name = %self.name, owner = %owner, "lock acquisition timed out");
                return Ok(AcquireOutcome::TimedOut);
            }

            let pause = retry_interval.min(deadline.saturating_duration_since(now));
            self.primitive.wait_for_release(&self.name, pause).await;
        }
    }

    fn holds(&self) -> MutexGuard<'_, HashMap<OwnerToken, u32>> {
        self.holds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add_local_hold(&self, owner: OwnerToken) {
        *self.holds().entry(owner).or_insert(0) += 1;
    }

    fn add_local_hold_if_held(&self, owner: OwnerToken) -> bool {
        match self.holds().get_mut(&owner) {
            Some(count) => {
                *count += 1;
                true
            }
            None => false,
        }
    }

    /// Drops one local hold and returns how many remain.
    fn drop_local_hold(&self, owner: OwnerToken) -> u32 {
        let mut holds = self.holds();
        let remaining = match holds.get_mut(&owner) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            holds.remove(&owner);
        }
        remaining
    }

    fn forget_local_holds(&self, owner: OwnerToken) {
        self.holds().remove(&owner);
    }
}

#[async_trait]
impl LockHandle for SingleLockHandle {
    fn names(&self) -> Vec<LockName> {
        vec![self.name.clone()]
    }

    fn state(&self) -> LockState {
        if !self.holds().is_empty() {
            LockState::Held
        } else if self.acquiring.load(Ordering::SeqCst) > 0 {
            LockState::Acquiring
        } else if self.releasing.load(Ordering::SeqCst) > 0 {
            LockState::Releasing
        } else {
            LockState::Unlocked
        }
    }

    async fn try_acquire(
        &self,
        config: &LockConfiguration,
        owner: OwnerToken,
    ) -> LockResult<AcquireOutcome> {
        let deadline = deadline_after(config.wait_duration());
        self.acquire_until(
            owner,
            config.lease_duration(),
            config.retry_interval(),
            deadline,
        )
        .await
    }

    async fn release(&self, owner: OwnerToken) -> LockResult<()> {
        let _in_flight = InFlight::enter(&self.releasing);

        if !self.primitive.supports_reentrancy() && self.hold_count(owner) > 1 {
            let remaining = self.drop_local_hold(owner);
            debug!(
                lock_name = %self.name,
                owner = %owner,
                remaining_holds = remaining,
                "reentrant lock hold dropped"
            );
            return Ok(());
        }

        if self.primitive.release(&self.name, owner).await? {
            self.drop_local_hold(owner);
            debug!(lock_name = %self.name, owner = %owner, "lock released");
        } else {
            self.forget_local_holds(owner);
            debug!(
                lock_name = %self.name,
                owner = %owner,
                "lock no longer owned by this holder; release skipped"
            );
        }

        Ok(())
    }
}
