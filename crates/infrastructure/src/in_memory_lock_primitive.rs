use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use warden_application::LockPrimitive;
use warden_core::{LockError, LockName, LockResult, OwnerToken};

const MAX_LEASE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy)]
struct Hold {
    owner: OwnerToken,
    count: u32,
    expires_at: Instant,
}

#[derive(Default)]
struct LockSlot {
    hold: Option<Hold>,
    released: Arc<Notify>,
}

impl LockSlot {
    /// Returns the live hold, clearing it when the lease has run out.
    fn live_hold(&mut self, now: Instant) -> Option<&mut Hold> {
        if self.hold.is_some_and(|hold| hold.expires_at <= now) {
            self.hold = None;
        }
        self.hold.as_mut()
    }

    /// Drops one hold of `owner`, waking one waiter when the key frees up.
    fn release_hold(&mut self, owner: OwnerToken, now: Instant) -> bool {
        let Some(hold) = self.live_hold(now) else {
            return false;
        };
        if hold.owner != owner {
            return false;
        }

        hold.count -= 1;
        if hold.count == 0 {
            self.hold = None;
            self.released.notify_one();
        }
        true
    }

    fn is_idle(&mut self, now: Instant) -> bool {
        self.live_hold(now).is_none() && Arc::strong_count(&self.released) == 1
    }
}

/// Removes the slot for `name` when nobody holds or waits on it.
fn prune_if_idle(slots: &mut HashMap<String, LockSlot>, name: &str, now: Instant) {
    if slots.get_mut(name).is_some_and(|slot| slot.is_idle(now)) {
        slots.remove(name);
    }
}

/// In-process lock store for single-node deployments and tests.
///
/// Waiters are woken one at a time when a key is fully released, so handoff
/// under contention does not depend on the retry interval.
#[derive(Default)]
pub struct InMemoryLockPrimitive {
    slots: Mutex<HashMap<String, LockSlot>>,
}

impl InMemoryLockPrimitive {
    /// Creates an empty in-memory lock store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockPrimitive for InMemoryLockPrimitive {
    async fn acquire(
        &self,
        name: &LockName,
        owner: OwnerToken,
        lease: Duration,
    ) -> LockResult<bool> {
        if lease.is_zero() {
            return Err(LockError::Validation(format!(
                "lease for lock '{name}' must be positive"
            )));
        }

        let now = Instant::now();
        let expires_at = now.checked_add(lease).unwrap_or(now + MAX_LEASE);

        let mut slots = self.slots.lock().await;
        let slot = slots.entry(name.as_str().to_owned()).or_default();
        match slot.live_hold(now) {
            None => {
                slot.hold = Some(Hold {
                    owner,
                    count: 1,
                    expires_at,
                });
                Ok(true)
            }
            Some(hold) if hold.owner == owner => {
                hold.count = hold.count.saturating_add(1);
                hold.expires_at = expires_at;
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    async fn release(&self, name: &LockName, owner: OwnerToken) -> LockResult<bool> {
        let now = Instant::now();
        let mut slots = self.slots.lock().await;
        let released = slots
            .get_mut(name.as_str())
            .is_some_and(|slot| slot.release_hold(owner, now));
        prune_if_idle(&mut slots, name.as_str(), now);

        Ok(released)
    }

    async fn is_locked(&self, name: &LockName) -> LockResult<bool> {
        let now = Instant::now();
        let mut slots = self.slots.lock().await;
        let locked = slots
            .get_mut(name.as_str())
            .is_some_and(|slot| slot.live_hold(now).is_some());
        prune_if_idle(&mut slots, name.as_str(), now);

        Ok(locked)
    }

    async fn wait_for_release(&self, name: &LockName, max_wait: Duration) {
        let released = {
            let mut slots = self.slots.lock().await;
            slots
                .entry(name.as_str().to_owned())
                .or_default()
                .released
                .clone()
        };

        let _ = tokio::time::timeout(max_wait, released.notified()).await;
        drop(released);

        let mut slots = self.slots.lock().await;
        prune_if_idle(&mut slots, name.as_str(), Instant::now());
    }
}

#[cfg(test)]
impl InMemoryLockPrimitive {
    async fn slot_count(&self) -> usize {
        self.slots.lock().await.len()
    }
}
