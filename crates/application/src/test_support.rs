use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use warden_core::{LockError, LockName, LockResult, OwnerToken};

use crate::LockPrimitive;

#[derive(Default)]
struct FakeState {
    holders: HashMap<String, (OwnerToken, u32)>,
    acquire_log: Vec<String>,
    release_calls: HashMap<OwnerToken, usize>,
}

/// Lock store fake with call accounting.
#[derive(Default)]
pub(crate) struct FakeLockPrimitive {
    state: Mutex<FakeState>,
    non_reentrant: bool,
    unavailable: AtomicBool,
    unavailable_names: HashSet<String>,
    failing_release: bool,
    acquire_delay: Duration,
    release_delay: Duration,
}

impl FakeLockPrimitive {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn non_reentrant() -> Self {
        Self {
            non_reentrant: true,
            ..Self::default()
        }
    }

    pub(crate) fn unavailable() -> Self {
        Self {
            unavailable: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub(crate) fn unavailable_for(name: &str) -> Self {
        Self {
            unavailable_names: HashSet::from([name.to_owned()]),
            ..Self::default()
        }
    }

    pub(crate) fn failing_release() -> Self {
        Self {
            failing_release: true,
            ..Self::default()
        }
    }

    /// Delays every acquire call by `delay` before it reaches the store.
    pub(crate) fn with_acquire_delay(mut self, delay: Duration) -> Self {
        self.acquire_delay = delay;
        self
    }

    /// Delays every release call by `delay` before it reaches the store.
    pub(crate) fn with_release_delay(mut self, delay: Duration) -> Self {
        self.release_delay = delay;
        self
    }

    pub(crate) fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub(crate) fn hold(&self, name: &str, owner: OwnerToken) {
        self.state().holders.insert(name.to_owned(), (owner, 1));
    }

    pub(crate) fn clear(&self, name: &str) {
        self.state().holders.remove(name);
    }

    pub(crate) fn holder(&self, name: &str) -> Option<OwnerToken> {
        self.state().holders.get(name).map(|(owner, _)| *owner)
    }

    pub(crate) fn acquire_log(&self) -> Vec<String> {
        self.state().acquire_log.clone()
    }

    pub(crate) fn release_calls(&self) -> usize {
        self.state().release_calls.values().sum()
    }

    pub(crate) fn release_calls_for(&self, owner: OwnerToken) -> usize {
        self.state()
            .release_calls
            .get(&owner)
            .copied()
            .unwrap_or(0)
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self, name: &LockName) -> LockResult<()> {
        if self.unavailable.load(Ordering::SeqCst) || self.unavailable_names.contains(name.as_str()) {
            return Err(LockError::StoreUnavailable(format!(
                "fake store refused '{name}'"
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl LockPrimitive for FakeLockPrimitive {
    async fn acquire(
        &self,
        name: &LockName,
        owner: OwnerToken,
        _lease: Duration,
    ) -> LockResult<bool> {
        if !self.acquire_delay.is_zero() {
            tokio::time::sleep(self.acquire_delay).await;
        }
        self.check_available(name)?;

        let mut guard = self.state();
        let state = &mut *guard;
        state.acquire_log.push(name.as_str().to_owned());
        match state.holders.get_mut(name.as_str()) {
            None => {
                state.holders.insert(name.as_str().to_owned(), (owner, 1));
                Ok(true)
            }
            Some((holder, count)) if *holder == owner && !self.non_reentrant => {
                *count += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    async fn release(&self, name: &LockName, owner: OwnerToken) -> LockResult<bool> {
        if !self.release_delay.is_zero() {
            tokio::time::sleep(self.release_delay).await;
        }
        self.check_available(name)?;

        let mut guard = self.state();
        let state = &mut *guard;
        *state.release_calls.entry(owner).or_insert(0) += 1;
        if self.failing_release {
            return Err(LockError::StoreUnavailable(format!(
                "fake store dropped release of '{name}'"
            )));
        }

        let Some((holder, count)) = state.holders.get_mut(name.as_str()) else {
            return Ok(false);
        };
        if *holder != owner {
            return Ok(false);
        }

        *count -= 1;
        if *count == 0 {
            state.holders.remove(name.as_str());
        }

        Ok(true)
    }

    async fn is_locked(&self, name: &LockName) -> LockResult<bool> {
        self.check_available(name)?;
        Ok(self.state().holders.contains_key(name.as_str()))
    }

    fn supports_reentrancy(&self) -> bool {
        !self.non_reentrant
    }
}
