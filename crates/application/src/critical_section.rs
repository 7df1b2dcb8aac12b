//! Guaranteed-release execution of work inside a lock.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};
use warden_core::{LockError, LockName, OwnerToken};
use warden_domain::{AcquireOutcome, LockConfiguration};

use crate::LockHandle;

/// Runs caller work while holding a lock and releases it exactly once.
///
/// Release runs on every exit path of the work: value, error, panic, or the
/// caller dropping the `synchronize` future. Release failures are logged and
/// never replace the outcome of the work.
#[derive(Debug, Clone, Copy, Default)]
pub struct CriticalSectionExecutor;

impl CriticalSectionExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Acquires `handle` with a fresh owner token, runs `work`, and releases.
    ///
    /// Fails with `LockError::AcquisitionTimeout` or
    /// `LockError::QuorumNotReached` without running `work` when the lock is
    /// not granted within the wait budget.
    pub async fn synchronize<T, E, F, Fut>(
        &self,
        handle: Arc<dyn LockHandle>,
        config: &LockConfiguration,
        work: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let owner = OwnerToken::generate()?;
        // A fresh token cannot have earlier holds, so a cancelled acquisition
        // is safe to release.
        let guard = ReleaseGuard::new(handle, owner, config.name().clone(), true);
        self.run(guard, config, work).await
    }

    /// Same as [`Self::synchronize`] with a caller-supplied owner token.
    ///
    /// Reusing a token that already holds the lock nests reentrantly.
    pub async fn synchronize_with_token<T, E, F, Fut>(
        &self,
        handle: Arc<dyn LockHandle>,
        config: &LockConfiguration,
        owner: OwnerToken,
        work: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let guard = ReleaseGuard::new(handle, owner, config.name().clone(), false);
        self.run(guard, config, work).await
    }

    async fn run<T, E, F, Fut>(
        &self,
        mut guard: ReleaseGuard,
        config: &LockConfiguration,
        work: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let handle = guard.handle.clone();
        let owner = guard.owner;

        let outcome = match handle.try_acquire(config, owner).await {
            Ok(outcome) => outcome,
            Err(error) => {
                guard.disarm();
                return Err(error.into());
            }
        };

        match outcome {
            AcquireOutcome::Acquired(_) => guard.arm(),
            AcquireOutcome::TimedOut => {
                guard.disarm();
                return Err(LockError::AcquisitionTimeout(format!(
                    "lock '{}' was not acquired within {:?}",
                    config.name(),
                    config.wait_duration()
                ))
                .into());
            }
            AcquireOutcome::QuorumNotReached { acquired, required } => {
                guard.disarm();
                return Err(LockError::QuorumNotReached {
                    name: config.name().to_string(),
                    acquired,
                    required,
                }
                .into());
            }
        }

        debug!(lock_name = %config.name(), owner = %owner, "entered critical section");
        let result = work().await;
        guard.release().await;

        result
    }
}

/// Releases the lock for one owner exactly once.
///
/// An armed guard that is dropped without [`ReleaseGuard::release`] spawns the
/// release onto the current tokio runtime.
struct ReleaseGuard {
    handle: Arc<dyn LockHandle>,
    owner: OwnerToken,
    name: LockName,
    armed: bool,
}

impl ReleaseGuard {
    fn new(handle: Arc<dyn LockHandle>, owner: OwnerToken, name: LockName, armed: bool) -> Self {
        Self {
            handle,
            owner,
            name,
            armed,
        }
    }

    fn arm(&mut self) {
        self.armed = true;
    }

    fn disarm(&mut self) {
        self.armed = false;
    }

    /// Releases and waits for the store round-trip.
    ///
    /// The release runs as its own task, so dropping this future mid-release
    /// still lets the release finish.
    async fn release(mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;

        let release = tokio::spawn(release_and_log(
            self.handle.clone(),
            self.owner,
            self.name.clone(),
        ));
        if let Err(error) = release.await {
            warn!(
                lock_name = %self.name,
                owner = %self.owner,
                error = %error,
                "critical section release task failed"
            );
        }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(
                    lock_name = %self.name,
                    owner = %self.owner,
                    "critical section abandoned; releasing lock in background"
                );
                runtime.spawn(release_and_log(
                    self.handle.clone(),
                    self.owner,
                    self.name.clone(),
                ));
            }
            Err(error) => {
                warn!(
                    lock_name = %self.name,
                    owner = %self.owner,
                    error = %error,
                    "critical section abandoned outside a runtime; lock will expire with its lease"
                );
            }
        }
    }
}

async fn release_and_log(handle: Arc<dyn LockHandle>, owner: OwnerToken, name: LockName) {
    match handle.release(owner).await {
        Ok(()) => debug!(lock_name = %name, owner = %owner, "left critical section"),
        Err(error) => {
            let error = LockError::ReleaseFailed(error.to_string());
            warn!(
                lock_name = %name,
                owner = %owner,
                error = %error,
                "failed to release critical section lock"
            );
        }
    }
}
