use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use futures::future::join_all;
use futures::stream::FuturesUnordered;
use tokio::time::Instant;
use tracing::{debug, warn};
use warden_core::{LockError, LockName, LockResult, OwnerToken};
use warden_domain::{AcquireOutcome, CompositeStrategy, LockConfiguration, LockState};

use crate::LockHandle;

use super::{SingleLockHandle, deadline_after};

/// Handle that combines several single locks under one strategy.
///
/// `AllOf` members are acquired one at a time in the order given, which the
/// factory makes lexicographic so every process takes them in the same
/// order. `Quorum` members are acquired concurrently. A failed attempt
/// releases exactly the members it took before reporting.
pub struct CompositeLockHandle {
    members: Vec<Arc<SingleLockHandle>>,
    strategy: CompositeStrategy,
    /// Member indices taken by each successful quorum acquisition, innermost
    /// hold last.
    quorum_holds: Mutex<HashMap<OwnerToken, Vec<Vec<usize>>>>,
}

impl CompositeLockHandle {
    /// Creates a composite over `members` in acquisition order.
    pub(crate) fn new(
        members: Vec<Arc<SingleLockHandle>>,
        strategy: CompositeStrategy,
    ) -> LockResult<Self> {
        strategy.validate(members.len())?;

        Ok(Self {
            members,
            strategy,
            quorum_holds: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the combining strategy.
    #[must_use]
    pub fn strategy(&self) -> CompositeStrategy {
        self.strategy
    }

    /// Returns members in acquisition order.
    #[must_use]
    pub fn members(&self) -> &[Arc<SingleLockHandle>] {
        &self.members
    }

    fn quorum_holds(&self) -> MutexGuard<'_, HashMap<OwnerToken, Vec<Vec<usize>>>> {
        self.quorum_holds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn push_quorum_hold(&self, owner: OwnerToken, taken: Vec<usize>) {
        self.quorum_holds().entry(owner).or_default().push(taken);
    }

    fn pop_quorum_hold(&self, owner: OwnerToken) -> Option<Vec<usize>> {
        let mut holds = self.quorum_holds();
        let stack = holds.get_mut(&owner)?;
        let taken = stack.pop();
        if stack.is_empty() {
            holds.remove(&owner);
        }
        taken
    }

    fn members_at(&self, indices: &[usize]) -> Vec<&SingleLockHandle> {
        indices
            .iter()
            .filter_map(|index| self.members.get(*index))
            .map(Arc::as_ref)
            .collect()
    }

    async fn acquire_all_of(
        &self,
        config: &LockConfiguration,
        owner: OwnerToken,
        deadline: Instant,
    ) -> LockResult<AcquireOutcome> {
        let mut acquired: Vec<&SingleLockHandle> = Vec::with_capacity(self.members.len());

        for member in &self.members {
            let outcome = member
                .acquire_until(
                    owner,
                    config.lease_duration(),
                    config.retry_interval(),
                    deadline,
                )
                .await;

            match outcome {
                Ok(AcquireOutcome::Acquired(_)) => acquired.push(member.as_ref()),
                Ok(_) => {
                    debug!(
                        lock_name = %member.name(),
                        owner = %owner,
                        acquired_members = acquired.len(),
                        "multi-lock member unavailable; rolling back"
                    );
                    release_in_reverse(&acquired, owner).await;
                    return Ok(AcquireOutcome::TimedOut);
                }
                Err(error) => {
                    release_in_reverse(&acquired, owner).await;
                    return Err(error);
                }
            }
        }

        Ok(AcquireOutcome::Acquired(owner))
    }

    async fn acquire_quorum(
        &self,
        config: &LockConfiguration,
        owner: OwnerToken,
        deadline: Instant,
    ) -> LockResult<AcquireOutcome> {
        let started = Instant::now();
        let required = self.strategy.required_members(self.members.len());
        let lease = config.lease_duration();
        let retry_interval = config.retry_interval();

        let mut attempts = self
            .members
            .iter()
            .enumerate()
            .map(|(index, member)| async move {
                let outcome = member
                    .acquire_until(owner, lease, retry_interval, deadline)
                    .await;
                (index, outcome)
            })
            .collect::<FuturesUnordered<_>>();

        // Without a quorum every attempt runs to completion, so the rollback
        // below only touches holds this attempt actually took.
        let mut taken = Vec::with_capacity(self.members.len());
        while let Some((index, outcome)) = attempts.next().await {
            match outcome {
                Ok(AcquireOutcome::Acquired(_)) => taken.push(index),
                Ok(_) => {}
                Err(error) => {
                    if let Some(member) = self.members.get(index) {
                        warn!(
                            lock_name = %member.name(),
                            owner = %owner,
                            error = %error,
                            "red-lock member unavailable"
                        );
                    }
                }
            }

            if taken.len() >= required {
                break;
            }
        }
        drop(attempts);

        let acquired = taken.len();
        let elapsed = started.elapsed();
        if acquired >= required && elapsed < lease {
            debug!(
                owner = %owner,
                acquired_members = acquired,
                required_members = required,
                "red-lock quorum acquired"
            );
            self.push_quorum_hold(owner, taken);
            return Ok(AcquireOutcome::Acquired(owner));
        }

        if acquired >= required {
            warn!(
                owner = %owner,
                elapsed = ?elapsed,
                lease = ?lease,
                "red-lock quorum gathered after its lease expired"
            );
        }

        release_concurrently(&self.members_at(&taken), owner).await;
        Ok(AcquireOutcome::QuorumNotReached { acquired, required })
    }
}

async fn release_in_reverse(members: &[&SingleLockHandle], owner: OwnerToken) {
    for member in members.iter().rev() {
        if let Err(error) = member.release(owner).await {
            log_release_failure(member.name(), owner, error);
        }
    }
}

async fn release_concurrently(members: &[&SingleLockHandle], owner: OwnerToken) {
    let results = join_all(
        members
            .iter()
            .map(|member| async move { (member.name(), member.release(owner).await) }),
    )
    .await;

    for (name, result) in results {
        if let Err(error) = result {
            log_release_failure(name, owner, error);
        }
    }
}

fn log_release_failure(name: &LockName, owner: OwnerToken, error: LockError) {
    let error = LockError::ReleaseFailed(error.to_string());
    warn!(
        lock_name = %name,
        owner = %owner,
        error = %error,
        "composite member release failed"
    );
}

#[async_trait]
impl LockHandle for CompositeLockHandle {
    fn names(&self) -> Vec<LockName> {
        self.members
            .iter()
            .map(|member| member.name().clone())
            .collect()
    }

    fn state(&self) -> LockState {
        let member_states = self
            .members
            .iter()
            .map(|member| member.state())
            .collect::<Vec<_>>();
        self.strategy.combine_states(&member_states)
    }

    async fn try_acquire(
        &self,
        config: &LockConfiguration,
        owner: OwnerToken,
    ) -> LockResult<AcquireOutcome> {
        let deadline = deadline_after(config.wait_duration());
        match self.strategy {
            CompositeStrategy::AllOf => self.acquire_all_of(config, owner, deadline).await,
            CompositeStrategy::Quorum(_) => self.acquire_quorum(config, owner, deadline).await,
        }
    }

    async fn release(&self, owner: OwnerToken) -> LockResult<()> {
        let all = self
            .members
            .iter()
            .map(Arc::as_ref)
            .collect::<Vec<_>>();
        match self.strategy {
            CompositeStrategy::AllOf => release_in_reverse(&all, owner).await,
            CompositeStrategy::Quorum(_) => match self.pop_quorum_hold(owner) {
                Some(taken) => release_concurrently(&self.members_at(&taken), owner).await,
                // Nothing recorded for this owner, so try every member.
                None => release_concurrently(&all, owner).await,
            },
        }

        Ok(())
    }
}
