//! Composite lock descriptors.
//!
//! A composite combines several named locks. `AllOf` needs every member,
//! `Quorum(k)` needs `k` members where `k` is a strict majority. Any two
//! strict majorities over the same members overlap, so two owners can never
//! both hold a quorum.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use warden_core::{LockError, LockName, LockResult};

use crate::LockState;

/// Strategy used to combine member locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "required", rename_all = "snake_case")]
pub enum CompositeStrategy {
    /// Every member must be held.
    AllOf,
    /// At least this many members must be held.
    Quorum(usize),
}

impl CompositeStrategy {
    /// Returns the smallest strict majority of `member_count`.
    #[must_use]
    pub fn majority(member_count: usize) -> usize {
        member_count / 2 + 1
    }

    /// Returns a majority quorum strategy for `member_count` members.
    #[must_use]
    pub fn majority_quorum(member_count: usize) -> Self {
        Self::Quorum(Self::majority(member_count))
    }

    /// Returns how many members must be held for the composite to be held.
    #[must_use]
    pub fn required_members(&self, member_count: usize) -> usize {
        match self {
            Self::AllOf => member_count,
            Self::Quorum(required) => *required,
        }
    }

    /// Validates the strategy against a member count.
    pub fn validate(&self, member_count: usize) -> LockResult<()> {
        if member_count == 0 {
            return Err(LockError::Validation(
                "composite lock must have at least one member".to_owned(),
            ));
        }

        if let Self::Quorum(required) = self {
            let majority = Self::majority(member_count);
            if *required < majority || *required > member_count {
                return Err(LockError::Validation(format!(
                    "quorum of {required} over {member_count} members must be between {majority} and {member_count}"
                )));
            }
        }

        Ok(())
    }

    /// Combines member states into the composite state.
    #[must_use]
    pub fn combine_states(&self, member_states: &[LockState]) -> LockState {
        let held = member_states
            .iter()
            .filter(|state| **state == LockState::Held)
            .count();

        if !member_states.is_empty() && held >= self.required_members(member_states.len()) {
            return LockState::Held;
        }

        if member_states.contains(&LockState::Acquiring) {
            LockState::Acquiring
        } else if member_states.contains(&LockState::Releasing) {
            LockState::Releasing
        } else {
            LockState::Unlocked
        }
    }
}

/// Ordered, validated set of member names plus a strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositeLockDescriptor {
    members: Vec<LockName>,
    strategy: CompositeStrategy,
}

impl CompositeLockDescriptor {
    /// Creates a descriptor after validating members and strategy.
    pub fn new(members: Vec<LockName>, strategy: CompositeStrategy) -> LockResult<Self> {
        strategy.validate(members.len())?;

        let mut seen = HashSet::with_capacity(members.len());
        for member in &members {
            if !seen.insert(member.as_str()) {
                return Err(LockError::Validation(format!(
                    "composite lock member '{member}' is listed more than once"
                )));
            }
        }

        Ok(Self { members, strategy })
    }

    /// Creates an all-of descriptor from raw names.
    pub fn all_of<S: AsRef<str>>(names: &[S]) -> LockResult<Self> {
        Self::new(parse_names(names)?, CompositeStrategy::AllOf)
    }

    /// Creates a majority quorum descriptor from raw names.
    pub fn quorum<S: AsRef<str>>(names: &[S]) -> LockResult<Self> {
        Self::new(
            parse_names(names)?,
            CompositeStrategy::majority_quorum(names.len()),
        )
    }

    /// Returns members in caller order.
    #[must_use]
    pub fn members(&self) -> &[LockName] {
        &self.members
    }

    /// Returns the combining strategy.
    #[must_use]
    pub fn strategy(&self) -> CompositeStrategy {
        self.strategy
    }

    /// Returns members in the order handles acquire them.
    ///
    /// `AllOf` members are sorted by name so every process takes them in the
    /// same sequence. `Quorum` members keep caller order since they are
    /// acquired concurrently.
    #[must_use]
    pub fn acquisition_order(&self) -> Vec<LockName> {
        let mut ordered = self.members.clone();
        if self.strategy == CompositeStrategy::AllOf {
            ordered.sort();
        }
        ordered
    }
}

fn parse_names<S: AsRef<str>>(names: &[S]) -> LockResult<Vec<LockName>> {
    names
        .iter()
        .map(|name| LockName::new(name.as_ref()))
        .collect()
}
