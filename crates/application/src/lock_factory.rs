use std::sync::Arc;

use warden_core::{LockError, LockName, LockResult};
use warden_domain::{CompositeLockDescriptor, CompositeStrategy};

use crate::{CompositeLockHandle, LockPrimitive, SingleLockHandle};

/// Builds lock handles wired to one lock store.
#[derive(Clone)]
pub struct LockFactory {
    primitive: Arc<dyn LockPrimitive>,
}

impl LockFactory {
    /// Creates a factory backed by `primitive`.
    #[must_use]
    pub fn new(primitive: Arc<dyn LockPrimitive>) -> Self {
        Self { primitive }
    }

    /// Returns a handle over one named key.
    pub fn single(&self, name: &str) -> LockResult<Arc<SingleLockHandle>> {
        Ok(Arc::new(SingleLockHandle::new(
            LockName::new(name)?,
            self.primitive.clone(),
        )))
    }

    /// Returns a composite handle for a validated descriptor.
    pub fn composite(
        &self,
        descriptor: &CompositeLockDescriptor,
    ) -> LockResult<Arc<CompositeLockHandle>> {
        let members = descriptor
            .acquisition_order()
            .into_iter()
            .map(|name| Arc::new(SingleLockHandle::new(name, self.primitive.clone())))
            .collect();

        Ok(Arc::new(CompositeLockHandle::new(
            members,
            descriptor.strategy(),
        )?))
    }

    /// Returns a multi-lock that needs every named key.
    pub fn all_of<S: AsRef<str>>(&self, names: &[S]) -> LockResult<Arc<CompositeLockHandle>> {
        self.composite(&CompositeLockDescriptor::all_of(names)?)
    }

    /// Returns a red-lock that needs a majority of the named keys.
    pub fn quorum<S: AsRef<str>>(&self, names: &[S]) -> LockResult<Arc<CompositeLockHandle>> {
        self.composite(&CompositeLockDescriptor::quorum(names)?)
    }

    /// Returns a red-lock over one key name held in independent stores.
    pub fn quorum_across(
        name: &str,
        primitives: &[Arc<dyn LockPrimitive>],
    ) -> LockResult<Arc<CompositeLockHandle>> {
        if primitives.is_empty() {
            return Err(LockError::Validation(format!(
                "red-lock '{name}' needs at least one lock store"
            )));
        }

        let name = LockName::new(name)?;
        let members = primitives
            .iter()
            .map(|primitive| Arc::new(SingleLockHandle::new(name.clone(), primitive.clone())))
            .collect();

        Ok(Arc::new(CompositeLockHandle::new(
            members,
            CompositeStrategy::majority_quorum(primitives.len()),
        )?))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use warden_domain::CompositeStrategy;

    use crate::test_support::FakeLockPrimitive;
    use crate::{LockHandle, LockPrimitive};

    use super::LockFactory;

    #[test]
    fn single_rejects_empty_name() {
        let factory = LockFactory::new(Arc::new(FakeLockPrimitive::new()));
        assert!(factory.single("").is_err());
    }

    #[test]
    fn all_of_orders_members_by_name() {
        let factory = LockFactory::new(Arc::new(FakeLockPrimitive::new()));
        let handle = factory
            .all_of(&["zeta", "alpha", "mid"])
            .unwrap_or_else(|_| unreachable!());

        let names = handle
            .names()
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
        assert_eq!(handle.strategy(), CompositeStrategy::AllOf);
    }

    #[test]
    fn composites_reject_repeated_member_names() {
        let factory = LockFactory::new(Arc::new(FakeLockPrimitive::new()));
        assert!(factory.all_of(&["a", "a"]).is_err());
        assert!(factory.quorum(&["a", "b", "a"]).is_err());
    }

    #[test]
    fn quorum_keeps_caller_member_order() {
        let factory = LockFactory::new(Arc::new(FakeLockPrimitive::new()));
        let handle = factory
            .quorum(&["zeta", "alpha", "mid"])
            .unwrap_or_else(|_| unreachable!());

        let names = handle
            .names()
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn quorum_uses_strict_majority() {
        let factory = LockFactory::new(Arc::new(FakeLockPrimitive::new()));
        let handle = factory
            .quorum(&["a", "b", "c", "d", "e"])
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(handle.strategy(), CompositeStrategy::Quorum(3));
    }

    #[test]
    fn quorum_across_requires_stores() {
        assert!(LockFactory::quorum_across("orders", &[]).is_err());

        let stores: Vec<Arc<dyn LockPrimitive>> = vec![
            Arc::new(FakeLockPrimitive::new()),
            Arc::new(FakeLockPrimitive::new()),
            Arc::new(FakeLockPrimitive::new()),
        ];
        let handle = LockFactory::quorum_across("orders", &stores)
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(handle.members().len(), 3);
        assert_eq!(handle.strategy(), CompositeStrategy::Quorum(2));
    }
}
