//! Lock handles, critical section execution, and store ports.

#![forbid(unsafe_code)]

mod critical_section;
mod lock_factory;
mod lock_handles;
mod lock_ports;

#[cfg(test)]
mod test_support;

pub use critical_section::CriticalSectionExecutor;
pub use lock_factory::LockFactory;
pub use lock_handles::{CompositeLockHandle, SingleLockHandle};
pub use lock_ports::{LockHandle, LockPrimitive};
