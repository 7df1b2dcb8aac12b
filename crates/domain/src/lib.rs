//! Lock configuration, state, and composite strategy types.

#![forbid(unsafe_code)]

mod composite;
mod configuration;
mod state;

pub use composite::{CompositeLockDescriptor, CompositeStrategy};
pub use configuration::{
    DEFAULT_LEASE_TIME, DEFAULT_RETRY_INTERVAL, DEFAULT_TIME_UNIT, DEFAULT_WAIT_TIME,
    LockConfiguration, LockConfigurationBuilder, TimeUnit,
};
pub use state::{AcquireOutcome, LockState};
