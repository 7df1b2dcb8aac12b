//! Single and composite lock handles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time::Instant;

mod composite;
mod single;

pub use composite::CompositeLockHandle;
pub use single::SingleLockHandle;

/// Upper bound for deadlines when a wait budget overflows the clock.
const MAX_WAIT: Duration = Duration::from_secs(60 * 60 * 24 * 365);

fn deadline_after(wait: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(wait)
        .or_else(|| now.checked_add(MAX_WAIT))
        .unwrap_or(now)
}

/// Counts one in-flight operation for the lifetime of the value.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
