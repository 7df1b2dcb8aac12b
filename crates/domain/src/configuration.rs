//! Lock acquisition configuration.
//!
//! A configuration is an immutable value describing how long a caller is
//! willing to wait for a lock and how long the store keeps it once granted.
//! The lease must outlast the protected work; nothing enforces that, and a
//! lease that expires mid critical section lets a second holder in.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_core::{LockError, LockName, LockResult};

/// Default wait budget, in [`DEFAULT_TIME_UNIT`].
pub const DEFAULT_WAIT_TIME: u64 = 10;

/// Default lease, in [`DEFAULT_TIME_UNIT`].
pub const DEFAULT_LEASE_TIME: u64 = 30;

/// Default unit for wait and lease amounts.
pub const DEFAULT_TIME_UNIT: TimeUnit = TimeUnit::Seconds;

/// Default pause between acquisition attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Unit applied to wait and lease amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    /// Milliseconds.
    Milliseconds,
    /// Seconds.
    Seconds,
    /// Minutes.
    Minutes,
    /// Hours.
    Hours,
}

impl TimeUnit {
    /// Returns stable configuration value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Milliseconds => "milliseconds",
            Self::Seconds => "seconds",
            Self::Minutes => "minutes",
            Self::Hours => "hours",
        }
    }

    /// Parses configuration value.
    pub fn parse(value: &str) -> LockResult<Self> {
        match value {
            "milliseconds" | "ms" => Ok(Self::Milliseconds),
            "seconds" | "s" => Ok(Self::Seconds),
            "minutes" | "m" => Ok(Self::Minutes),
            "hours" | "h" => Ok(Self::Hours),
            _ => Err(LockError::Validation(format!("unknown time unit '{value}'"))),
        }
    }

    /// Converts an amount in this unit into a duration, saturating on overflow.
    #[must_use]
    pub fn to_duration(&self, amount: u64) -> Duration {
        match self {
            Self::Milliseconds => Duration::from_millis(amount),
            Self::Seconds => Duration::from_secs(amount),
            Self::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            Self::Hours => Duration::from_secs(amount.saturating_mul(3600)),
        }
    }
}

/// Immutable lock acquisition settings for one critical section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockConfiguration {
    name: LockName,
    wait_time: u64,
    lease_time: u64,
    time_unit: TimeUnit,
    retry_interval: Duration,
}

impl LockConfiguration {
    /// Starts a builder for the named critical section.
    pub fn builder(name: impl Into<String>) -> LockConfigurationBuilder {
        LockConfigurationBuilder {
            name: name.into(),
            wait_time: DEFAULT_WAIT_TIME,
            lease_time: DEFAULT_LEASE_TIME,
            time_unit: DEFAULT_TIME_UNIT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    /// Returns the logical name of the critical section.
    #[must_use]
    pub fn name(&self) -> &LockName {
        &self.name
    }

    /// Returns the wait budget in [`Self::time_unit`].
    #[must_use]
    pub fn wait_time(&self) -> u64 {
        self.wait_time
    }

    /// Returns the lease in [`Self::time_unit`].
    #[must_use]
    pub fn lease_time(&self) -> u64 {
        self.lease_time
    }

    /// Returns the unit applied to wait and lease amounts.
    #[must_use]
    pub fn time_unit(&self) -> TimeUnit {
        self.time_unit
    }

    /// Returns the wait budget as a duration.
    #[must_use]
    pub fn wait_duration(&self) -> Duration {
        self.time_unit.to_duration(self.wait_time)
    }

    /// Returns the lease as a duration.
    #[must_use]
    pub fn lease_duration(&self) -> Duration {
        self.time_unit.to_duration(self.lease_time)
    }

    /// Returns the pause between acquisition attempts.
    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }
}

/// Builder for [`LockConfiguration`].
#[derive(Debug, Clone)]
pub struct LockConfigurationBuilder {
    name: String,
    wait_time: u64,
    lease_time: u64,
    time_unit: TimeUnit,
    retry_interval: Duration,
}

impl LockConfigurationBuilder {
    /// Sets the wait budget. Zero makes a single attempt.
    #[must_use]
    pub fn wait_time(mut self, wait_time: u64) -> Self {
        self.wait_time = wait_time;
        self
    }

    /// Sets the lease granted to a held lock.
    #[must_use]
    pub fn lease_time(mut self, lease_time: u64) -> Self {
        self.lease_time = lease_time;
        self
    }

    /// Sets the unit for wait and lease amounts.
    #[must_use]
    pub fn time_unit(mut self, time_unit: TimeUnit) -> Self {
        self.time_unit = time_unit;
        self
    }

    /// Sets the pause between acquisition attempts.
    #[must_use]
    pub fn retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    /// Validates and builds the configuration.
    pub fn build(self) -> LockResult<LockConfiguration> {
        let name = LockName::new(self.name)?;

        if self.lease_time == 0 {
            return Err(LockError::Validation(format!(
                "lease_time for lock '{name}' must be greater than zero"
            )));
        }

        if self.retry_interval.is_zero() {
            return Err(LockError::Validation(format!(
                "retry_interval for lock '{name}' must be greater than zero"
            )));
        }

        Ok(LockConfiguration {
            name,
            wait_time: self.wait_time,
            lease_time: self.lease_time,
            time_unit: self.time_unit,
            retry_interval: self.retry_interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;

    use super::{LockConfiguration, TimeUnit};

    #[test]
    fn builder_applies_defaults() {
        let config = LockConfiguration::builder("orders")
            .build()
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(config.name().as_str(), "orders");
        assert_eq!(config.wait_duration(), Duration::from_secs(10));
        assert_eq!(config.lease_duration(), Duration::from_secs(30));
        assert_eq!(config.retry_interval(), Duration::from_millis(100));
    }

    #[test]
    fn builder_rejects_zero_lease() {
        let result = LockConfiguration::builder("orders").lease_time(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_rejects_empty_name() {
        let result = LockConfiguration::builder(" ").build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_accepts_zero_wait() {
        let config = LockConfiguration::builder("orders")
            .wait_time(0)
            .time_unit(TimeUnit::Milliseconds)
            .lease_time(500)
            .build()
            .unwrap_or_else(|_| unreachable!());

        assert!(config.wait_duration().is_zero());
        assert_eq!(config.lease_duration(), Duration::from_millis(500));
    }

    #[test]
    fn time_unit_parse_accepts_stable_values() {
        for unit in [
            TimeUnit::Milliseconds,
            TimeUnit::Seconds,
            TimeUnit::Minutes,
            TimeUnit::Hours,
        ] {
            assert_eq!(TimeUnit::parse(unit.as_str()).ok(), Some(unit));
        }
        assert!(TimeUnit::parse("fortnights").is_err());
    }

    proptest! {
        #[test]
        fn coarser_units_never_shrink_durations(amount in 0u64..1_000_000) {
            let millis = TimeUnit::Milliseconds.to_duration(amount);
            let seconds = TimeUnit::Seconds.to_duration(amount);
            let minutes = TimeUnit::Minutes.to_duration(amount);
            let hours = TimeUnit::Hours.to_duration(amount);

            prop_assert!(millis <= seconds);
            prop_assert!(seconds <= minutes);
            prop_assert!(minutes <= hours);
            prop_assert_eq!(minutes, Duration::from_secs(amount * 60));
        }
    }
}
