//! Warden worker runtime.
//!
//! Runs one periodic job under a distributed lock so that only one worker
//! instance executes it at a time.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use warden_application::{CriticalSectionExecutor, LockFactory, LockHandle, LockPrimitive};
use warden_core::{LockError, LockResult};
use warden_domain::{LockConfiguration, TimeUnit};
use warden_infrastructure::RedisLockPrimitive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockStrategy {
    Single,
    AllOf,
    Quorum,
}

impl LockStrategy {
    fn parse(value: &str) -> LockResult<Self> {
        match value.trim() {
            "single" => Ok(Self::Single),
            "all_of" => Ok(Self::AllOf),
            "quorum" => Ok(Self::Quorum),
            _ => Err(LockError::Validation(format!(
                "unknown WARDEN_STRATEGY '{value}'"
            ))),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::AllOf => "all_of",
            Self::Quorum => "quorum",
        }
    }
}

#[derive(Debug, Clone)]
struct WorkerConfig {
    redis_urls: Vec<String>,
    lock_names: Vec<String>,
    strategy: LockStrategy,
    key_prefix: String,
    worker_id: String,
    wait_ms: u64,
    lease_ms: u64,
    retry_interval_ms: u64,
    work_ms: u64,
    poll_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), LockError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let handle = build_lock_handle(&config)?;
    let lock_config = config.lock_configuration()?;
    let executor = CriticalSectionExecutor::new();

    info!(
        worker_id = %config.worker_id,
        strategy = config.strategy.as_str(),
        lock_names = ?config.lock_names,
        store_count = config.redis_urls.len(),
        wait_ms = config.wait_ms,
        lease_ms = config.lease_ms,
        poll_interval_ms = config.poll_interval_ms,
        "warden-worker started"
    );

    loop {
        let worker_id = config.worker_id.as_str();
        let work_duration = Duration::from_millis(config.work_ms);
        let result = executor
            .synchronize(handle.clone(), &lock_config, || async move {
                info!(worker_id = %worker_id, "running job under lock");
                tokio::time::sleep(work_duration).await;
                Ok::<_, LockError>(())
            })
            .await;

        match result {
            Ok(()) => info!(worker_id = %config.worker_id, "job completed"),
            Err(error) if error.is_contention() => info!(
                worker_id = %config.worker_id,
                error = %error,
                "job skipped; lock held by another worker"
            ),
            Err(error) => warn!(
                worker_id = %config.worker_id,
                error = %error,
                "job lock could not be acquired"
            ),
        }

        tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)).await;
    }
}

fn build_lock_handle(config: &WorkerConfig) -> LockResult<Arc<dyn LockHandle>> {
    let primitives = config
        .redis_urls
        .iter()
        .map(|url| {
            RedisLockPrimitive::open(url.as_str(), config.key_prefix.as_str())
                .map(|primitive| Arc::new(primitive) as Arc<dyn LockPrimitive>)
        })
        .collect::<LockResult<Vec<_>>>()?;
    let Some(first) = primitives.first() else {
        return Err(LockError::Validation(
            "WARDEN_REDIS_URLS must name at least one store".to_owned(),
        ));
    };
    let factory = LockFactory::new(first.clone());

    let handle: Arc<dyn LockHandle> = match config.strategy {
        LockStrategy::Single => factory.single(config.primary_lock_name())?,
        LockStrategy::AllOf => factory.all_of(config.lock_names.as_slice())?,
        LockStrategy::Quorum if primitives.len() > 1 => {
            LockFactory::quorum_across(config.primary_lock_name(), &primitives)?
        }
        LockStrategy::Quorum => factory.quorum(config.lock_names.as_slice())?,
    };

    Ok(handle)
}

impl WorkerConfig {
    fn load() -> LockResult<Self> {
        let redis_urls = split_list(required_env("WARDEN_REDIS_URLS")?.as_str());
        let lock_names = split_list(
            env::var("WARDEN_LOCK_NAMES")
                .unwrap_or_else(|_| "warden:job".to_owned())
                .as_str(),
        );
        let strategy = LockStrategy::parse(
            env::var("WARDEN_STRATEGY")
                .unwrap_or_else(|_| "single".to_owned())
                .as_str(),
        )?;
        let key_prefix = env::var("WARDEN_KEY_PREFIX")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "warden:lock".to_owned());
        let worker_id = env::var("WORKER_ID")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("worker-{}", std::process::id()));

        let config = Self {
            redis_urls,
            lock_names,
            strategy,
            key_prefix,
            worker_id,
            wait_ms: parse_env_u64("WARDEN_WAIT_MS", 0)?,
            lease_ms: parse_env_u64("WARDEN_LEASE_MS", 30_000)?,
            retry_interval_ms: parse_env_u64("WARDEN_RETRY_INTERVAL_MS", 100)?,
            work_ms: parse_env_u64("WARDEN_WORK_MS", 1_000)?,
            poll_interval_ms: parse_env_u64("WARDEN_POLL_INTERVAL_MS", 5_000)?,
        };
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> LockResult<()> {
        if self.redis_urls.is_empty() {
            return Err(LockError::Validation(
                "WARDEN_REDIS_URLS must name at least one store".to_owned(),
            ));
        }

        if self.lock_names.is_empty() {
            return Err(LockError::Validation(
                "WARDEN_LOCK_NAMES must name at least one lock".to_owned(),
            ));
        }

        let needs_one_name = self.strategy == LockStrategy::Single
            || (self.strategy == LockStrategy::Quorum && self.redis_urls.len() > 1);
        if needs_one_name && self.lock_names.len() != 1 {
            return Err(LockError::Validation(format!(
                "WARDEN_STRATEGY={} over {} store(s) takes exactly one lock name",
                self.strategy.as_str(),
                self.redis_urls.len()
            )));
        }

        if self.poll_interval_ms == 0 {
            return Err(LockError::Validation(
                "WARDEN_POLL_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        Ok(())
    }

    fn primary_lock_name(&self) -> &str {
        self.lock_names.first().map_or("", String::as_str)
    }

    fn lock_configuration(&self) -> LockResult<LockConfiguration> {
        LockConfiguration::builder(self.primary_lock_name())
            .wait_time(self.wait_ms)
            .lease_time(self.lease_ms)
            .time_unit(TimeUnit::Milliseconds)
            .retry_interval(Duration::from_millis(self.retry_interval_ms))
            .build()
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

fn required_env(name: &str) -> LockResult<String> {
    env::var(name).map_err(|_| LockError::Validation(format!("{name} is required")))
}

fn parse_env_u64(name: &str, default: u64) -> LockResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            LockError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
