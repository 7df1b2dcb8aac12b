//! Redis-backed distributed lock primitive.
//!
//! Each lock is a hash keyed by `"{prefix}:{name}"` mapping owner tokens to
//! hold counts, with a millisecond TTL covering the whole key. Both scripts
//! run atomically on the server.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use warden_application::LockPrimitive;
use warden_core::{LockError, LockName, LockResult, OwnerToken};

const ACQUIRE_LOCK_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 or redis.call('HEXISTS', KEYS[1], ARGV[1]) == 1 then
  redis.call('HINCRBY', KEYS[1], ARGV[1], 1)
  redis.call('PEXPIRE', KEYS[1], ARGV[2])
  return 1
end
return 0
"#;

const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call('HEXISTS', KEYS[1], ARGV[1]) == 0 then
  return 0
end
if redis.call('HINCRBY', KEYS[1], ARGV[1], -1) > 0 then
  return 1
end
redis.call('DEL', KEYS[1])
return 1
"#;

/// Redis implementation of the lock primitive port.
#[derive(Clone)]
pub struct RedisLockPrimitive {
    client: redis::Client,
    key_prefix: String,
    acquire_script: Script,
    release_script: Script,
}

impl RedisLockPrimitive {
    /// Creates one primitive adapter.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
            acquire_script: Script::new(ACQUIRE_LOCK_SCRIPT),
            release_script: Script::new(RELEASE_LOCK_SCRIPT),
        }
    }

    /// Opens a client for `redis_url` and wraps it.
    pub fn open(redis_url: &str, key_prefix: impl Into<String>) -> LockResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|error| LockError::Validation(format!("invalid redis url: {error}")))?;
        Ok(Self::new(client, key_prefix))
    }

    fn key_for(&self, name: &LockName) -> String {
        format!("{}:{}", self.key_prefix, name.as_str())
    }

    async fn connection(&self) -> LockResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| LockError::StoreUnavailable(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl LockPrimitive for RedisLockPrimitive {
    async fn acquire(
        &self,
        name: &LockName,
        owner: OwnerToken,
        lease: Duration,
    ) -> LockResult<bool> {
        let lease_ms = u64::try_from(lease.as_millis())
            .map_err(|error| LockError::Validation(format!("invalid lock lease: {error}")))?;
        if lease_ms == 0 {
            return Err(LockError::Validation(format!(
                "lease for lock '{name}' must be at least one millisecond"
            )));
        }

        let mut connection = self.connection().await?;
        let acquired = self
            .acquire_script
            .key(self.key_for(name))
            .arg(owner.as_u64())
            .arg(lease_ms)
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                LockError::StoreUnavailable(format!("failed to acquire lock '{name}': {error}"))
            })?;

        Ok(acquired == 1)
    }

    async fn release(&self, name: &LockName, owner: OwnerToken) -> LockResult<bool> {
        let mut connection = self.connection().await?;
        let released = self
            .release_script
            .key(self.key_for(name))
            .arg(owner.as_u64())
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                LockError::StoreUnavailable(format!("failed to release lock '{name}': {error}"))
            })?;

        Ok(released == 1)
    }

    async fn is_locked(&self, name: &LockName) -> LockResult<bool> {
        let mut connection = self.connection().await?;
        connection
            .exists::<_, bool>(self.key_for(name))
            .await
            .map_err(|error| {
                LockError::StoreUnavailable(format!("failed to inspect lock '{name}': {error}"))
            })
    }
}
