//! Lock store adapters for the application lock primitive port.

#![forbid(unsafe_code)]

mod in_memory_lock_primitive;
mod redis_lock_primitive;

pub use in_memory_lock_primitive::InMemoryLockPrimitive;
pub use redis_lock_primitive::RedisLockPrimitive;
