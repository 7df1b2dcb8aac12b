mod handle;
mod primitive;

pub use handle::LockHandle;
pub use primitive::LockPrimitive;
