//! Synchronization primitives.
//!
//! Provides [`SpinLock`], suitable for `static` items and for the short
//! critical sections of the device tables.

mod spinlock;

pub(crate) mod loom_compat;

pub use spinlock::{SpinLock, SpinLockGuard};
