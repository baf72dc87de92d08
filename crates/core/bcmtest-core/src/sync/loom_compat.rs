//! Loom compatibility shim.
//!
//! When compiled with `cfg(loom)`, re-exports loom's atomics and yields to
//! loom's scheduler while spinning. Otherwise, re-exports the standard
//! `core::sync::atomic` types and `core::hint::spin_loop`.

// ---------------------------------------------------------------------------
// Loom mode
// ---------------------------------------------------------------------------

#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicBool, Ordering};

/// Spin-wait hint; a scheduler yield under loom.
#[cfg(loom)]
#[inline]
pub(crate) fn spin_loop() {
    loom::thread::yield_now();
}

// ---------------------------------------------------------------------------
// Normal mode
// ---------------------------------------------------------------------------

#[cfg(not(loom))]
pub(crate) use core::sync::atomic::{AtomicBool, Ordering};

/// Spin-wait hint.
#[cfg(not(loom))]
#[inline]
pub(crate) fn spin_loop() {
    core::hint::spin_loop();
}
