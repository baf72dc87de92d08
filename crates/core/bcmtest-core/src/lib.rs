//! Core types, logging and synchronization primitives shared by the
//! bcmtest driver crates.
//!
//! - [`log`] -- leveled logging through a replaceable global log function.
//! - [`sync`] -- [`SpinLock`](sync::SpinLock) for short critical sections.
//! - [`addr`] -- [`PhysAddr`] / [`VirtAddr`] newtypes.

#![cfg_attr(not(test), no_std)]

pub mod addr;
pub mod log;
pub mod sync;

pub use addr::{PhysAddr, VirtAddr};
