//! Test driver for the Broadcom BCM43A0 wireless card.
//!
//! The driver matches one vendor/device pair, claims a configurable set of
//! memory BARs, and publishes a `test<unit>` character device whose read and
//! write entry points are stubs. Its value is the lifecycle: resources are
//! claimed all-or-nothing at attach and the node is withdrawn before anything
//! is released at detach.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod bars;
pub mod cdev;
pub mod config;
pub mod controller;
pub mod probe;
pub mod softc;

pub use config::{ConfigError, DriverConfig};
pub use controller::LifecycleController;
pub use probe::probe;

/// Name the driver registers under.
pub const DRIVER_NAME: &str = "test";
