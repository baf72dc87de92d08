//! Host stand-ins for everything around a PCI driver.
//!
//! - [`config`] -- per-function configuration space, with BAR sizing
//!   emulated the way hardware answers it.
//! - [`enumerate`] -- BAR decoding and device-info reads over a
//!   [`ConfigSpace`](config::ConfigSpace).
//! - [`sim`] -- [`SimBus`], the memory-resource allocator handed to drivers.
//! - [`cdevsw`] -- [`CdevSwitch`], the table resolving device-node handles.
//! - [`manager`] -- [`DeviceManager`], which probes, attaches and tears down
//!   bindings in the order a kernel would.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod cdevsw;
pub mod config;
pub mod enumerate;
pub mod manager;
pub mod sim;

pub use cdevsw::CdevSwitch;
pub use config::{ConfigSpace, LayoutError, SimConfigSpace};
pub use manager::{BindContext, BindingSummary, DeviceManager, DriverEntry, ProbeReport};
pub use sim::{PlugError, SimBus};
