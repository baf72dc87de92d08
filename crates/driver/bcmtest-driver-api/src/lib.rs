//! Driver model types and traits for the bcmtest PCI driver.
//!
//! This crate sits between the driver and whatever hosts it:
//!
//! - **Identity** -- [`PciDeviceInfo`], [`PciDeviceId`] and decoded [`PciBar`]s.
//! - **Resources** -- [`ResourceHandle`], an exclusive, mapped claim on one
//!   memory BAR, handed out and taken back by a [`BusResources`] allocator.
//! - **Lifecycle** -- [`DeviceMethods`], the probe/attach/detach and power
//!   hooks a framework invokes on one device binding.
//! - **User surface** -- [`CharDevice`], the open/close/read/write entry points
//!   published under a device-node name.
//! - **Diagnostics** -- [`DiagEvent`]s emitted through a [`DiagSink`], kept apart
//!   from every operation's result.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod bus;
pub mod chardev;
pub mod diag;
pub mod driver;
pub mod error;
pub mod pci;
pub mod resource;

// Re-export all public types at the crate root for ergonomic imports.
pub use bus::BusResources;
pub use chardev::{CdevHandle, CdevRegistry, CharDevice};
pub use diag::{DiagEvent, DiagRecorder, DiagSink, LogSink};
pub use driver::{DeviceMethods, LifecycleState, PowerState, ProbeResult};
pub use error::{DriverError, IoError, ResourceError};
pub use pci::{MAX_BARS, PciAddress, PciBar, PciDeviceId, PciDeviceInfo};
pub use resource::{MmioRegion, MmioWindow, ResourceFlags, ResourceHandle, ResourceId};
