//! Diagnostic events.
//!
//! Every lifecycle and I/O operation reports what it did through a
//! [`DiagSink`], separately from its return value. [`LogSink`] turns events
//! into log lines; [`DiagRecorder`] keeps them for inspection.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{self, Write as _};

use bcmtest_core::sync::SpinLock;
use bcmtest_core::{PhysAddr, VirtAddr, kdebug, kinfo, kwarn};

use crate::error::ResourceError;
use crate::pci::PciAddress;
use crate::resource::ResourceId;

/// One diagnostic occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagEvent {
    /// Probe was asked about a candidate.
    Probing {
        /// Candidate address.
        address: PciAddress,
        /// Reported vendor id.
        vendor: u16,
        /// Reported device id.
        device: u16,
    },
    /// Probe matched the candidate.
    ProbeMatched {
        /// Device description.
        description: &'static str,
    },
    /// Attach started.
    Attaching {
        /// Combined `(device << 16) | vendor` id.
        devid: u32,
    },
    /// A BAR was reserved and mapped.
    BarMapped {
        /// BAR index.
        bar: u8,
        /// Reservation id.
        id: ResourceId,
        /// Physical base.
        phys: PhysAddr,
        /// Mapped virtual base.
        virt: VirtAddr,
        /// Size in bytes.
        size: u64,
    },
    /// A BAR could not be reserved.
    BarUnavailable {
        /// BAR index.
        bar: u8,
        /// Allocator error.
        error: ResourceError,
    },
    /// A BAR reservation was given back.
    BarReleased {
        /// BAR index.
        bar: u8,
        /// Physical base.
        phys: PhysAddr,
    },
    /// Attach completed and the node was published.
    Attached {
        /// Node name.
        node: String,
    },
    /// Detach completed.
    Detached {
        /// Node name.
        node: String,
    },
    /// Shutdown hook ran.
    Shutdown,
    /// Suspend hook ran.
    Suspended,
    /// Resume hook ran.
    Resumed,
    /// Device node opened.
    Opened {
        /// Node name.
        node: String,
    },
    /// Device node closed.
    Closed {
        /// Node name.
        node: String,
    },
    /// Read requested on the node.
    ReadRequested {
        /// Node name.
        node: String,
        /// Requested length in bytes.
        len: usize,
    },
    /// Write requested on the node.
    WriteRequested {
        /// Node name.
        node: String,
        /// Requested length in bytes.
        len: usize,
    },
}

impl fmt::Display for DiagEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Probing {
                address,
                vendor,
                device,
            } => write!(
                f,
                "probe {address}: Vendor ID : {vendor:#x} Device ID : {device:#x}"
            ),
            Self::ProbeMatched { description } => {
                f.write_str("Probe Function found The Broadcom Wifi pci_card ")?;
                for c in description.chars() {
                    f.write_char(c.to_ascii_uppercase())?;
                }
                f.write_char('.')
            }
            Self::Attaching { devid } => {
                write!(f, "test pci device trying to attach to deviceID: {devid:#X}")
            }
            Self::BarMapped {
                bar,
                id,
                phys,
                virt,
                size,
            } => write!(
                f,
                "BAR{bar}: resource {id}, physical memory starts at {phys}, \
                 virtual memory is at {virt}, size of memory is {size}"
            ),
            Self::BarUnavailable { bar, error } => {
                write!(f, "BAR{bar}: memory resource failed to be allocated: {error}")
            }
            Self::BarReleased { bar, phys } => write!(f, "BAR{bar}: released {phys}"),
            Self::Attached { node } => write!(f, "{node}: test device attached"),
            Self::Detached { node } => write!(f, "{node}: test pci device detached"),
            Self::Shutdown => f.write_str("test pci device shutdown"),
            Self::Suspended => f.write_str("test pci device suspend"),
            Self::Resumed => f.write_str("test pci device resume"),
            Self::Opened { node } => write!(f, "{node}: test device opened"),
            Self::Closed { node } => write!(f, "{node}: test device closed"),
            Self::ReadRequested { node, len } => write!(f, "{node}: asked to read {len} bytes"),
            Self::WriteRequested { node, len } => {
                write!(f, "{node}: asked to write {len} bytes")
            }
        }
    }
}

/// Receiver of diagnostic events.
///
/// Emitting must never fail or block for long; sinks are called from inside
/// lifecycle callbacks and I/O entry points.
pub trait DiagSink: Send + Sync {
    /// Records one event.
    fn emit(&self, event: DiagEvent);
}

/// A [`DiagSink`] that forwards every event to the global logger.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagSink for LogSink {
    fn emit(&self, event: DiagEvent) {
        match event {
            DiagEvent::BarUnavailable { .. } => kwarn!("{}", event),
            DiagEvent::Attaching { .. }
            | DiagEvent::BarMapped { .. }
            | DiagEvent::BarReleased { .. }
            | DiagEvent::Probing { .. } => kdebug!("{}", event),
            _ => kinfo!("{}", event),
        }
    }
}

/// A [`DiagSink`] that stores events in order.
#[derive(Debug, Default)]
pub struct DiagRecorder {
    events: SpinLock<Vec<DiagEvent>>,
}

impl DiagRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<DiagEvent> {
        self.events.lock().clone()
    }

    /// Removes and returns the recorded events.
    pub fn take(&self) -> Vec<DiagEvent> {
        core::mem::take(&mut *self.events.lock())
    }

    /// Counts recorded events matching `pred`.
    pub fn count(&self, pred: impl Fn(&DiagEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

impl DiagSink for DiagRecorder {
    fn emit(&self, event: DiagEvent) {
        self.events.lock().push(event);
    }
}
