//! The set of BARs one device instance holds.
//!
//! Acquisition is all-or-nothing: if any BAR fails, every BAR already taken
//! is released again, newest first, before the error is returned. Release
//! also runs newest first.

use alloc::vec::Vec;

use bcmtest_core::kerr;
use bcmtest_driver_api::bus::BusResources;
use bcmtest_driver_api::diag::{DiagEvent, DiagSink};
use bcmtest_driver_api::error::{DriverError, ResourceError};
use bcmtest_driver_api::pci::PciAddress;
use bcmtest_driver_api::resource::{ResourceFlags, ResourceHandle};

/// Claimed BARs, in acquisition order.
#[derive(Debug, Default)]
pub struct BarSet {
    handles: Vec<ResourceHandle>,
}

impl BarSet {
    /// Claims every BAR in `bars` on `device`.
    ///
    /// # Errors
    ///
    /// [`DriverError::ResourceUnavailable`] if any BAR cannot be claimed;
    /// nothing stays reserved in that case.
    pub fn acquire(
        bus: &dyn BusResources,
        device: PciAddress,
        bars: &[u8],
        flags: ResourceFlags,
        sink: &dyn DiagSink,
    ) -> Result<Self, DriverError> {
        let mut set = Self {
            handles: Vec::with_capacity(bars.len()),
        };
        for &bar in bars {
            match bus.reserve_memory_bar(device, bar, flags) {
                Ok(handle) => {
                    sink.emit(DiagEvent::BarMapped {
                        bar,
                        id: handle.id(),
                        phys: handle.phys_base(),
                        virt: handle.region().virt_base(),
                        size: handle.size(),
                    });
                    set.handles.push(handle);
                }
                Err(error) => {
                    sink.emit(DiagEvent::BarUnavailable { bar, error });
                    // The unwind's own failure, if any, is already logged.
                    let _ = set.release_all(bus, sink);
                    return Err(error.into());
                }
            }
        }
        Ok(set)
    }

    /// Releases every BAR, newest first.
    ///
    /// Keeps going past failures and returns the first one.
    ///
    /// # Errors
    ///
    /// The first [`ResourceError`] reported by the allocator.
    pub fn release_all(
        self,
        bus: &dyn BusResources,
        sink: &dyn DiagSink,
    ) -> Result<(), ResourceError> {
        let mut first_err = None;
        for handle in self.handles.into_iter().rev() {
            let bar = handle.bar();
            let phys = handle.phys_base();
            let id = handle.id();
            match bus.release(handle) {
                Ok(()) => sink.emit(DiagEvent::BarReleased { bar, phys }),
                Err(e) => {
                    kerr!("BAR{}: release of {} failed: {}", bar, id, e);
                    first_err.get_or_insert(e);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// The handle for BAR index `bar`, if claimed.
    #[must_use]
    pub fn get(&self, bar: u8) -> Option<&ResourceHandle> {
        self.handles.iter().find(|h| h.bar() == bar)
    }

    /// Iterates the handles in acquisition order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceHandle> {
        self.handles.iter()
    }

    /// Number of claimed BARs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns `true` if no BAR is claimed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
