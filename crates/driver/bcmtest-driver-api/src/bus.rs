//! Bus resource allocator contract.
//!
//! Drivers receive a [`BusResources`] implementation at attach time and use
//! it to claim and give back BAR regions, without depending on how the host
//! decodes configuration space or maps memory.

use crate::error::ResourceError;
use crate::pci::PciAddress;
use crate::resource::{ResourceFlags, ResourceHandle};

/// Trait providing bus resource allocation to drivers.
pub trait BusResources: Send + Sync {
    /// Reserves and maps the memory BAR `bar` of `device`.
    ///
    /// The allocator determines both base and size from the BAR's
    /// configuration-space encoding; any free, non-overlapping range is
    /// acceptable.
    ///
    /// # Errors
    ///
    /// [`ResourceError::InvalidBar`] for an index outside `0..MAX_BARS`,
    /// [`ResourceError::NotMemory`] for an I/O BAR, and
    /// [`ResourceError::Unavailable`] if the BAR describes no resource or
    /// the range is already reserved.
    fn reserve_memory_bar(
        &self,
        device: PciAddress,
        bar: u8,
        flags: ResourceFlags,
    ) -> Result<ResourceHandle, ResourceError>;

    /// Relinquishes a reservation, consuming its handle.
    ///
    /// # Errors
    ///
    /// [`ResourceError::NotReserved`] if the allocator has no record of the
    /// handle's reservation.
    fn release(&self, handle: ResourceHandle) -> Result<(), ResourceError>;
}
