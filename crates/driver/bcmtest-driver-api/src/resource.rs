//! Hardware resource types representing exclusive claims on memory BARs.

use alloc::sync::Arc;
use core::fmt;

use bcmtest_core::{PhysAddr, VirtAddr};

use crate::error::ResourceError;
use crate::pci::PciAddress;

bitflags::bitflags! {
    /// Allocation flags passed with a resource request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResourceFlags: u32 {
        /// Activate (map) the resource as part of the reservation.
        const ACTIVE = 1 << 1;
        /// The range may be shared with other reservations.
        const SHAREABLE = 1 << 2;
        /// Map the range prefetchable, if the BAR allows it.
        const PREFETCHABLE = 1 << 3;
    }
}

impl Default for ResourceFlags {
    fn default() -> Self {
        Self::ACTIVE
    }
}

/// Allocator-assigned identifier of one reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ResourceId(u32);

impl ResourceId {
    /// Creates a new `ResourceId`.
    #[must_use]
    pub const fn new(val: u32) -> Self {
        Self(val)
    }

    /// Returns the raw `u32` value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res#{}", self.0)
    }
}

/// Raw 16-bit access to the memory behind a mapped region.
///
/// Implemented by whatever backs a mapping: volatile pointer access on real
/// hardware, a simulated register file on the host. Callers go through
/// [`MmioRegion`], which guarantees that `offset` is 2-byte aligned and that
/// `offset + 2` does not exceed the region size.
pub trait MmioWindow: Send + Sync {
    /// Virtual address at which the window is mapped.
    fn virt_base(&self) -> VirtAddr;

    /// Reads the 16-bit value at `offset`.
    fn read_u16(&self, offset: u64) -> u16;

    /// Writes the 16-bit `value` at `offset`.
    fn write_u16(&self, offset: u64, value: u16);
}

/// A mapped memory-mapped I/O region.
pub struct MmioRegion {
    phys_base: PhysAddr,
    size: u64,
    window: Arc<dyn MmioWindow>,
}

impl MmioRegion {
    /// Creates a new MMIO region descriptor.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    /// - `window` maps the physical range `[phys_base, phys_base + size)`.
    /// - The region is not claimed by another driver.
    /// - The mapping stays valid for the lifetime of the region.
    #[must_use]
    pub unsafe fn new(phys_base: PhysAddr, size: u64, window: Arc<dyn MmioWindow>) -> Self {
        Self {
            phys_base,
            size,
            window,
        }
    }

    /// Returns the physical base address.
    #[must_use]
    pub const fn phys_base(&self) -> PhysAddr {
        self.phys_base
    }

    /// Returns the virtual base address of the mapping.
    #[must_use]
    pub fn virt_base(&self) -> VirtAddr {
        self.window.virt_base()
    }

    /// Returns the size of the region in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Validates a 16-bit access at `offset`.
    fn check_u16(&self, offset: u64) -> Result<(), ResourceError> {
        if offset % 2 != 0 {
            return Err(ResourceError::Misaligned);
        }
        match offset.checked_add(2) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(ResourceError::OutOfBounds),
        }
    }

    /// Reads the 16-bit value at `offset`.
    ///
    /// # Errors
    ///
    /// [`ResourceError::Misaligned`] for odd offsets,
    /// [`ResourceError::OutOfBounds`] if the access leaves `[0, size)`.
    pub fn read_u16(&self, offset: u64) -> Result<u16, ResourceError> {
        self.check_u16(offset)?;
        Ok(self.window.read_u16(offset))
    }

    /// Writes the 16-bit `value` at `offset`.
    ///
    /// # Errors
    ///
    /// Same as [`read_u16`](Self::read_u16).
    pub fn write_u16(&self, offset: u64, value: u16) -> Result<(), ResourceError> {
        self.check_u16(offset)?;
        self.window.write_u16(offset, value);
        Ok(())
    }
}

impl fmt::Debug for MmioRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MmioRegion")
            .field("phys_base", &self.phys_base)
            .field("virt_base", &self.virt_base())
            .field("size", &self.size)
            .finish()
    }
}

/// An exclusive, active claim on one memory BAR of one device.
///
/// Deliberately neither `Clone` nor `Copy`: the only way to give the claim
/// back is to move the handle into [`BusResources::release`](crate::BusResources::release).
#[derive(Debug)]
pub struct ResourceHandle {
    id: ResourceId,
    owner: PciAddress,
    bar: u8,
    flags: ResourceFlags,
    region: MmioRegion,
}

impl ResourceHandle {
    /// Creates a handle for a completed reservation.
    ///
    /// # Safety
    ///
    /// Only a resource allocator may call this, after recording `id` as the
    /// exclusive reservation of `region` for `owner`'s BAR `bar`.
    #[must_use]
    pub unsafe fn new(
        id: ResourceId,
        owner: PciAddress,
        bar: u8,
        flags: ResourceFlags,
        region: MmioRegion,
    ) -> Self {
        Self {
            id,
            owner,
            bar,
            flags,
            region,
        }
    }

    /// Returns the allocator-assigned reservation id.
    #[must_use]
    pub const fn id(&self) -> ResourceId {
        self.id
    }

    /// Returns the device the resource belongs to.
    #[must_use]
    pub const fn owner(&self) -> PciAddress {
        self.owner
    }

    /// Returns the BAR index (0-5).
    #[must_use]
    pub const fn bar(&self) -> u8 {
        self.bar
    }

    /// Returns the flags the resource was reserved with.
    #[must_use]
    pub const fn flags(&self) -> ResourceFlags {
        self.flags
    }

    /// Returns the physical base address.
    #[must_use]
    pub const fn phys_base(&self) -> PhysAddr {
        self.region.phys_base()
    }

    /// Returns the size of the region in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.region.size()
    }

    /// Returns the mapped region.
    #[must_use]
    pub const fn region(&self) -> &MmioRegion {
        &self.region
    }

    /// Reads the 16-bit value at `offset` within the BAR.
    ///
    /// # Errors
    ///
    /// See [`MmioRegion::read_u16`].
    pub fn read_u16(&self, offset: u64) -> Result<u16, ResourceError> {
        self.region.read_u16(offset)
    }

    /// Writes the 16-bit `value` at `offset` within the BAR.
    ///
    /// # Errors
    ///
    /// See [`MmioRegion::write_u16`].
    pub fn write_u16(&self, offset: u64, value: u16) -> Result<(), ResourceError> {
        self.region.write_u16(offset, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Byte-addressed test window.
    struct VecWindow(Mutex<Vec<u8>>);

    impl MmioWindow for VecWindow {
        fn virt_base(&self) -> VirtAddr {
            VirtAddr::new(0xFFFF_8000_0000_0000)
        }

        fn read_u16(&self, offset: u64) -> u16 {
            let mem = self.0.lock().unwrap();
            let i = offset as usize;
            u16::from_le_bytes([mem[i], mem[i + 1]])
        }

        fn write_u16(&self, offset: u64, value: u16) {
            let mut mem = self.0.lock().unwrap();
            let i = offset as usize;
            mem[i..i + 2].copy_from_slice(&value.to_le_bytes());
        }
    }

    fn region(size: u64) -> MmioRegion {
        let window = Arc::new(VecWindow(Mutex::new(vec![0; size as usize])));
        // SAFETY: test-only, no real hardware.
        unsafe { MmioRegion::new(PhysAddr::new(0xF000_0000), size, window) }
    }

    #[test]
    fn region_basics() {
        let region = region(4096);
        assert_eq!(region.phys_base(), PhysAddr::new(0xF000_0000));
        assert_eq!(region.size(), 4096);
        assert_eq!(region.virt_base(), VirtAddr::new(0xFFFF_8000_0000_0000));
    }

    #[test]
    fn write_then_read_back() {
        let region = region(4096);
        region.write_u16(0x10, 0x1234).unwrap();
        assert_eq!(region.read_u16(0x10), Ok(0x1234));
        assert_eq!(region.read_u16(0x12), Ok(0));
    }

    #[test]
    fn last_halfword_is_accessible() {
        let region = region(4096);
        assert!(region.write_u16(4094, 0xBEEF).is_ok());
        assert_eq!(region.read_u16(4094), Ok(0xBEEF));
    }

    #[test]
    fn out_of_bounds_is_rejected() {
        let region = region(4096);
        assert_eq!(region.read_u16(4096), Err(ResourceError::OutOfBounds));
        assert_eq!(region.write_u16(u64::MAX - 1, 1), Err(ResourceError::OutOfBounds));
    }

    #[test]
    fn odd_offset_is_rejected() {
        let region = region(4096);
        assert_eq!(region.read_u16(0x11), Err(ResourceError::Misaligned));
    }

    #[test]
    fn default_flags_are_active() {
        assert_eq!(ResourceFlags::default(), ResourceFlags::ACTIVE);
    }

    #[test]
    fn handle_exposes_claim() {
        // SAFETY: test-only, no real hardware.
        let handle = unsafe {
            ResourceHandle::new(
                ResourceId::new(7),
                PciAddress::new(0, 3, 0),
                2,
                ResourceFlags::ACTIVE,
                region(256),
            )
        };
        assert_eq!(handle.id(), ResourceId::new(7));
        assert_eq!(handle.bar(), 2);
        assert_eq!(handle.size(), 256);
        handle.write_u16(0, 0xAA55).unwrap();
        assert_eq!(handle.read_u16(0), Ok(0xAA55));
        assert_eq!(handle.id().to_string(), "res#7");
    }
}
