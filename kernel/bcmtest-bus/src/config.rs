//! PCI configuration space access.
//!
//! [`ConfigSpace`] is the 32-bit register interface the BAR decoder and the
//! resource allocator read through. [`SimConfigSpace`] is a type 0 header
//! held in memory that answers BAR sizing probes like real hardware: writes
//! to a BAR are masked by its size and its type bits are read-only.

use core::fmt;

use bcmtest_core::sync::SpinLock;
use bcmtest_driver_api::pci::MAX_BARS;

/// Standard PCI configuration space register offsets.
pub mod regs {
    /// Vendor ID (16-bit, offset 0x00).
    pub const VENDOR_ID: u8 = 0x00;
    /// Device ID (16-bit, offset 0x02).
    pub const DEVICE_ID: u8 = 0x02;
    /// Command register (16-bit, offset 0x04).
    pub const COMMAND: u8 = 0x04;
    /// Revision ID (8-bit, offset 0x08).
    pub const REVISION: u8 = 0x08;
    /// Programming Interface (8-bit, offset 0x09).
    pub const PROG_IF: u8 = 0x09;
    /// Subclass code (8-bit, offset 0x0A).
    pub const SUBCLASS: u8 = 0x0A;
    /// Class code (8-bit, offset 0x0B).
    pub const CLASS: u8 = 0x0B;
    /// Header type (8-bit, offset 0x0E). Bit 7 = multi-function.
    pub const HEADER_TYPE: u8 = 0x0E;
    /// Base Address Register 0 (32-bit, offset 0x10). BAR1-5 at +4 intervals.
    pub const BAR0: u8 = 0x10;
    /// Subsystem Vendor ID (16-bit, offset 0x2C).
    pub const SUBSYSTEM_VENDOR_ID: u8 = 0x2C;
    /// Subsystem Device ID (16-bit, offset 0x2E).
    pub const SUBSYSTEM_DEVICE_ID: u8 = 0x2E;
}

/// 32-bit register access to one function's configuration space.
pub trait ConfigSpace: Send + Sync {
    /// Reads the dword containing `offset` (low two bits ignored).
    fn read_u32(&self, offset: u8) -> u32;

    /// Writes the dword containing `offset` (low two bits ignored).
    fn write_u32(&self, offset: u8, value: u32);

    /// Reads a 16-bit value from config space.
    fn read_u16(&self, offset: u8) -> u16 {
        let dword = self.read_u32(offset);
        // Extract the correct 16-bit half based on bit 1 of offset.
        let shift = u32::from(offset & 2) * 8;
        (dword >> shift) as u16
    }

    /// Reads an 8-bit value from config space.
    fn read_u8(&self, offset: u8) -> u8 {
        let dword = self.read_u32(offset);
        let shift = u32::from(offset & 3) * 8;
        (dword >> shift) as u8
    }
}

/// Rejected BAR layout passed to a [`SimConfigSpace`] builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    /// BAR index outside `0..MAX_BARS`, or a 64-bit BAR in the last slot.
    BadIndex(usize),
    /// The slot (or the upper slot of a 64-bit BAR) is already described.
    SlotInUse(usize),
    /// Size is not a power of two within the limits of the BAR type.
    BadSize(u64),
    /// Base is not aligned to the size.
    Misaligned {
        /// Requested base.
        base: u64,
        /// Requested size.
        size: u64,
    },
    /// The range does not fit the address width of the BAR type.
    OutOfRange(u64),
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadIndex(i) => write!(f, "BAR index {i} cannot hold this BAR"),
            Self::SlotInUse(i) => write!(f, "BAR slot {i} is already in use"),
            Self::BadSize(size) => write!(f, "invalid BAR size {size:#x}"),
            Self::Misaligned { base, size } => {
                write!(f, "BAR base {base:#x} is not aligned to its size {size:#x}")
            }
            Self::OutOfRange(base) => write!(f, "BAR base {base:#x} out of range"),
        }
    }
}

impl core::error::Error for LayoutError {}

/// Number of dwords in a conventional configuration space.
const CONFIG_DWORDS: usize = 64;

/// Dword index of BAR0.
const BAR0_DWORD: usize = regs::BAR0 as usize / 4;

/// Smallest memory BAR a PCI function may decode.
const MIN_MEMORY_BAR: u64 = 16;

/// In-memory type 0 configuration header.
pub struct SimConfigSpace {
    regs: SpinLock<[u32; CONFIG_DWORDS]>,
    /// Writable address bits of each BAR register.
    bar_masks: [u32; MAX_BARS],
    /// Read-only type bits of each BAR register.
    bar_fixed: [u32; MAX_BARS],
}

impl SimConfigSpace {
    /// Creates a header for a single-function device with no BARs.
    #[must_use]
    pub fn new(vendor: u16, device: u16) -> Self {
        let mut regs = [0u32; CONFIG_DWORDS];
        regs[0] = (u32::from(device) << 16) | u32::from(vendor);
        Self {
            regs: SpinLock::named("config", regs),
            bar_masks: [0; MAX_BARS],
            bar_fixed: [0; MAX_BARS],
        }
    }

    /// Sets the class code, subclass, programming interface and revision.
    #[must_use]
    pub fn with_class(self, class: u8, subclass: u8, prog_if: u8, revision: u8) -> Self {
        self.regs.lock()[usize::from(regs::REVISION) / 4] = u32::from_be_bytes([
            class, subclass, prog_if, revision,
        ]);
        self
    }

    /// Sets the subsystem vendor and device ids.
    #[must_use]
    pub fn with_subsystem(self, vendor: u16, device: u16) -> Self {
        self.regs.lock()[usize::from(regs::SUBSYSTEM_VENDOR_ID) / 4] =
            (u32::from(device) << 16) | u32::from(vendor);
        self
    }

    /// Describes a memory BAR at slot `index`.
    ///
    /// A 64-bit BAR also occupies slot `index + 1`.
    ///
    /// # Errors
    ///
    /// Returns a [`LayoutError`] if the slot is unavailable, `size` is not a
    /// power of two of at least 16 bytes, `base` is not size-aligned, or a
    /// 32-bit BAR would extend past 4 GiB.
    pub fn with_memory_bar(
        mut self,
        index: usize,
        base: u64,
        size: u64,
        prefetchable: bool,
        is_64bit: bool,
    ) -> Result<Self, LayoutError> {
        let slots = if is_64bit { 2 } else { 1 };
        if index.checked_add(slots).is_none_or(|end| end > MAX_BARS) {
            return Err(LayoutError::BadIndex(index));
        }
        for slot in index..index + slots {
            if self.slot_in_use(slot) {
                return Err(LayoutError::SlotInUse(slot));
            }
        }
        if size < MIN_MEMORY_BAR || !size.is_power_of_two() || (!is_64bit && size > 1 << 31) {
            return Err(LayoutError::BadSize(size));
        }
        if base % size != 0 {
            return Err(LayoutError::Misaligned { base, size });
        }
        if !is_64bit && base.checked_add(size).is_none_or(|end| end > 1 << 32) {
            return Err(LayoutError::OutOfRange(base));
        }

        let mut fixed = 0;
        if prefetchable {
            fixed |= 0x08;
        }
        if is_64bit {
            fixed |= 0x04;
        }
        let mask = !(size - 1);

        self.bar_masks[index] = (mask as u32) & !0x0F;
        self.bar_fixed[index] = fixed;
        let mut regs = self.regs.lock();
        regs[BAR0_DWORD + index] = ((base as u32) & !0x0F) | fixed;
        if is_64bit {
            self.bar_masks[index + 1] = (mask >> 32) as u32;
            regs[BAR0_DWORD + index + 1] = (base >> 32) as u32;
        }
        drop(regs);
        Ok(self)
    }

    /// Describes an I/O port BAR at slot `index`.
    ///
    /// # Errors
    ///
    /// Returns a [`LayoutError`] if the slot is unavailable, `size` is not a
    /// power of two between 4 and 256 bytes, `base` is not size-aligned, or
    /// the range leaves the 64 KiB port space.
    pub fn with_io_bar(mut self, index: usize, base: u32, size: u32) -> Result<Self, LayoutError> {
        if index >= MAX_BARS {
            return Err(LayoutError::BadIndex(index));
        }
        if self.slot_in_use(index) {
            return Err(LayoutError::SlotInUse(index));
        }
        if !(4..=256).contains(&size) || !size.is_power_of_two() {
            return Err(LayoutError::BadSize(u64::from(size)));
        }
        if base % size != 0 {
            return Err(LayoutError::Misaligned {
                base: u64::from(base),
                size: u64::from(size),
            });
        }
        if u64::from(base) + u64::from(size) > 0x1_0000 {
            return Err(LayoutError::OutOfRange(u64::from(base)));
        }

        self.bar_masks[index] = !(size - 1) & !0x03;
        self.bar_fixed[index] = 0x01;
        self.regs.lock()[BAR0_DWORD + index] = base | 0x01;
        Ok(self)
    }

    fn slot_in_use(&self, slot: usize) -> bool {
        self.bar_masks[slot] != 0 || self.bar_fixed[slot] != 0
    }
}

impl ConfigSpace for SimConfigSpace {
    fn read_u32(&self, offset: u8) -> u32 {
        self.regs.lock()[usize::from(offset >> 2)]
    }

    fn write_u32(&self, offset: u8, value: u32) {
        let dword = usize::from(offset >> 2);
        let mut regs = self.regs.lock();
        match dword {
            d if (BAR0_DWORD..BAR0_DWORD + MAX_BARS).contains(&d) => {
                let slot = d - BAR0_DWORD;
                regs[d] = (value & self.bar_masks[slot]) | self.bar_fixed[slot];
            }
            // Command is writable; status (upper half) is not.
            1 => regs[1] = (regs[1] & 0xFFFF_0000) | (value & 0xFFFF),
            _ => {}
        }
    }
}

impl fmt::Debug for SimConfigSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimConfigSpace")
            .field("vendor", &format_args!("{:#06x}", self.read_u16(regs::VENDOR_ID)))
            .field("device", &format_args!("{:#06x}", self.read_u16(regs::DEVICE_ID)))
            .finish_non_exhaustive()
    }
}
