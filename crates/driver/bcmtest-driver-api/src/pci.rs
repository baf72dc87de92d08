//! PCI bus types for device identification and driver matching.

use core::fmt;
use core::str::FromStr;

/// Number of BAR slots in a type 0 configuration header.
pub const MAX_BARS: usize = 6;

/// PCI bus/device/function address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PciAddress {
    /// Bus number (0-255).
    pub bus: u8,
    /// Device number (0-31).
    pub device: u8,
    /// Function number (0-7).
    pub function: u8,
}

impl PciAddress {
    /// Creates a new address.
    #[must_use]
    pub const fn new(bus: u8, device: u8, function: u8) -> Self {
        Self {
            bus,
            device,
            function,
        }
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}:{:02x}.{}", self.bus, self.device, self.function)
    }
}

/// Error returned when parsing a `bb:dd.f` address fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseAddressError;

impl fmt::Display for ParseAddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("expected a PCI address of the form bb:dd.f")
    }
}

impl core::error::Error for ParseAddressError {}

impl FromStr for PciAddress {
    type Err = ParseAddressError;

    /// Parses the `bb:dd.f` form printed by [`Display`](fmt::Display).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (bus, rest) = s.split_once(':').ok_or(ParseAddressError)?;
        let (device, function) = rest.split_once('.').ok_or(ParseAddressError)?;
        let bus = u8::from_str_radix(bus, 16).map_err(|_| ParseAddressError)?;
        let device = u8::from_str_radix(device, 16).map_err(|_| ParseAddressError)?;
        let function = function.parse::<u8>().map_err(|_| ParseAddressError)?;
        if device > 31 || function > 7 {
            return Err(ParseAddressError);
        }
        Ok(Self::new(bus, device, function))
    }
}

/// Wildcard value for PCI ID matching: matches any vendor/device ID.
pub const PCI_ANY_ID: u16 = 0xFFFF;

/// PCI device ID for driver-to-device matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciDeviceId {
    /// Vendor ID (`PCI_ANY_ID` = wildcard).
    pub vendor: u16,
    /// Device ID (`PCI_ANY_ID` = wildcard).
    pub device: u16,
    /// Subsystem vendor ID (`PCI_ANY_ID` = wildcard).
    pub subvendor: u16,
    /// Subsystem device ID (`PCI_ANY_ID` = wildcard).
    pub subdevice: u16,
}

impl PciDeviceId {
    /// Creates an ID entry matching a specific vendor/device pair.
    #[must_use]
    pub const fn new(vendor: u16, device: u16) -> Self {
        Self {
            vendor,
            device,
            subvendor: PCI_ANY_ID,
            subdevice: PCI_ANY_ID,
        }
    }

    /// Returns `true` if this ID entry matches the given device info.
    #[must_use]
    pub fn matches(&self, info: &PciDeviceInfo) -> bool {
        if self.vendor != PCI_ANY_ID && self.vendor != info.vendor_id {
            return false;
        }
        if self.device != PCI_ANY_ID && self.device != info.device_id {
            return false;
        }
        if self.subvendor != PCI_ANY_ID && self.subvendor != info.subsystem_vendor_id {
            return false;
        }
        if self.subdevice != PCI_ANY_ID && self.subdevice != info.subsystem_device_id {
            return false;
        }
        true
    }
}

/// Decoded PCI Base Address Register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PciBar {
    /// Memory-mapped BAR.
    Memory {
        /// Base physical address.
        base: u64,
        /// Size in bytes.
        size: u64,
        /// Whether the region is prefetchable.
        prefetchable: bool,
        /// Whether this is a 64-bit BAR (consumes two BAR slots).
        is_64bit: bool,
    },
    /// I/O port BAR.
    Io {
        /// Base I/O port address.
        base: u32,
        /// Size in bytes.
        size: u32,
    },
    /// BAR slot is unused or consumed by the upper half of a 64-bit BAR.
    Unused,
}

impl PciBar {
    /// Returns `(base, size)` for a memory BAR.
    #[must_use]
    pub const fn memory_range(&self) -> Option<(u64, u64)> {
        match *self {
            Self::Memory { base, size, .. } => Some((base, size)),
            _ => None,
        }
    }
}

/// Full information about a discovered PCI device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciDeviceInfo {
    /// Bus/device/function address.
    pub address: PciAddress,
    /// Vendor ID.
    pub vendor_id: u16,
    /// Device ID.
    pub device_id: u16,
    /// Revision ID.
    pub revision: u8,
    /// Programming interface byte.
    pub prog_if: u8,
    /// Subclass code.
    pub subclass: u8,
    /// Class code.
    pub class: u8,
    /// Header type (bits 0-6), multi-function flag (bit 7).
    pub header_type: u8,
    /// Subsystem vendor ID.
    pub subsystem_vendor_id: u16,
    /// Subsystem device ID.
    pub subsystem_device_id: u16,
    /// Base Address Registers.
    pub bars: [PciBar; MAX_BARS],
}

impl PciDeviceInfo {
    /// Returns the combined 32-bit device id: `(device << 16) | vendor`.
    #[must_use]
    pub const fn devid(&self) -> u32 {
        ((self.device_id as u32) << 16) | self.vendor_id as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_device_info(vendor: u16, device: u16) -> PciDeviceInfo {
        PciDeviceInfo {
            address: PciAddress::new(0, 3, 0),
            vendor_id: vendor,
            device_id: device,
            revision: 0,
            prog_if: 0,
            subclass: 0x80,
            class: 0x02,
            header_type: 0,
            subsystem_vendor_id: 0,
            subsystem_device_id: 0,
            bars: [PciBar::Unused; MAX_BARS],
        }
    }

    #[test]
    fn exact_vendor_device_match() {
        let id = PciDeviceId::new(0x14e4, 0x43a0);
        assert!(id.matches(&make_device_info(0x14e4, 0x43a0)));
    }

    #[test]
    fn vendor_mismatch() {
        let id = PciDeviceId::new(0x14e4, 0x43a0);
        assert!(!id.matches(&make_device_info(0x8086, 0x43a0)));
    }

    #[test]
    fn device_mismatch() {
        let id = PciDeviceId::new(0x14e4, 0x43a0);
        assert!(!id.matches(&make_device_info(0x14e4, 0x43a1)));
    }

    #[test]
    fn wildcard_vendor() {
        let id = PciDeviceId {
            vendor: PCI_ANY_ID,
            ..PciDeviceId::new(0, 0x43a0)
        };
        assert!(id.matches(&make_device_info(0x1234, 0x43a0)));
    }

    #[test]
    fn subsystem_mismatch() {
        let id = PciDeviceId {
            subvendor: 0x1028,
            ..PciDeviceId::new(0x14e4, 0x43a0)
        };
        assert!(!id.matches(&make_device_info(0x14e4, 0x43a0)));
    }

    #[test]
    fn devid_packs_device_over_vendor() {
        assert_eq!(make_device_info(0x14e4, 0x43a0).devid(), 0x43a0_14e4);
    }

    #[test]
    fn address_display_and_parse_agree() {
        let addr = PciAddress::new(0x0a, 0x1f, 7);
        assert_eq!(addr.to_string(), "0a:1f.7");
        assert_eq!("0a:1f.7".parse::<PciAddress>(), Ok(addr));
    }

    #[test]
    fn address_parse_rejects_out_of_range() {
        assert!("00:20.0".parse::<PciAddress>().is_err());
        assert!("00:01.8".parse::<PciAddress>().is_err());
        assert!("0001.0".parse::<PciAddress>().is_err());
    }

    #[test]
    fn memory_range_only_for_memory_bars() {
        let bar = PciBar::Memory {
            base: 0xF000_0000,
            size: 4096,
            prefetchable: false,
            is_64bit: false,
        };
        assert_eq!(bar.memory_range(), Some((0xF000_0000, 4096)));
        assert_eq!(PciBar::Io { base: 0xC000, size: 32 }.memory_range(), None);
        assert_eq!(PciBar::Unused.memory_range(), None);
    }
}
