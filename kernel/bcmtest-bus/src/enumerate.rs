//! Reading device identity and BARs out of configuration space.

use bcmtest_driver_api::pci::{MAX_BARS, PciAddress, PciBar, PciDeviceInfo};

use crate::config::{ConfigSpace, regs};

/// Vendor id read back from an empty slot.
pub const NO_DEVICE: u16 = 0xFFFF;

/// Reads full device information from one function.
///
/// Returns `None` if the function does not respond (vendor id `0xFFFF`).
pub fn read_device_info(address: PciAddress, cfg: &dyn ConfigSpace) -> Option<PciDeviceInfo> {
    let vendor_id = cfg.read_u16(regs::VENDOR_ID);
    if vendor_id == NO_DEVICE {
        return None;
    }
    let header_type = cfg.read_u8(regs::HEADER_TYPE);

    // Subsystem IDs are only valid for type 0 (general device) headers.
    let (subsystem_vendor_id, subsystem_device_id) = if header_type & 0x7F == 0 {
        (
            cfg.read_u16(regs::SUBSYSTEM_VENDOR_ID),
            cfg.read_u16(regs::SUBSYSTEM_DEVICE_ID),
        )
    } else {
        (0, 0)
    };

    Some(PciDeviceInfo {
        address,
        vendor_id,
        device_id: cfg.read_u16(regs::DEVICE_ID),
        revision: cfg.read_u8(regs::REVISION),
        prog_if: cfg.read_u8(regs::PROG_IF),
        subclass: cfg.read_u8(regs::SUBCLASS),
        class: cfg.read_u8(regs::CLASS),
        header_type,
        subsystem_vendor_id,
        subsystem_device_id,
        bars: decode_bars(cfg, header_type),
    })
}

/// Decodes Base Address Registers using the standard PCI BAR sizing algorithm.
///
/// Type 0 (general device) headers have 6 BARs; type 1 (bridge) headers have 2.
pub fn decode_bars(cfg: &dyn ConfigSpace, header_type: u8) -> [PciBar; MAX_BARS] {
    let mut bars = [PciBar::Unused; MAX_BARS];
    let max_bars: usize = if header_type & 0x7F == 1 { 2 } else { MAX_BARS };

    let mut i = 0;
    while i < max_bars {
        let offset = bar_offset(i);

        // Save, write all-ones, read the size mask, restore.
        let original = cfg.read_u32(offset);
        cfg.write_u32(offset, 0xFFFF_FFFF);
        let sizing = cfg.read_u32(offset);
        cfg.write_u32(offset, original);

        if sizing == 0 || sizing == 0xFFFF_FFFF {
            i += 1;
            continue;
        }

        if original & 1 != 0 {
            let mask = sizing & !0x03;
            let size = (!mask).wrapping_add(1) & 0xFFFF;
            if size > 0 {
                bars[i] = PciBar::Io {
                    base: original & !0x03,
                    size,
                };
            }
            i += 1;
            continue;
        }

        let prefetchable = original & 0x08 != 0;
        let is_64bit = (original >> 1) & 0x03 == 2;

        if is_64bit && i + 1 < max_bars {
            let next_offset = bar_offset(i + 1);
            let original_high = cfg.read_u32(next_offset);
            cfg.write_u32(next_offset, 0xFFFF_FFFF);
            let sizing_high = cfg.read_u32(next_offset);
            cfg.write_u32(next_offset, original_high);

            let base = (u64::from(original_high) << 32) | u64::from(original & !0x0F);
            let mask64 = (u64::from(sizing_high) << 32) | u64::from(sizing & !0x0F);
            bars[i] = PciBar::Memory {
                base,
                size: (!mask64).wrapping_add(1),
                prefetchable,
                is_64bit: true,
            };
            // Next BAR slot is consumed by the upper 32 bits.
            i += 2;
        } else {
            let mask = sizing & !0x0F;
            bars[i] = PciBar::Memory {
                base: u64::from(original & !0x0F),
                size: u64::from((!mask).wrapping_add(1)),
                prefetchable,
                is_64bit: false,
            };
            i += 1;
        }
    }

    bars
}

fn bar_offset(index: usize) -> u8 {
    regs::BAR0 + (index as u8) * 4
}

/// Returns a human-readable name for a PCI class/subclass pair.
#[must_use]
pub fn class_name(class: u8, subclass: u8) -> &'static str {
    match (class, subclass) {
        (0x00, 0x00) => "Non-VGA Unclassified",
        (0x02, 0x00) => "Ethernet Controller",
        (0x02, 0x80) => "Network Controller",
        (0x03, 0x00) => "VGA Controller",
        (0x06, 0x00) => "Host Bridge",
        (0x06, 0x04) => "PCI-to-PCI Bridge",
        (0x0D, 0x11) => "Bluetooth Controller",
        (0x0D, 0x20) => "802.11a Controller",
        (0x0D, 0x21) => "802.11b Controller",
        _ => "Unknown",
    }
}
