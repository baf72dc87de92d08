//! Driver configuration.

use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use bcmtest_driver_api::pci::{MAX_BARS, PciDeviceId};
use bcmtest_driver_api::resource::ResourceFlags;

/// Broadcom's PCI vendor id.
pub const BROADCOM_VENDOR_ID: u16 = 0x14e4;
/// BCM43A0 device id.
pub const BCM43A0_DEVICE_ID: u16 = 0x43a0;

/// What the driver matches and what it claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Vendor id probe accepts.
    pub vendor: u16,
    /// Device id probe accepts.
    pub device: u16,
    /// Description reported on a probe match.
    pub description: &'static str,
    /// BAR indices claimed at attach, in acquisition order.
    pub bars: Vec<u8>,
    /// Device node prefix; the node is named `<prefix><unit>`.
    pub node_prefix: String,
    /// Permission bits of the device node.
    pub node_mode: u32,
    /// Flags passed with every BAR reservation.
    pub flags: ResourceFlags,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            vendor: BROADCOM_VENDOR_ID,
            device: BCM43A0_DEVICE_ID,
            description: "bcm43a0",
            bars: vec![0],
            node_prefix: String::from("test"),
            node_mode: 0o600,
            flags: ResourceFlags::ACTIVE,
        }
    }
}

impl DriverConfig {
    /// The default configuration, claiming all six BARs.
    #[must_use]
    pub fn all_bars() -> Self {
        Self {
            bars: (0..MAX_BARS as u8).collect(),
            ..Self::default()
        }
    }

    /// The id table entry probe matches against.
    #[must_use]
    pub const fn id(&self) -> PciDeviceId {
        PciDeviceId::new(self.vendor, self.device)
    }

    /// Node name for `unit`.
    #[must_use]
    pub fn node_name(&self, unit: u32) -> String {
        format!("{}{}", self.node_prefix, unit)
    }

    /// Checks the BAR list and node prefix.
    ///
    /// # Errors
    ///
    /// [`ConfigError::BarOutOfRange`] for an index above 5,
    /// [`ConfigError::DuplicateBar`] for an index listed twice, and
    /// [`ConfigError::EmptyPrefix`] for an empty node prefix.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = [false; MAX_BARS];
        for &bar in &self.bars {
            let slot = seen
                .get_mut(usize::from(bar))
                .ok_or(ConfigError::BarOutOfRange(bar))?;
            if *slot {
                return Err(ConfigError::DuplicateBar(bar));
            }
            *slot = true;
        }
        if self.node_prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        Ok(())
    }
}

/// Invalid [`DriverConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A BAR index outside `0..=5`.
    BarOutOfRange(u8),
    /// A BAR index listed more than once.
    DuplicateBar(u8),
    /// The node prefix is empty.
    EmptyPrefix,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BarOutOfRange(bar) => write!(f, "BAR index {bar} out of range (0-5)"),
            Self::DuplicateBar(bar) => write!(f, "BAR index {bar} listed twice"),
            Self::EmptyPrefix => f.write_str("device node prefix is empty"),
        }
    }
}

impl core::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_bcm43a0() {
        let cfg = DriverConfig::default();
        assert_eq!(cfg.id(), PciDeviceId::new(0x14e4, 0x43a0));
        assert_eq!(cfg.bars, vec![0]);
        assert_eq!(cfg.node_name(3), "test3");
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn all_bars_claims_six() {
        let cfg = DriverConfig::all_bars();
        assert_eq!(cfg.bars, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn empty_bar_list_is_valid() {
        let cfg = DriverConfig {
            bars: Vec::new(),
            ..DriverConfig::default()
        };
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn invalid_configs() {
        let bad = |bars: Vec<u8>| DriverConfig {
            bars,
            ..DriverConfig::default()
        };
        assert_eq!(bad(vec![0, 6]).validate(), Err(ConfigError::BarOutOfRange(6)));
        assert_eq!(bad(vec![2, 0, 2]).validate(), Err(ConfigError::DuplicateBar(2)));
        let cfg = DriverConfig {
            node_prefix: String::new(),
            ..DriverConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyPrefix));
    }
}
