//! Scenario files.
//!
//! A scenario describes the simulated machine and the driver configuration:
//!
//! ```toml
//! [driver]
//! bars = [0, 2]
//!
//! [[device]]
//! address = "00:03.0"
//! vendor = "0x14e4"
//! device = "0x43a0"
//!
//! [[device.bar]]
//! index = 0
//! base = "0xF000_0000"
//! size = "0x4000"
//! ```
//!
//! Integers may be written as TOML integers or as strings (decimal or `0x`
//! hex, `_` separators allowed).

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use bcmtest_bus::{SimBus, SimConfigSpace};
use bcmtest_driver::DriverConfig;
use bcmtest_driver_api::pci::{MAX_BARS, PciAddress};
use bcmtest_driver_api::resource::ResourceFlags;

/// A parsed scenario file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Overrides for the driver configuration.
    #[serde(default)]
    pub driver: DriverSection,
    /// Functions plugged into the simulated bus.
    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceSection>,
}

/// The `[driver]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverSection {
    pub vendor: Option<toml::Value>,
    pub device: Option<toml::Value>,
    pub description: Option<String>,
    /// BAR indices, or the string `"all"`.
    pub bars: Option<toml::Value>,
    pub node_prefix: Option<String>,
    pub node_mode: Option<toml::Value>,
    /// Resource flag names, e.g. `["active", "shareable"]`.
    pub flags: Option<Vec<String>>,
}

/// One `[[device]]` entry.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceSection {
    pub address: String,
    pub vendor: toml::Value,
    pub device: toml::Value,
    pub class: Option<toml::Value>,
    pub subclass: Option<toml::Value>,
    pub prog_if: Option<toml::Value>,
    pub revision: Option<toml::Value>,
    pub subsystem_vendor: Option<toml::Value>,
    pub subsystem_device: Option<toml::Value>,
    #[serde(default, rename = "bar")]
    pub bars: Vec<BarSection>,
}

/// One `[[device.bar]]` entry.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BarSection {
    pub index: toml::Value,
    #[serde(default)]
    pub kind: BarKind,
    pub base: toml::Value,
    pub size: toml::Value,
    #[serde(default)]
    pub prefetchable: bool,
    #[serde(default)]
    pub is_64bit: bool,
    /// Make every reservation of this BAR fail.
    #[serde(default)]
    pub fail: bool,
}

/// Address space a BAR decodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarKind {
    #[default]
    Memory,
    Io,
}

/// Reads and parses a scenario file.
pub fn load(path: &Path) -> Result<Scenario> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

/// Parses scenario text.
pub fn parse(contents: &str) -> Result<Scenario> {
    Ok(toml::from_str(contents)?)
}

impl Scenario {
    /// Builds the driver configuration, starting from the defaults.
    pub fn driver_config(&self) -> Result<DriverConfig> {
        let d = &self.driver;
        let mut config = DriverConfig::default();
        if let Some(v) = &d.vendor {
            config.vendor = narrow(v, "driver.vendor")?;
        }
        if let Some(v) = &d.device {
            config.device = narrow(v, "driver.device")?;
        }
        if let Some(desc) = &d.description {
            // The config lives for the rest of the process.
            config.description = desc.clone().leak();
        }
        if let Some(bars) = &d.bars {
            config.bars = parse_bar_list(bars)?;
        }
        if let Some(prefix) = &d.node_prefix {
            config.node_prefix.clone_from(prefix);
        }
        if let Some(mode) = &d.node_mode {
            config.node_mode = narrow(mode, "driver.node_mode")?;
        }
        if let Some(names) = &d.flags {
            config.flags = parse_flags(names)?;
        }
        config.validate().context("invalid [driver] table")?;
        Ok(config)
    }

    /// Plugs every device into `bus` and arms the requested BAR faults.
    pub fn populate(&self, bus: &SimBus) -> Result<()> {
        for dev in &self.devices {
            let address: PciAddress = dev
                .address
                .parse()
                .with_context(|| format!("bad device address `{}`", dev.address))?;
            let config = dev
                .config_space()
                .with_context(|| format!("device {address}"))?;
            bus.plug(address, config)
                .with_context(|| format!("cannot plug device {address}"))?;
            for bar in dev.bars.iter().filter(|b| b.fail) {
                bus.inject_failure(address, narrow(&bar.index, "bar.index")?);
            }
        }
        Ok(())
    }
}

impl DeviceSection {
    fn config_space(&self) -> Result<SimConfigSpace> {
        let mut cfg = SimConfigSpace::new(
            narrow(&self.vendor, "vendor")?,
            narrow(&self.device, "device")?,
        );
        if self.class.is_some()
            || self.subclass.is_some()
            || self.prog_if.is_some()
            || self.revision.is_some()
        {
            cfg = cfg.with_class(
                optional(self.class.as_ref(), "class")?,
                optional(self.subclass.as_ref(), "subclass")?,
                optional(self.prog_if.as_ref(), "prog_if")?,
                optional(self.revision.as_ref(), "revision")?,
            );
        }
        if self.subsystem_vendor.is_some() || self.subsystem_device.is_some() {
            cfg = cfg.with_subsystem(
                optional(self.subsystem_vendor.as_ref(), "subsystem_vendor")?,
                optional(self.subsystem_device.as_ref(), "subsystem_device")?,
            );
        }
        for bar in &self.bars {
            let index: usize = narrow(&bar.index, "bar.index")?;
            cfg = match bar.kind {
                BarKind::Memory => cfg.with_memory_bar(
                    index,
                    parse_integer(&bar.base)?,
                    parse_integer(&bar.size)?,
                    bar.prefetchable,
                    bar.is_64bit,
                ),
                BarKind::Io => cfg.with_io_bar(
                    index,
                    narrow(&bar.base, "bar.base")?,
                    narrow(&bar.size, "bar.size")?,
                ),
            }
            .with_context(|| format!("BAR{index}"))?;
        }
        Ok(cfg)
    }
}

/// Parses an integer from a TOML value (integer or hex/decimal string).
fn parse_integer(value: &toml::Value) -> Result<u64> {
    match value {
        toml::Value::Integer(i) => {
            u64::try_from(*i).with_context(|| format!("negative integer {i}"))
        }
        toml::Value::String(s) => {
            let s = s.replace('_', "");
            if let Some(hex) = s.strip_prefix("0x") {
                u64::from_str_radix(hex, 16).context("invalid hex integer")
            } else if let Some(oct) = s.strip_prefix("0o") {
                u64::from_str_radix(oct, 8).context("invalid octal integer")
            } else {
                s.parse::<u64>().context("invalid integer")
            }
        }
        _ => bail!("expected integer or hex-string, got {value:?}"),
    }
}

fn narrow<T: TryFrom<u64>>(value: &toml::Value, what: &str) -> Result<T> {
    let raw = parse_integer(value).with_context(|| format!("`{what}`"))?;
    T::try_from(raw).map_err(|_| anyhow::anyhow!("`{what}` out of range: {raw:#x}"))
}

fn optional<T: TryFrom<u64> + Default>(value: Option<&toml::Value>, what: &str) -> Result<T> {
    value.map_or_else(|| Ok(T::default()), |v| narrow(v, what))
}

fn parse_bar_list(value: &toml::Value) -> Result<Vec<u8>> {
    match value {
        toml::Value::String(s) if s == "all" => Ok((0..MAX_BARS as u8).collect()),
        toml::Value::Array(items) => items.iter().map(|v| narrow(v, "driver.bars")).collect(),
        _ => bail!("`driver.bars` must be an array of indices or \"all\""),
    }
}

fn parse_flags(names: &[String]) -> Result<ResourceFlags> {
    names.iter().try_fold(ResourceFlags::empty(), |acc, name| {
        let flag = ResourceFlags::from_name(&name.to_ascii_uppercase())
            .with_context(|| format!("unknown resource flag `{name}`"))?;
        Ok(acc | flag)
    })
}
