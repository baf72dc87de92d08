//! Device identification.

use bcmtest_driver_api::diag::{DiagEvent, DiagSink};
use bcmtest_driver_api::driver::ProbeResult;
use bcmtest_driver_api::pci::PciDeviceInfo;

use crate::config::DriverConfig;

/// Decides whether the driver supports `info`.
///
/// Matches only the exact vendor/device pair in `config`. Holds no state, so
/// any number of candidates may be probed concurrently.
pub fn probe(config: &DriverConfig, info: &PciDeviceInfo, sink: &dyn DiagSink) -> ProbeResult {
    sink.emit(DiagEvent::Probing {
        address: info.address,
        vendor: info.vendor_id,
        device: info.device_id,
    });
    if !config.id().matches(info) {
        return ProbeResult::NoMatch;
    }
    sink.emit(DiagEvent::ProbeMatched {
        description: config.description,
    });
    ProbeResult::Match(config.description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bcmtest_driver_api::diag::DiagRecorder;
    use bcmtest_driver_api::pci::{MAX_BARS, PciAddress, PciBar};

    fn candidate(vendor: u16, device: u16) -> PciDeviceInfo {
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
    fn exact_pair_matches() {
        let sink = DiagRecorder::new();
        let result = probe(&DriverConfig::default(), &candidate(0x14e4, 0x43a0), &sink);
        assert_eq!(result, ProbeResult::Match("bcm43a0"));
        assert_eq!(
            sink.events()[1],
            DiagEvent::ProbeMatched {
                description: "bcm43a0"
            }
        );
    }

    #[test]
    fn every_other_pair_is_rejected() {
        let cfg = DriverConfig::default();
        let sink = DiagRecorder::new();
        for (vendor, device) in [
            (0x14e4, 0x43a1),
            (0x14e5, 0x43a0),
            (0x43a0, 0x14e4),
            (0x8086, 0x24fd),
            (0xFFFF, 0xFFFF),
            (0, 0),
        ] {
            assert_eq!(probe(&cfg, &candidate(vendor, device), &sink), ProbeResult::NoMatch);
        }
        assert_eq!(sink.count(|e| matches!(e, DiagEvent::ProbeMatched { .. })), 0);
        assert_eq!(sink.count(|e| matches!(e, DiagEvent::Probing { .. })), 6);
    }

    #[test]
    fn configured_pair_is_honored() {
        let cfg = DriverConfig {
            vendor: 0x14e4,
            device: 0x4331,
            ..DriverConfig::default()
        };
        let sink = DiagRecorder::new();
        assert!(probe(&cfg, &candidate(0x14e4, 0x4331), &sink).is_match());
        assert!(!probe(&cfg, &candidate(0x14e4, 0x43a0), &sink).is_match());
    }
}
