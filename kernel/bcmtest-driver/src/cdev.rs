//! The `/dev/test<unit>` node.
//!
//! Holds only a weak reference to its [`Softc`]: once detach has dropped the
//! instance, every entry point fails with [`IoError::NoSuchDevice`]. Reads and
//! writes are stubs that report the requested length and transfer nothing.

use alloc::string::String;
use alloc::sync::{Arc, Weak};

use bcmtest_driver_api::chardev::CharDevice;
use bcmtest_driver_api::diag::{DiagEvent, DiagSink};
use bcmtest_driver_api::error::IoError;

use crate::softc::Softc;

/// Character device published for one attached instance.
pub struct TestCdev {
    name: String,
    unit: u32,
    mode: u32,
    softc: Weak<Softc>,
    sink: Arc<dyn DiagSink>,
}

impl TestCdev {
    /// Creates the node for `softc`.
    #[must_use]
    pub fn new(softc: &Arc<Softc>, mode: u32, sink: Arc<dyn DiagSink>) -> Self {
        Self {
            name: String::from(softc.node()),
            unit: softc.unit(),
            mode,
            softc: Arc::downgrade(softc),
            sink,
        }
    }

    /// Unit number of the backing instance.
    #[must_use]
    pub fn unit(&self) -> u32 {
        self.unit
    }

    /// Permission bits of the node.
    #[must_use]
    pub fn mode(&self) -> u32 {
        self.mode
    }

    fn instance(&self) -> Result<Arc<Softc>, IoError> {
        self.softc.upgrade().ok_or(IoError::NoSuchDevice)
    }
}

impl CharDevice for TestCdev {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> Result<(), IoError> {
        let sc = self.instance()?;
        self.sink.emit(DiagEvent::Opened {
            node: String::from(sc.node()),
        });
        Ok(())
    }

    fn close(&self) -> Result<(), IoError> {
        let sc = self.instance()?;
        self.sink.emit(DiagEvent::Closed {
            node: String::from(sc.node()),
        });
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, IoError> {
        let sc = self.instance()?;
        self.sink.emit(DiagEvent::ReadRequested {
            node: String::from(sc.node()),
            len: buf.len(),
        });
        Ok(0)
    }

    fn write(&self, buf: &[u8]) -> Result<usize, IoError> {
        let sc = self.instance()?;
        self.sink.emit(DiagEvent::WriteRequested {
            node: String::from(sc.node()),
            len: buf.len(),
        });
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bars::BarSet;
    use bcmtest_driver_api::diag::DiagRecorder;
    use bcmtest_driver_api::pci::{MAX_BARS, PciAddress, PciBar, PciDeviceInfo};

    fn softc() -> Arc<Softc> {
        let info = PciDeviceInfo {
            address: PciAddress::new(0, 3, 0),
            vendor_id: 0x14e4,
            device_id: 0x43a0,
            revision: 0,
            prog_if: 0,
            subclass: 0x80,
            class: 0x02,
            header_type: 0,
            subsystem_vendor_id: 0,
            subsystem_device_id: 0,
            bars: [PciBar::Unused; MAX_BARS],
        };
        Arc::new(Softc::new(info, 2, String::from("test2"), BarSet::default()))
    }

    #[test]
    fn stub_io_transfers_nothing() {
        let sc = softc();
        let sink = Arc::new(DiagRecorder::new());
        let dev = TestCdev::new(&sc, 0o600, sink.clone());
        assert_eq!(dev.name(), "test2");
        assert_eq!(dev.unit(), 2);
        assert_eq!(dev.mode(), 0o600);

        dev.open().unwrap();
        let mut buf = [0x55u8; 64];
        assert_eq!(dev.read(&mut buf), Ok(0));
        assert_eq!(buf, [0x55; 64]);
        assert_eq!(dev.write(&[1, 2, 3]), Ok(0));
        dev.close().unwrap();

        assert_eq!(
            sink.events(),
            vec![
                DiagEvent::Opened {
                    node: String::from("test2")
                },
                DiagEvent::ReadRequested {
                    node: String::from("test2"),
                    len: 64
                },
                DiagEvent::WriteRequested {
                    node: String::from("test2"),
                    len: 3
                },
                DiagEvent::Closed {
                    node: String::from("test2")
                },
            ]
        );
    }

    #[test]
    fn dropped_instance_is_no_such_device() {
        let sc = softc();
        let sink = Arc::new(DiagRecorder::new());
        let dev = TestCdev::new(&sc, 0o600, sink.clone());
        drop(sc);
        assert_eq!(dev.open(), Err(IoError::NoSuchDevice));
        assert_eq!(dev.read(&mut [0u8; 64]), Err(IoError::NoSuchDevice));
        assert_eq!(dev.write(&[0u8; 4]), Err(IoError::NoSuchDevice));
        assert_eq!(dev.close(), Err(IoError::NoSuchDevice));
        assert!(sink.events().is_empty());
    }
}
