//! HID capability layer.
//!
//! Everything that touches the OS device stack sits behind two narrow traits
//! so that location and rate control logic run unchanged against the native
//! backend and against the in-memory fake used by tests.

use crate::device::{DeviceAttributes, DevicePath};
use crate::error::Result;

/// Device discovery and handle acquisition.
pub trait HidBackend: Send {
    /// Paths of every present interface in the HID device class.
    ///
    /// Candidates whose path cannot be resolved are skipped, not reported.
    /// Fails with `DeviceEnumeration` when the class enumeration itself
    /// cannot be opened.
    fn enumerate_interfaces(&self) -> Result<Vec<DevicePath>>;

    /// Read vendor/product attributes through a short-lived handle.
    ///
    /// The handle is closed before returning, whatever the outcome.
    fn query_attributes(&self, path: &DevicePath) -> Result<DeviceAttributes>;

    /// Open a shared read/write channel to the interface.
    fn open(&self, path: &DevicePath) -> Result<Box<dyn HidChannel>>;
}

/// An open handle to one HID interface.
///
/// Dropping a channel closes it.
pub trait HidChannel: Send {
    /// Send the buffer as a feature report over the control pipe.
    fn send_feature_report(&mut self, data: &[u8]) -> Result<()>;

    /// Write the buffer as an output report. Returns bytes written.
    fn write_output_report(&mut self, data: &[u8]) -> Result<usize>;

    /// Release the handle. Further calls are no-ops.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// The native backend for this platform.
#[cfg(target_os = "windows")]
pub fn platform_backend() -> Result<Box<dyn HidBackend>> {
    Ok(Box::new(crate::windows::WindowsHidBackend::new()))
}

/// The native backend for this platform.
#[cfg(not(target_os = "windows"))]
pub fn platform_backend() -> Result<Box<dyn HidBackend>> {
    Err(crate::error::Error::Unsupported(
        "LAMZU rate control uses the Windows HID stack and is only available on Windows"
            .to_string(),
    ))
}

/// An in-memory HID stack for testing.
///
/// Records every report written and can be told to fail at each step.
#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::error::Error;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Observable state shared between a [`FakeBackend`] and its channels.
    #[derive(Debug, Default)]
    pub struct FakeState {
        pub fail_enumeration: bool,
        pub fail_open: bool,
        pub fail_feature: bool,
        pub fail_output: bool,
        pub feature_reports: Vec<Vec<u8>>,
        pub output_reports: Vec<Vec<u8>>,
        pub attribute_queries: Vec<DevicePath>,
        pub opened: usize,
        pub closed: usize,
    }

    impl FakeState {
        /// Every report that reached the device, in order, by either path.
        pub fn delivered(&self) -> usize {
            self.feature_reports.len() + self.output_reports.len()
        }
    }

    /// A fake device tree: `(path, attributes)` pairs, where `None`
    /// attributes simulate an interface that refuses to open.
    #[derive(Clone)]
    pub struct FakeBackend {
        interfaces: Vec<(DevicePath, Option<DeviceAttributes>)>,
        pub state: Arc<Mutex<FakeState>>,
    }

    impl FakeBackend {
        pub fn new() -> Self {
            Self {
                interfaces: Vec::new(),
                state: Arc::new(Mutex::new(FakeState::default())),
            }
        }

        /// Add an interface reporting the given vendor/product.
        pub fn with_interface(mut self, path: &str, vid: u16, pid: u16) -> Self {
            self.interfaces.push((
                DevicePath::new(path),
                Some(DeviceAttributes {
                    vendor_id: vid,
                    product_id: pid,
                    version: 0x0100,
                }),
            ));
            self
        }

        /// Add an interface whose attribute query fails.
        pub fn with_locked_interface(mut self, path: &str) -> Self {
            self.interfaces.push((DevicePath::new(path), None));
            self
        }

        /// A fake with the three usual LAMZU interfaces (0, 1, 2) plus a keyboard.
        pub fn lamzu() -> Self {
            Self::new()
                .with_interface(r"\\?\hid#vid_046d&pid_c33f&mi_00#7&1a2b&0&0000#{4d1e55b2}", 0x046D, 0xC33F)
                .with_interface(r"\\?\hid#vid_373e&pid_001e&mi_00#8&2c3d&0&0000#{4d1e55b2}", 0x373E, 0x001E)
                .with_interface(r"\\?\hid#vid_373e&pid_001e&mi_01&col01#8&3e4f&0&0000#{4d1e55b2}", 0x373E, 0x001E)
                .with_interface(r"\\?\hid#vid_373e&pid_001e&mi_02#8&4a5b&0&0000#{4d1e55b2}", 0x373E, 0x001E)
        }
    }

    impl HidBackend for FakeBackend {
        fn enumerate_interfaces(&self) -> Result<Vec<DevicePath>> {
            if self.state.lock().fail_enumeration {
                return Err(Error::DeviceEnumeration(
                    "fake: class enumeration refused".into(),
                ));
            }
            Ok(self.interfaces.iter().map(|(p, _)| p.clone()).collect())
        }

        fn query_attributes(&self, path: &DevicePath) -> Result<DeviceAttributes> {
            let mut state = self.state.lock();
            state.attribute_queries.push(path.clone());
            self.interfaces
                .iter()
                .find(|(p, _)| p == path)
                .and_then(|(_, attrs)| *attrs)
                .ok_or_else(|| Error::Hid(format!("fake: cannot open {path}")))
        }

        fn open(&self, path: &DevicePath) -> Result<Box<dyn HidChannel>> {
            let mut state = self.state.lock();
            if state.fail_open {
                return Err(Error::DeviceOpenFailed(format!("fake: {path} busy")));
            }
            state.opened += 1;
            Ok(Box::new(FakeChannel {
                state: Arc::clone(&self.state),
                open: true,
            }))
        }
    }

    pub struct FakeChannel {
        state: Arc<Mutex<FakeState>>,
        open: bool,
    }

    impl HidChannel for FakeChannel {
        fn send_feature_report(&mut self, data: &[u8]) -> Result<()> {
            let mut state = self.state.lock();
            if !self.open || state.fail_feature {
                return Err(Error::Hid("fake: feature report stalled".into()));
            }
            state.feature_reports.push(data.to_vec());
            Ok(())
        }

        fn write_output_report(&mut self, data: &[u8]) -> Result<usize> {
            let mut state = self.state.lock();
            if !self.open || state.fail_output {
                return Err(Error::Hid("fake: output report rejected".into()));
            }
            state.output_reports.push(data.to_vec());
            Ok(data.len())
        }

        fn close(&mut self) {
            if self.open {
                self.open = false;
                self.state.lock().closed += 1;
            }
        }

        fn is_open(&self) -> bool {
            self.open
        }
    }

    impl Drop for FakeChannel {
        fn drop(&mut self) {
            self.close();
        }
    }
}
