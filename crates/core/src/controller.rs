//! Rate controller: owns the device handle and sends rate commands.
//!
//! ```text
//! Unconnected --connect ok--> Connected --close--> Unconnected
//!      ^                                                |
//!      +---------------- connect error -----------------+
//! ```

use crate::device::{DeviceIdentity, PollingRate};
use crate::error::{Error, Result};
use crate::locator::{self, LocatedDevice};
use crate::report_rate::{self, Report};
use crate::transport::{HidBackend, HidChannel};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A controller shared between the watcher thread and the manual path.
///
/// The mutex is the single-writer guard for the device handle.
pub type SharedController = Arc<Mutex<RateController>>;

/// Which transmission path the firmware accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    FeatureReport,
    OutputReport { written: usize },
}

/// Owns at most one open channel to the control interface.
pub struct RateController {
    backend: Box<dyn HidBackend>,
    identity: DeviceIdentity,
    channel: Option<Box<dyn HidChannel>>,
    device: Option<LocatedDevice>,
}

impl RateController {
    pub fn new(backend: Box<dyn HidBackend>, identity: DeviceIdentity) -> Self {
        Self {
            backend,
            identity,
            channel: None,
            device: None,
        }
    }

    /// Locate the control interface and open it.
    ///
    /// An already-open handle is released first. On failure the controller
    /// stays unconnected.
    pub fn connect(&mut self) -> Result<()> {
        self.close();

        let located = locator::locate(self.backend.as_ref(), &self.identity)?;
        let channel = self.backend.open(&located.path)?;

        info!(
            vid = format_args!("0x{:04X}", located.attributes.vendor_id),
            pid = format_args!("0x{:04X}", located.attributes.product_id),
            interface = located.interface,
            "Connected to LAMZU device"
        );
        self.channel = Some(channel);
        self.device = Some(located);
        Ok(())
    }

    /// Send the rate command for `hz`.
    ///
    /// The report is built before any I/O, so an unsupported rate never
    /// touches the device. Transmission tries a feature report first and
    /// falls back to an output report write; firmware revisions differ in
    /// which of the two they acknowledge.
    pub fn set_rate(&mut self, hz: u32) -> Result<Delivery> {
        let report = report_rate::encode(hz)?;
        let channel = self.channel.as_mut().ok_or(Error::NotConnected)?;

        debug!(
            rate = hz,
            code = report.rate_code(),
            report_hex = format_args!("{:02X?}", report.header()),
            "Sending polling rate command"
        );

        let delivery = transmit(channel.as_mut(), &report)?;
        info!(rate = hz, code = report.rate_code(), via = ?delivery, "Polling rate set");
        Ok(delivery)
    }

    /// Typed convenience over [`RateController::set_rate`].
    pub fn apply(&mut self, rate: PollingRate) -> Result<Delivery> {
        self.set_rate(rate.as_hz())
    }

    /// Check that a handle is held.
    pub fn test_connection(&self) -> Result<()> {
        match (&self.channel, &self.device) {
            (Some(channel), Some(device)) if channel.is_open() => {
                debug!(
                    vid = format_args!("0x{:04X}", device.attributes.vendor_id),
                    pid = format_args!("0x{:04X}", device.attributes.product_id),
                    "Connection check ok"
                );
                Ok(())
            }
            _ => Err(Error::NotConnected),
        }
    }

    /// Release the handle. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
            debug!("Controller closed");
        }
        self.device = None;
    }

    pub fn is_connected(&self) -> bool {
        self.channel.as_ref().is_some_and(|c| c.is_open())
    }

    /// Path and attributes of the connected interface.
    pub fn device(&self) -> Option<&LocatedDevice> {
        self.device.as_ref()
    }

    pub fn into_shared(self) -> SharedController {
        Arc::new(Mutex::new(self))
    }
}

impl Drop for RateController {
    fn drop(&mut self) {
        self.close();
    }
}

fn transmit(channel: &mut dyn HidChannel, report: &Report) -> Result<Delivery> {
    let feature_err = match channel.send_feature_report(report.as_bytes()) {
        Ok(()) => return Ok(Delivery::FeatureReport),
        Err(e) => e,
    };
    warn!(error = %feature_err, "Feature report failed, trying output report");

    match channel.write_output_report(report.as_bytes()) {
        Ok(written) => Ok(Delivery::OutputReport { written }),
        Err(output_err) => Err(Error::TransmissionFailed {
            feature: feature_err.to_string(),
            output: output_err.to_string(),
        }),
    }
}
