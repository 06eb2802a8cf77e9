//! Device model: target identity, polling rates, and diagnostic discovery.

use crate::error::{Error, Result};
use crate::{INTERFACE_NUMBER, LAMZU_PID, LAMZU_VID};
use serde::Serialize;
use tracing::{debug, info};

/// Vendor/product pair plus the logical sub-interface that accepts rate commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    pub interface: u8,
}

impl DeviceIdentity {
    /// The supported LAMZU mouse, interface 2.
    pub const LAMZU: DeviceIdentity = DeviceIdentity {
        vendor_id: LAMZU_VID,
        product_id: LAMZU_PID,
        interface: INTERFACE_NUMBER,
    };

    /// Whether the given attributes belong to this vendor/product.
    pub fn matches(&self, attrs: &DeviceAttributes) -> bool {
        attrs.vendor_id == self.vendor_id && attrs.product_id == self.product_id
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VID=0x{:04X} PID=0x{:04X} interface {}",
            self.vendor_id, self.product_id, self.interface
        )
    }
}

/// OS-specific path of one HID interface instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DevicePath(String);

impl DevicePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DevicePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attributes read from a HID interface during location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceAttributes {
    pub vendor_id: u16,
    pub product_id: u16,
    pub version: u16,
}

/// Polling rate options supported by the LAMZU firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PollingRate {
    Hz500 = 500,
    Hz1000 = 1000,
    Hz2000 = 2000,
    Hz4000 = 4000,
    Hz8000 = 8000,
}

impl PollingRate {
    /// Convert from raw Hz value.
    pub fn from_hz(hz: u32) -> Option<Self> {
        match hz {
            500 => Some(Self::Hz500),
            1000 => Some(Self::Hz1000),
            2000 => Some(Self::Hz2000),
            4000 => Some(Self::Hz4000),
            8000 => Some(Self::Hz8000),
            _ => None,
        }
    }

    /// Like [`PollingRate::from_hz`], but rejects unknown values with `UnsupportedRate`.
    pub fn try_from_hz(hz: u32) -> Result<Self> {
        Self::from_hz(hz).ok_or(Error::UnsupportedRate(hz))
    }

    /// Get the Hz value.
    pub fn as_hz(&self) -> u32 {
        *self as u32
    }

    /// One-byte code the firmware expects for this rate.
    pub fn code(&self) -> u8 {
        match self {
            Self::Hz500 => 2,
            Self::Hz1000 => 1,
            Self::Hz2000 => 32,
            Self::Hz4000 => 64,
            Self::Hz8000 => 128,
        }
    }

    /// All supported rates, ascending.
    pub const ALL: &'static [PollingRate] = &[
        PollingRate::Hz500,
        PollingRate::Hz1000,
        PollingRate::Hz2000,
        PollingRate::Hz4000,
        PollingRate::Hz8000,
    ];
}

impl std::fmt::Display for PollingRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Hz", self.as_hz())
    }
}

/// One HID interface of the target vendor/product, as reported by hidapi.
#[derive(Debug, Clone, Serialize)]
pub struct InterfaceInfo {
    pub vid: u16,
    pub pid: u16,
    pub interface_number: i32,
    pub usage_page: u16,
    pub usage: u16,
    pub path: String,
    pub product: Option<String>,
    /// Whether this is the interface rate commands are sent to.
    pub is_control: bool,
}

/// List every HID interface exposed by the given vendor/product.
///
/// Diagnostic only: rate control goes through [`crate::locator`], which
/// uses the native backend. This listing shows all sibling interfaces so
/// a user can see which one was picked and why the others were skipped.
pub fn discover_interfaces(identity: &DeviceIdentity) -> Result<Vec<InterfaceInfo>> {
    debug!("Starting HID device enumeration");
    let api = hidapi::HidApi::new().map_err(|e| Error::Hid(e.to_string()))?;

    let mut interfaces = Vec::new();
    for info in api.device_list() {
        if info.vendor_id() != identity.vendor_id || info.product_id() != identity.product_id {
            continue;
        }

        let is_control = info.interface_number() == i32::from(identity.interface);
        info!(
            vid = format_args!("0x{:04X}", info.vendor_id()),
            pid = format_args!("0x{:04X}", info.product_id()),
            interface = info.interface_number(),
            path = %info.path().to_string_lossy(),
            "Found LAMZU interface"
        );
        interfaces.push(InterfaceInfo {
            vid: info.vendor_id(),
            pid: info.product_id(),
            interface_number: info.interface_number(),
            usage_page: info.usage_page(),
            usage: info.usage(),
            path: info.path().to_string_lossy().into_owned(),
            product: info.product_string().map(|s| s.to_string()),
            is_control,
        });
    }

    debug!(count = interfaces.len(), "Device enumeration complete");
    Ok(interfaces)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_constants() {
        let id = DeviceIdentity::LAMZU;
        assert_eq!(id.vendor_id, 0x373E);
        assert_eq!(id.product_id, 0x001E);
        assert_eq!(id.interface, 2);
    }

    #[test]
    fn identity_matches_vid_pid_only() {
        let attrs = DeviceAttributes {
            vendor_id: 0x373E,
            product_id: 0x001E,
            version: 0x0102,
        };
        assert!(DeviceIdentity::LAMZU.matches(&attrs));

        let other = DeviceAttributes {
            product_id: 0x001F,
            ..attrs
        };
        assert!(!DeviceIdentity::LAMZU.matches(&other));
    }

    #[test]
    fn polling_rate_roundtrip() {
        for rate in PollingRate::ALL {
            assert_eq!(PollingRate::from_hz(rate.as_hz()), Some(*rate));
        }
    }

    #[test]
    fn polling_rate_codes_match_table() {
        let table = [(500, 2), (1000, 1), (2000, 32), (4000, 64), (8000, 128)];
        for (hz, code) in table {
            assert_eq!(PollingRate::from_hz(hz).map(|r| r.code()), Some(code));
        }
    }

    #[test]
    fn polling_rate_rejects_invalid() {
        for hz in [0, 125, 250, 3000, 8001, u32::MAX] {
            assert_eq!(PollingRate::from_hz(hz), None);
        }
        assert!(matches!(
            PollingRate::try_from_hz(3000),
            Err(Error::UnsupportedRate(3000))
        ));
    }

    #[test]
    fn polling_rate_display() {
        assert_eq!(PollingRate::Hz8000.to_string(), "8000 Hz");
    }
}
