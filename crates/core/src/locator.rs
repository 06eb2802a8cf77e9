//! Locate the rate-control interface among all HID interfaces.
//!
//! A LAMZU mouse is a composite device: the same vendor/product pair shows up
//! on several logical interfaces, and only one of them accepts the polling
//! rate command. Windows encodes the interface number in the device path as
//! `&mi_XX` (two hex digits), e.g.
//! `\\?\hid#vid_373e&pid_001e&mi_02#8&4a5b&0&0000#{...}`.

use crate::device::{DeviceAttributes, DeviceIdentity, DevicePath};
use crate::error::{Error, Result};
use crate::transport::HidBackend;
use tracing::{debug, info, trace};

/// Marker preceding the interface number in a Windows HID device path.
pub const INTERFACE_MARKER: &str = "&mi_";

/// The interface that matched, and the attributes read while matching it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedDevice {
    pub path: DevicePath,
    pub attributes: DeviceAttributes,
    pub interface: u8,
}

/// Extract the interface number from a device path.
///
/// Looks for `&mi_` (case-insensitive) and parses the two characters after
/// it as hex. Returns `None` when the marker is missing or the digits are
/// short or not hex.
pub fn parse_interface_ordinal(path: &str) -> Option<u8> {
    let lower = path.to_ascii_lowercase();
    let start = lower.find(INTERFACE_MARKER)? + INTERFACE_MARKER.len();
    let digits = lower.get(start..start + 2)?;
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(digits, 16).ok()
}

/// Find the one interface matching `identity`, including its interface number.
///
/// Attribute queries stop at the first accepted candidate. Fails with
/// `DeviceEnumeration` if the class enumeration cannot be opened, and with
/// `DeviceNotFound` if it completes without a match.
pub fn locate(backend: &dyn HidBackend, identity: &DeviceIdentity) -> Result<LocatedDevice> {
    let candidates = backend.enumerate_interfaces()?;
    debug!(count = candidates.len(), "Scanning HID interfaces");

    for path in candidates {
        trace!(path = %path, "Checking device");

        let attributes = match backend.query_attributes(&path) {
            Ok(attrs) => attrs,
            Err(e) => {
                trace!(path = %path, error = %e, "Skipping interface without attributes");
                continue;
            }
        };

        if !identity.matches(&attributes) {
            continue;
        }

        match parse_interface_ordinal(path.as_str()) {
            Some(interface) if interface == identity.interface => {
                info!(
                    vid = format_args!("0x{:04X}", attributes.vendor_id),
                    pid = format_args!("0x{:04X}", attributes.product_id),
                    interface,
                    path = %path,
                    "Found LAMZU control interface"
                );
                return Ok(LocatedDevice {
                    path,
                    attributes,
                    interface,
                });
            }
            Some(interface) => debug!(
                interface,
                wanted = identity.interface,
                path = %path,
                "Skipping LAMZU interface"
            ),
            None => debug!(path = %path, "Skipping LAMZU interface with unknown number"),
        }
    }

    Err(Error::DeviceNotFound(format!(
        "no interface with {identity} - make sure the mouse is connected and you're running as administrator"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::FakeBackend;

    const IF0: &str = r"\\?\hid#vid_373e&pid_001e&mi_00#8&2c3d&0&0000#{4d1e55b2}";
    const IF2: &str = r"\\?\hid#vid_373e&pid_001e&mi_02#8&4a5b&0&0000#{4d1e55b2}";

    #[test]
    fn parse_ordinal_from_path() {
        assert_eq!(parse_interface_ordinal(IF2), Some(2));
        assert_eq!(parse_interface_ordinal(IF0), Some(0));
        assert_eq!(
            parse_interface_ordinal(r"\\?\hid#vid_373e&pid_001e&mi_01&col01#8&3e4f"),
            Some(1)
        );
    }

    #[test]
    fn parse_ordinal_is_case_insensitive_and_hex() {
        assert_eq!(parse_interface_ordinal(r"\\?\HID#VID_373E&PID_001E&MI_02#X"), Some(2));
        assert_eq!(parse_interface_ordinal("x&mi_0a#"), Some(10));
        assert_eq!(parse_interface_ordinal("x&MI_Ff"), Some(255));
    }

    #[test]
    fn parse_ordinal_missing_or_malformed() {
        assert_eq!(parse_interface_ordinal(r"\\?\hid#vid_373e&pid_001e#8&4a5b"), None);
        assert_eq!(parse_interface_ordinal("x&mi_"), None);
        assert_eq!(parse_interface_ordinal("x&mi_2"), None);
        assert_eq!(parse_interface_ordinal("x&mi_zz#"), None);
        assert_eq!(parse_interface_ordinal("x&mi_+1#"), None);
        assert_eq!(parse_interface_ordinal("x&mi_0é"), None);
        assert_eq!(parse_interface_ordinal("x mi_02"), None);
    }

    #[test]
    fn locate_picks_interface_two() {
        let backend = FakeBackend::lamzu();
        let found = locate(&backend, &DeviceIdentity::LAMZU).unwrap();
        assert_eq!(found.path.as_str(), IF2);
        assert_eq!(found.interface, 2);
        assert_eq!(found.attributes.vendor_id, 0x373E);
        assert_eq!(found.attributes.product_id, 0x001E);
    }

    #[test]
    fn locate_excludes_matching_vid_pid_on_other_interfaces() {
        let backend = FakeBackend::new()
            .with_interface(IF0, 0x373E, 0x001E)
            .with_interface(r"\\?\hid#vid_373e&pid_001e&mi_03#x", 0x373E, 0x001E);
        let result = locate(&backend, &DeviceIdentity::LAMZU);
        assert!(matches!(result, Err(Error::DeviceNotFound(_))));
    }

    #[test]
    fn locate_excludes_paths_without_interface_marker() {
        let backend =
            FakeBackend::new().with_interface(r"\\?\hid#vid_373e&pid_001e#8&1&0&0000", 0x373E, 0x001E);
        assert!(matches!(
            locate(&backend, &DeviceIdentity::LAMZU),
            Err(Error::DeviceNotFound(_))
        ));
    }

    #[test]
    fn locate_ignores_other_vendors_on_interface_two() {
        let backend = FakeBackend::new()
            .with_interface(r"\\?\hid#vid_046d&pid_c08d&mi_02#x", 0x046D, 0xC08D)
            .with_interface(IF2, 0x373E, 0x001E);
        let found = locate(&backend, &DeviceIdentity::LAMZU).unwrap();
        assert_eq!(found.path.as_str(), IF2);
    }

    #[test]
    fn locate_skips_interfaces_that_refuse_attribute_query() {
        let backend = FakeBackend::new()
            .with_locked_interface(r"\\?\hid#vid_373e&pid_001e&mi_02#locked")
            .with_interface(IF2, 0x373E, 0x001E);
        let found = locate(&backend, &DeviceIdentity::LAMZU).unwrap();
        assert_eq!(found.path.as_str(), IF2);
    }

    #[test]
    fn locate_stops_at_first_accepted_candidate() {
        let backend = FakeBackend::new()
            .with_interface(IF2, 0x373E, 0x001E)
            .with_interface(r"\\?\hid#vid_373e&pid_001e&mi_02#second", 0x373E, 0x001E);
        locate(&backend, &DeviceIdentity::LAMZU).unwrap();
        assert_eq!(backend.state.lock().attribute_queries.len(), 1);
    }

    #[test]
    fn enumeration_failure_is_distinct_from_not_found() {
        let backend = FakeBackend::lamzu();
        backend.state.lock().fail_enumeration = true;
        assert!(matches!(
            locate(&backend, &DeviceIdentity::LAMZU),
            Err(Error::DeviceEnumeration(_))
        ));

        let empty = FakeBackend::new();
        assert!(matches!(
            locate(&empty, &DeviceIdentity::LAMZU),
            Err(Error::DeviceNotFound(_))
        ));
    }
}
