//! Error types for lamzu-automator-core.

use thiserror::Error;

/// Core library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Raw HID call failure inside the OS backend.
    #[error("HID error: {0}")]
    Hid(String),

    /// The HID device-class enumeration itself could not be started.
    #[error("device enumeration failed: {0}")]
    DeviceEnumeration(String),

    /// Enumeration completed without a matching device interface.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The device was located but its handle could not be opened.
    #[error("failed to open device: {0}")]
    DeviceOpenFailed(String),

    /// Requested rate is not in the rate table.
    #[error("unsupported polling rate: {0} Hz (valid: 500, 1000, 2000, 4000, 8000)")]
    UnsupportedRate(u32),

    /// Both the feature-report and the output-report transmission failed.
    #[error("transmission failed (feature report: {feature}; output report: {output})")]
    TransmissionFailed { feature: String, output: String },

    /// Operation requires an open device handle.
    #[error("device not connected")]
    NotConnected,

    /// The OS process listing could not be obtained.
    #[error("process list unavailable: {0}")]
    ProcessListUnavailable(String),

    /// Configuration could not be read, parsed, or validated.
    #[error("config error: {0}")]
    Config(String),

    /// Steam install, library list, or app manifest could not be used.
    #[error("Steam error: {0}")]
    Steam(String),

    /// No native backend exists for this platform.
    #[error("unsupported platform: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How far an error propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Connection-time failure: terminates any run mode that needs a live device.
    Fatal,
    /// Per-tick failure: logged, the watcher keeps running.
    Recoverable,
    /// Rejected request: reported synchronously to whoever asked.
    Caller,
}

impl Error {
    /// Classify an error for propagation decisions.
    pub fn severity(&self) -> Severity {
        match self {
            Self::DeviceEnumeration(_)
            | Self::DeviceNotFound(_)
            | Self::DeviceOpenFailed(_)
            | Self::Unsupported(_) => Severity::Fatal,
            Self::TransmissionFailed { .. } | Self::ProcessListUnavailable(_) | Self::Hid(_) => {
                Severity::Recoverable
            }
            Self::UnsupportedRate(_)
            | Self::NotConnected
            | Self::Config(_)
            | Self::Steam(_)
            | Self::Io(_) => Severity::Caller,
        }
    }
}

impl Severity {
    /// Process exit status for a run that ended with an error of this severity.
    pub fn exit_code(self) -> u8 {
        match self {
            Severity::Fatal => 2,
            Severity::Recoverable | Severity::Caller => 1,
        }
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_are_fatal() {
        assert_eq!(
            Error::DeviceNotFound("LAMZU".into()).severity(),
            Severity::Fatal
        );
        assert_eq!(
            Error::DeviceOpenFailed("access denied".into()).severity(),
            Severity::Fatal
        );
        assert_eq!(
            Error::DeviceEnumeration("SetupDiGetClassDevsW".into()).severity(),
            Severity::Fatal
        );
    }

    #[test]
    fn tick_errors_are_recoverable() {
        let err = Error::TransmissionFailed {
            feature: "stall".into(),
            output: "stall".into(),
        };
        assert_eq!(err.severity(), Severity::Recoverable);
        assert_eq!(
            Error::ProcessListUnavailable("snapshot".into()).severity(),
            Severity::Recoverable
        );
    }

    #[test]
    fn unsupported_rate_goes_to_caller() {
        assert_eq!(Error::UnsupportedRate(3000).severity(), Severity::Caller);
    }

    #[test]
    fn fatal_errors_exit_distinctly() {
        assert_eq!(Error::DeviceNotFound("x".into()).severity().exit_code(), 2);
        assert_eq!(Error::UnsupportedRate(3000).severity().exit_code(), 1);
        assert_eq!(Error::Steam("no steamapps".into()).severity().exit_code(), 1);
    }

    #[test]
    fn transmission_failed_carries_both_causes() {
        let err = Error::TransmissionFailed {
            feature: "HidD_SetFeature: 31".into(),
            output: "WriteFile: 1167".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("HidD_SetFeature: 31"));
        assert!(msg.contains("WriteFile: 1167"));
    }
}
