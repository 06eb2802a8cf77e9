//! Polling rate command report.
//!
//! The LAMZU firmware takes a single 65-byte report on interface 2:
//!
//! | offset | meaning            | value          |
//! |--------|--------------------|----------------|
//! | 0      | report ID          | 0x00           |
//! | 1..=2  | padding            | 0x00 0x00      |
//! | 3      | command type       | 0x02           |
//! | 4      | sub-command        | 0x02           |
//! | 5      | parameter          | 0x01           |
//! | 6      | reserved           | 0x00           |
//! | 7      | configuration flag | 0x01           |
//! | 8      | rate code          | see table      |
//!
//! Rate codes: 500 Hz=2, 1000 Hz=1, 2000 Hz=32, 4000 Hz=64, 8000 Hz=128.
//! Every other byte is zero.

use crate::device::PollingRate;
use crate::error::Result;

/// Total report length, including the report ID byte.
pub const REPORT_LEN: usize = 65;

/// Report ID (unnumbered reports use 0).
pub const REPORT_ID: u8 = 0x00;
/// Command type byte.
pub const CMD_TYPE: u8 = 0x02;
/// Sub-command byte.
pub const CMD_SUB: u8 = 0x02;
/// Parameter byte.
pub const CMD_PARAM: u8 = 0x01;
/// Configuration flag byte.
pub const CMD_CONFIG: u8 = 0x01;

/// Offset of the rate code within the report.
pub const RATE_OFFSET: usize = 8;

/// A ready-to-send polling rate command. Always exactly [`REPORT_LEN`] bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report([u8; REPORT_LEN]);

impl Report {
    /// Build the command for a known-good rate.
    pub fn for_rate(rate: PollingRate) -> Self {
        let mut buf = [0u8; REPORT_LEN];
        buf[0] = REPORT_ID;
        buf[3] = CMD_TYPE;
        buf[4] = CMD_SUB;
        buf[5] = CMD_PARAM;
        buf[7] = CMD_CONFIG;
        buf[RATE_OFFSET] = rate.code();
        Self(buf)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The rate code carried in byte 8.
    pub fn rate_code(&self) -> u8 {
        self.0[RATE_OFFSET]
    }

    /// The command header (bytes 0..=8), for logging.
    pub fn header(&self) -> &[u8] {
        &self.0[..=RATE_OFFSET]
    }
}

/// Encode a raw Hz value into a command report.
///
/// Fails with `UnsupportedRate` before any buffer is built when `hz` is
/// not one of the supported rates.
pub fn encode(hz: u32) -> Result<Report> {
    let rate = PollingRate::try_from_hz(hz)?;
    Ok(Report::for_rate(rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    const FIXED: [(usize, u8); 4] = [(3, 0x02), (4, 0x02), (5, 0x01), (7, 0x01)];

    #[test]
    fn encode_all_supported_rates() {
        let table = [(500, 2u8), (1000, 1), (2000, 32), (4000, 64), (8000, 128)];
        for (hz, code) in table {
            let report = encode(hz).unwrap();
            let bytes = report.as_bytes();
            assert_eq!(bytes.len(), REPORT_LEN);
            assert_eq!(bytes[RATE_OFFSET], code, "rate {hz}");
            for (offset, value) in FIXED {
                assert_eq!(bytes[offset], value, "offset {offset} for rate {hz}");
            }
            for (offset, byte) in bytes.iter().enumerate() {
                let fixed = FIXED.iter().any(|(o, _)| *o == offset);
                if !fixed && offset != RATE_OFFSET {
                    assert_eq!(*byte, 0, "offset {offset} for rate {hz}");
                }
            }
        }
    }

    #[test]
    fn encode_2000_sets_code_32() {
        let report = encode(2000).unwrap();
        assert_eq!(report.rate_code(), 32);
    }

    #[test]
    fn encode_rejects_unsupported_rates() {
        for hz in [0, 1, 125, 250, 999, 1001, 3000, 16000] {
            assert!(
                matches!(encode(hz), Err(Error::UnsupportedRate(r)) if r == hz),
                "rate {hz}"
            );
        }
    }

    #[test]
    fn encode_is_deterministic() {
        assert_eq!(encode(1000).unwrap(), encode(1000).unwrap());
    }

    #[test]
    fn header_covers_command_bytes() {
        let report = encode(8000).unwrap();
        assert_eq!(
            report.header(),
            &[0x00, 0x00, 0x00, 0x02, 0x02, 0x01, 0x00, 0x01, 0x80]
        );
    }
}
