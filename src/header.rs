//! HEADER segment: the fixed 58-byte prologue giving the FCS version and
//! the six byte-offset pairs for TEXT, DATA and ANALYSIS.

use std::fmt;
use std::str;

use crate::error::{warn, FcsError, FcsResult, Warning};

pub(crate) const HEADER_LEN: u64 = 58;

/// The FCS version declared in the first six bytes of HEADER.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V2_0,
    V3_0,
    V3_1,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Version::V2_0 => "2.0",
            Version::V3_0 => "3.0",
            Version::V3_1 => "3.1",
        };
        write!(f, "{s}")
    }
}

/// Parsed HEADER segment.
///
/// `analysis_start`/`analysis_stop` use `-1` as the "absent" sentinel per
/// the format's HEADER parsing rules; `data_start`/`data_stop` of `0` is
/// the "segment exceeds 99,999,999 bytes, consult TEXT" sentinel and is
/// preserved rather than treated as an error.
#[derive(Debug, Clone)]
pub struct Header {
    pub version: Version,
    pub raw_version: String,
    pub text_start: u64,
    pub text_stop: u64,
    pub data_start: u64,
    pub data_stop: u64,
    pub analysis_start: i64,
    pub analysis_stop: i64,
}

fn parse_required_offset(field: &str, bytes: &[u8]) -> FcsResult<u64> {
    let s = str::from_utf8(bytes)
        .map_err(|_| FcsError::parse(format!("HEADER {field} field is not valid ASCII")))?;
    s.trim()
        .parse::<u64>()
        .map_err(|_| FcsError::parse(format!("HEADER {field} field '{s}' is not a valid offset")))
}

fn parse_optional_offset(bytes: &[u8]) -> i64 {
    str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(-1)
}

/// Parse a 58-byte HEADER segment. `buf` must be exactly [`HEADER_LEN`]
/// bytes, as read from the start of the current data set.
pub(crate) fn parse_header(buf: &[u8], warnings: &mut Vec<Warning>) -> FcsResult<Header> {
    if buf.len() as u64 != HEADER_LEN {
        return Err(FcsError::parse(format!(
            "HEADER segment must be {HEADER_LEN} bytes, got {}",
            buf.len()
        )));
    }

    let raw_version = str::from_utf8(&buf[0..6])
        .map_err(|_| FcsError::parse("HEADER version tag is not valid ASCII"))?
        .trim()
        .to_string();

    let version = match raw_version.as_str() {
        "FCS2.0" => Version::V2_0,
        "FCS3.0" => Version::V3_0,
        "FCS3.1" => Version::V3_1,
        other => {
            warn(warnings, Warning::UnsupportedVersion(other.to_string()));
            Version::V3_1
        }
    };

    let text_start = parse_required_offset("text_start", &buf[10..18])?;
    let text_stop = parse_required_offset("text_stop", &buf[18..26])?;
    let data_start = parse_required_offset("data_start", &buf[26..34])?;
    let data_stop = parse_required_offset("data_stop", &buf[34..42])?;
    let analysis_start = parse_optional_offset(&buf[42..50]);
    let analysis_stop = parse_optional_offset(&buf[50..58]);

    Ok(Header {
        version,
        raw_version,
        text_start,
        text_stop,
        data_start,
        data_stop,
        analysis_start,
        analysis_stop,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_header(
        version: &str,
        text_start: &str,
        text_stop: &str,
        data_start: &str,
        data_stop: &str,
        analysis_start: &str,
        analysis_stop: &str,
    ) -> Vec<u8> {
        let mut s = String::new();
        s.push_str(&format!("{version:<6}"));
        s.push_str("    ");
        s.push_str(&format!("{text_start:>8}"));
        s.push_str(&format!("{text_stop:>8}"));
        s.push_str(&format!("{data_start:>8}"));
        s.push_str(&format!("{data_stop:>8}"));
        s.push_str(&format!("{analysis_start:>8}"));
        s.push_str(&format!("{analysis_stop:>8}"));
        s.into_bytes()
    }

    #[test]
    fn parses_supported_version() {
        let buf = make_header("FCS3.0", "256", "1545", "1792", "202456", "0", "0");
        let mut warnings = vec![];
        let header = parse_header(&buf, &mut warnings).unwrap();
        assert_eq!(header.version, Version::V3_0);
        assert_eq!(header.text_start, 256);
        assert_eq!(header.text_stop, 1545);
        assert_eq!(header.data_start, 1792);
        assert_eq!(header.data_stop, 202456);
        assert!(warnings.is_empty());
    }

    #[test]
    fn large_file_sentinel_is_preserved() {
        let buf = make_header("FCS3.1", "256", "1545", "0", "0", "0", "0");
        let mut warnings = vec![];
        let header = parse_header(&buf, &mut warnings).unwrap();
        assert_eq!(header.data_start, 0);
        assert_eq!(header.data_stop, 0);
    }

    #[test]
    fn blank_analysis_offsets_become_negative_one() {
        let buf = make_header("FCS3.1", "256", "1545", "1792", "202456", "", "");
        let mut warnings = vec![];
        let header = parse_header(&buf, &mut warnings).unwrap();
        assert_eq!(header.analysis_start, -1);
        assert_eq!(header.analysis_stop, -1);
    }

    #[test]
    fn unsupported_version_falls_back_to_3_1_with_warning() {
        let buf = make_header("FCS3.2", "256", "1545", "1792", "202456", "0", "0");
        let mut warnings = vec![];
        let header = parse_header(&buf, &mut warnings).unwrap();
        assert_eq!(header.version, Version::V3_1);
        assert_eq!(warnings.len(), 1);
    }
}
