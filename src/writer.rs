//! Byte-exact FCS 3.1 writer: TEXT rendering, the `$BEGINDATA`/`$ENDDATA`
//! offset fixed point, and contiguous little-endian float DATA.

use std::collections::HashMap;
use std::io::Write;

use crate::error::{warn, FcsError, FcsResult, Warning};
use crate::text::Metadata;

const TEXT_START: u64 = 256;
const DELIMITER: char = '/';
const BYTE_LIMIT: u64 = 99_999_999;

const REQUIRED_KEYWORDS: &[&str] = &[
    "beginanalysis",
    "begindata",
    "beginstext",
    "byteord",
    "datatype",
    "endanalysis",
    "enddata",
    "endstext",
    "mode",
    "nextdata",
    "par",
    "tot",
];

const OPTIONAL_KEYWORDS: &[&str] = &[
    "abrt",
    "btim",
    "cells",
    "com",
    "csmode",
    "csvbits",
    "cyt",
    "cytsn",
    "date",
    "etim",
    "exp",
    "fil",
    "gate",
    "inst",
    "last_modified",
    "last_modifier",
    "lost",
    "op",
    "originality",
    "plateid",
    "platename",
    "proj",
    "smno",
    "spillover",
    "src",
    "sys",
    "timestep",
    "tr",
    "vol",
    "wellid",
];

const PER_CHANNEL_REQUIRED_SUFFIXES: &[&str] = &["b", "e", "g", "r", "n", "s"];
const PER_CHANNEL_OPTIONAL_SUFFIXES: &[&str] = &["d", "f", "l", "o", "p", "t", "v", "calibration"];

fn escape(value: &str) -> String {
    value.replace(DELIMITER, "//")
}

/// Splits a lowercased key of the form `p<digits><suffix>` into its
/// channel number and suffix, if it has that shape.
fn per_channel_key(key: &str) -> Option<(usize, &str)> {
    let rest = key.strip_prefix('p')?;
    let digit_len = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digit_len == 0 {
        return None;
    }
    let (digits, suffix) = rest.split_at(digit_len);
    if suffix.is_empty() {
        return None;
    }
    digits.parse::<usize>().ok().map(|n| (n, suffix))
}

#[derive(Default)]
struct ChannelOverrides {
    b: Option<String>,
    e: Option<String>,
    g: Option<String>,
    r: Option<String>,
    n: Option<String>,
    s: Option<String>,
}

struct Classified {
    channel_overrides: HashMap<usize, ChannelOverrides>,
    with_dollar: Vec<(String, String)>,
    tail: Vec<(String, String)>,
}

/// Sort caller-supplied metadata into the three buckets the TEXT
/// renderer needs: per-channel required-field overrides, standard
/// optional keywords (rewritten uppercase with `$`), and everything
/// else (appended verbatim, no `$`, in encounter order).
fn classify_user_metadata(metadata: &Metadata) -> FcsResult<Classified> {
    let mut channel_overrides: HashMap<usize, ChannelOverrides> = HashMap::new();
    let mut with_dollar = Vec::new();
    let mut tail = Vec::new();

    for (key, value) in metadata.iter() {
        let key = key.trim_start_matches('$').to_lowercase();

        if REQUIRED_KEYWORDS.contains(&key.as_str()) {
            continue;
        }

        if key == "datatype" {
            continue;
        }

        if let Some((n, suffix)) = per_channel_key(&key) {
            if PER_CHANNEL_REQUIRED_SUFFIXES.contains(&suffix) {
                let entry = channel_overrides.entry(n).or_default();
                match suffix {
                    "b" => entry.b = Some(value.to_string()),
                    "e" => entry.e = Some(value.to_string()),
                    "g" => entry.g = Some(value.to_string()),
                    "r" => entry.r = Some(value.to_string()),
                    "n" => entry.n = Some(value.to_string()),
                    "s" => entry.s = Some(value.to_string()),
                    _ => unreachable!(),
                }
                continue;
            }
            if PER_CHANNEL_OPTIONAL_SUFFIXES.contains(&suffix) {
                with_dollar.push((key.to_uppercase(), value.to_string()));
                continue;
            }
        }

        if OPTIONAL_KEYWORDS.contains(&key.as_str()) {
            with_dollar.push((key.to_uppercase(), value.to_string()));
            continue;
        }

        tail.push((key.to_uppercase(), value.to_string()));
    }

    Ok(Classified {
        channel_overrides,
        with_dollar,
        tail,
    })
}

fn format_float(value: f32) -> String {
    format!("{value}")
}

#[allow(clippy::too_many_arguments)]
fn render_text(
    begindata: &str,
    enddata: &str,
    par: usize,
    tot: usize,
    channel_names: &[String],
    opt_channel_names: Option<&[String]>,
    pnr_value: &str,
    overrides: &HashMap<usize, ChannelOverrides>,
    with_dollar: &[(String, String)],
    tail: &[(String, String)],
) -> String {
    let mut out = String::new();
    out.push(DELIMITER);

    let mut push_required = |key: &str, value: &str| {
        out.push('$');
        out.push_str(key);
        out.push(DELIMITER);
        out.push_str(&escape(value));
        out.push(DELIMITER);
    };

    push_required("BEGINANALYSIS", "0");
    push_required("BEGINDATA", begindata);
    push_required("BEGINSTEXT", "0");
    push_required("BYTEORD", "1,2,3,4");
    push_required("DATATYPE", "F");
    push_required("ENDANALYSIS", "0");
    push_required("ENDDATA", enddata);
    push_required("ENDSTEXT", "0");
    push_required("MODE", "L");
    push_required("NEXTDATA", "0");
    push_required("PAR", &par.to_string());
    push_required("TOT", &tot.to_string());

    for n in 1..=par {
        let empty = ChannelOverrides::default();
        let ov = overrides.get(&n).unwrap_or(&empty);

        let b = ov.b.clone().unwrap_or_else(|| "32".to_string());
        let e = ov.e.clone().unwrap_or_else(|| "0,0".to_string());
        let g = ov.g.clone().unwrap_or_else(|| "1.0".to_string());
        let r = ov.r.clone().unwrap_or_else(|| pnr_value.to_string());
        let name = ov
            .n
            .clone()
            .unwrap_or_else(|| channel_names[n - 1].clone());

        out.push('$');
        out.push_str(&format!("P{n}B"));
        out.push(DELIMITER);
        out.push_str(&escape(&b));
        out.push(DELIMITER);

        out.push('$');
        out.push_str(&format!("P{n}E"));
        out.push(DELIMITER);
        out.push_str(&escape(&e));
        out.push(DELIMITER);

        out.push('$');
        out.push_str(&format!("P{n}G"));
        out.push(DELIMITER);
        out.push_str(&escape(&g));
        out.push(DELIMITER);

        out.push('$');
        out.push_str(&format!("P{n}R"));
        out.push(DELIMITER);
        out.push_str(&escape(&r));
        out.push(DELIMITER);

        out.push('$');
        out.push_str(&format!("P{n}N"));
        out.push(DELIMITER);
        out.push_str(&escape(&name));
        out.push(DELIMITER);

        let s = ov.s.clone().or_else(|| {
            opt_channel_names
                .and_then(|names| names.get(n - 1))
                .filter(|v| !v.is_empty())
                .cloned()
        });
        if let Some(s) = s {
            if !s.is_empty() {
                out.push('$');
                out.push_str(&format!("P{n}S"));
                out.push(DELIMITER);
                out.push_str(&escape(&s));
                out.push(DELIMITER);
            }
        }
    }

    for (key, value) in with_dollar {
        out.push('$');
        out.push_str(key);
        out.push(DELIMITER);
        out.push_str(&escape(value));
        out.push(DELIMITER);
    }

    for (key, value) in tail {
        out.push_str(key);
        out.push(DELIMITER);
        out.push_str(&escape(value));
        out.push(DELIMITER);
    }

    out
}

fn digits(n: u64) -> u32 {
    n.to_string().len() as u32
}

/// Compute the self-consistent `$BEGINDATA` value, per the documented
/// fixed-point correction over digit-length growth: the string lengths
/// of BEGINDATA and ENDDATA themselves push the data start forward, and
/// close to a power-of-ten boundary that growth can tip either value
/// into one more digit than `initial_begin`/`initial_end` have.
fn fixed_point_begindata(initial_begin: u64, initial_end: u64) -> u64 {
    let b = digits(initial_begin);
    let e = digits(initial_end);
    let total = (b + e) as u64;

    let mut correction = 0u64;
    let gap_begin = 10u64.pow(b).saturating_sub(initial_begin);
    if gap_begin != 0 && gap_begin <= total {
        correction += 1;
    }
    let gap_end = 10u64.pow(e).saturating_sub(initial_end);
    if gap_end != 0 && gap_end <= total {
        correction += 1;
    }

    initial_begin + b as u64 + e as u64 + correction
}

/// Write a complete FCS 3.1 file: HEADER, TEXT and a contiguous
/// little-endian 32-bit float DATA segment.
pub fn create_fcs<W: Write>(
    output: &mut W,
    event_data: &[f32],
    channel_names: &[String],
    opt_channel_names: Option<&[String]>,
    metadata: Option<&Metadata>,
    warnings: &mut Vec<Warning>,
) -> FcsResult<()> {
    let n_channels = channel_names.len();
    if n_channels == 0 {
        return Err(FcsError::parse("channel_names must not be empty"));
    }
    if let Some(opt) = opt_channel_names {
        if opt.len() != n_channels {
            return Err(FcsError::parse(
                "opt_channel_names must have the same length as channel_names",
            ));
        }
    }

    let n_points = event_data.len();
    if n_points % n_channels != 0 {
        return Err(FcsError::parse(
            "event_data length is not a multiple of channel_names length",
        ));
    }
    let n_events = n_points / n_channels;
    let data_size = 4u64 * n_points as u64;

    let empty_meta = Metadata::new();
    let metadata = metadata.unwrap_or(&empty_meta);

    if let Some(dt) = metadata.get("datatype") {
        if dt != "F" {
            return Err(FcsError::unsupported(format!(
                "writer only supports $DATATYPE 'F', got '{dt}'"
            )));
        }
    }

    for (key, value) in metadata.iter() {
        let key = key.trim_start_matches('$').to_lowercase();
        if let Some((n, "e")) = per_channel_key(&key) {
            if value != "0,0" {
                let rewritten = rewrite_pne(value);
                warn(
                    warnings,
                    Warning::PnE {
                        channel: n,
                        given: value.to_string(),
                        rewritten: rewritten.clone(),
                    },
                );
            }
        }
    }

    let pnr_value = if n_points == 0 {
        "262144".to_string()
    } else {
        let max = event_data.iter().cloned().fold(f32::MIN, f32::max);
        if max < 262_144.0 {
            "262144".to_string()
        } else {
            format_float(max)
        }
    };

    let Classified {
        channel_overrides,
        with_dollar,
        tail,
    } = classify_user_metadata(metadata)?;

    // Apply the $PnE canonicalisation (log0 rewrite) to any caller override.
    let mut channel_overrides = channel_overrides;
    for ov in channel_overrides.values_mut() {
        if let Some(e) = &ov.e {
            ov.e = Some(rewrite_pne(e));
        }
    }

    let render = |begindata: &str, enddata: &str| {
        render_text(
            begindata,
            enddata,
            n_channels,
            n_events,
            channel_names,
            opt_channel_names,
            &pnr_value,
            &channel_overrides,
            &with_dollar,
            &tail,
        )
    };

    let text_len0 = render("", "").len() as u64;
    let initial_begin = TEXT_START + text_len0;
    let initial_end = if data_size == 0 {
        initial_begin.saturating_sub(1)
    } else {
        initial_begin + data_size - 1
    };

    let begindata = fixed_point_begindata(initial_begin, initial_end);
    let enddata = if data_size == 0 {
        begindata.saturating_sub(1)
    } else {
        begindata + data_size - 1
    };

    let text_string = render(&begindata.to_string(), &enddata.to_string());

    if TEXT_START + text_string.len() as u64 != begindata {
        return Err(FcsError::parse(
            "REPORT BUG: error calculating text offset",
        ));
    }

    output.write_all(b"FCS3.1")?;
    output.write_all(b"    ")?;
    output.write_all(format!("{TEXT_START:>8}").as_bytes())?;
    output.write_all(format!("{:>8}", begindata - 1).as_bytes())?;

    if enddata <= BYTE_LIMIT {
        output.write_all(format!("{begindata:>8}").as_bytes())?;
        output.write_all(format!("{enddata:>8}").as_bytes())?;
    } else {
        output.write_all(format!("{:>8}", 0).as_bytes())?;
        output.write_all(format!("{:>8}", 0).as_bytes())?;
    }
    output.write_all(format!("{:>8}", 0).as_bytes())?;
    output.write_all(format!("{:>8}", 0).as_bytes())?;

    let header_written = 58u64;
    let padding = TEXT_START - header_written;
    output.write_all(&vec![b' '; padding as usize])?;

    output.write_all(text_string.as_bytes())?;

    for &value in event_data {
        output.write_all(&value.to_le_bytes())?;
    }

    Ok(())
}

fn rewrite_pne(raw: &str) -> String {
    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() != 2 {
        return raw.to_string();
    }
    let decades: f64 = parts[0].trim().parse().unwrap_or(0.0);
    let log0: f64 = parts[1].trim().parse().unwrap_or(0.0);
    if decades > 0.0 && log0 == 0.0 {
        format!("{},1", parts[0].trim())
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_counts() {
        assert_eq!(digits(9), 1);
        assert_eq!(digits(10), 2);
        assert_eq!(digits(999), 3);
        assert_eq!(digits(1000), 4);
    }

    #[test]
    fn write_then_read_identity_offsets() {
        let channels = vec!["FSC-A".to_string()];
        let events: Vec<f32> = (0..135).map(|i| i as f32).collect();
        let mut buf = Vec::new();
        let mut warnings = vec![];
        create_fcs(&mut buf, &events, &channels, None, None, &mut warnings).unwrap();

        let data_start = std::str::from_utf8(&buf[26..34]).unwrap().trim().parse::<u64>().unwrap();
        let data_stop = std::str::from_utf8(&buf[34..42]).unwrap().trim().parse::<u64>().unwrap();
        assert_eq!(data_start, 457);
        assert_eq!(data_stop, 996);
    }

    #[test]
    fn off_by_one_boundary_offsets() {
        let channels = vec!["FSC-A".to_string()];
        let events: Vec<f32> = (0..136).map(|i| i as f32).collect();
        let mut buf = Vec::new();
        let mut warnings = vec![];
        create_fcs(&mut buf, &events, &channels, None, None, &mut warnings).unwrap();

        let data_start = std::str::from_utf8(&buf[26..34]).unwrap().trim().parse::<u64>().unwrap();
        let data_stop = std::str::from_utf8(&buf[34..42]).unwrap().trim().parse::<u64>().unwrap();
        assert_eq!(data_start, 458);
        assert_eq!(data_stop, 1001);
    }

    #[test]
    fn extra_metadata_offset_correction() {
        let channels = vec!["FSC-A".to_string()];
        let events: Vec<f32> = (0..135).map(|i| i as f32).collect();

        let mut meta = Metadata::new();
        meta.insert("com", "x".repeat(535));
        let mut buf = Vec::new();
        let mut warnings = vec![];
        create_fcs(&mut buf, &events, &channels, None, Some(&meta), &mut warnings).unwrap();
        let data_start = std::str::from_utf8(&buf[26..34]).unwrap().trim().parse::<u64>().unwrap();
        let data_stop = std::str::from_utf8(&buf[34..42]).unwrap().trim().parse::<u64>().unwrap();
        assert_eq!(data_start, 999);
        assert_eq!(data_stop, 1538);

        let mut meta2 = Metadata::new();
        meta2.insert("com", "x".repeat(536));
        let mut buf2 = Vec::new();
        create_fcs(&mut buf2, &events, &channels, None, Some(&meta2), &mut warnings).unwrap();
        let data_start2 = std::str::from_utf8(&buf2[26..34]).unwrap().trim().parse::<u64>().unwrap();
        let data_stop2 = std::str::from_utf8(&buf2[34..42]).unwrap().trim().parse::<u64>().unwrap();
        assert_eq!(data_start2, 1001);
        assert_eq!(data_stop2, 1540);
    }

    #[test]
    fn empty_events_are_accepted() {
        let channels = vec!["FSC-A".to_string()];
        let events: Vec<f32> = vec![];
        let mut buf = Vec::new();
        let mut warnings = vec![];
        create_fcs(&mut buf, &events, &channels, None, None, &mut warnings).unwrap();
        assert!(!buf.is_empty());
    }

    #[test]
    fn pne_log0_canonicalises_and_warns() {
        let channels = vec!["FSC-A".to_string()];
        let events: Vec<f32> = vec![1.0];
        let mut meta = Metadata::new();
        meta.insert("p1e", "4,0");
        let mut buf = Vec::new();
        let mut warnings = vec![];
        create_fcs(&mut buf, &events, &channels, None, Some(&meta), &mut warnings).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(matches!(warnings[0], Warning::PnE { .. }));

        let text = String::from_utf8_lossy(&buf);
        assert!(text.contains("P1E/4,1/"));
    }
}
