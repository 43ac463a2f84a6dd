//! Per-channel attributes (PnN, PnS, PnB, PnE, PnG, PnR), role
//! classification, and the event-matrix preprocessing transforms.

use regex::Regex;

use crate::error::{warn, FcsError, FcsResult, Warning};
use crate::text::Metadata;

/// How a channel's data should be treated downstream of the raw read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    Time,
    Scatter,
    Fluorescence,
    Null,
}

/// Derived attributes for one parameter (channel), numbered from 1.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSpec {
    pub number: usize,
    pub pnn: String,
    pub pns: String,
    pub pnb: u32,
    /// `(decades, log0)`. `(0.0, 0.0)` means linear.
    pub pne: (f64, f64),
    pub png: f64,
    pub pnr: f64,
    pub role: ChannelRole,
}

impl ChannelSpec {
    pub fn is_log_scale(&self) -> bool {
        self.pne.0 > 0.0
    }
}

fn classify(pnn: &str, null_channels: &[String]) -> ChannelRole {
    let lower = pnn.to_lowercase();
    if lower == "time" {
        ChannelRole::Time
    } else if lower.starts_with("fsc-") || lower.starts_with("ssc-") {
        ChannelRole::Scatter
    } else if null_channels.iter().any(|n| n == pnn) {
        ChannelRole::Null
    } else {
        ChannelRole::Fluorescence
    }
}

fn parse_pne(n: usize, raw: &str) -> FcsResult<(f64, f64)> {
    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() != 2 {
        return Err(FcsError::parse(format!(
            "invalid $P{n}E value '{raw}', expected 'decades,log0'"
        )));
    }
    let decades: f64 = parts[0]
        .trim()
        .parse()
        .map_err(|_| FcsError::parse(format!("invalid $P{n}E value '{raw}'")))?;
    let mut log0: f64 = parts[1]
        .trim()
        .parse()
        .map_err(|_| FcsError::parse(format!("invalid $P{n}E value '{raw}'")))?;

    // FCS 3.1 mandate: an invalid log(0) of 0 with nonzero decades means 1.0.
    if decades > 0.0 && log0 == 0.0 {
        log0 = 1.0;
    }
    Ok((decades, log0))
}

/// Discover the channel count from `$PnN` keys and derive every
/// channel's attributes from TEXT.
pub(crate) fn extract_channels(
    text: &Metadata,
    null_channels: &[String],
) -> FcsResult<Vec<ChannelSpec>> {
    let pnn_re = Regex::new(r"^p(\d+)n$").expect("static regex is valid");

    let mut numbers: Vec<usize> = text
        .keys()
        .filter_map(|k| pnn_re.captures(k).and_then(|c| c[1].parse::<usize>().ok()))
        .collect();
    numbers.sort_unstable();
    numbers.dedup();

    let mut channels = Vec::with_capacity(numbers.len());
    for n in numbers {
        let pnn = text
            .get(&format!("p{n}n"))
            .ok_or_else(|| FcsError::parse(format!("missing required $P{n}N")))?
            .to_string();
        let pns = text.get(&format!("p{n}s")).unwrap_or("").to_string();
        let pnb = text
            .get(&format!("p{n}b"))
            .ok_or_else(|| FcsError::parse(format!("missing required $P{n}B")))?
            .trim()
            .parse::<u32>()
            .map_err(|_| FcsError::parse(format!("invalid $P{n}B value")))?;
        let pne = match text.get(&format!("p{n}e")) {
            Some(raw) => parse_pne(n, raw)?,
            None => (0.0, 0.0),
        };
        let mut png = match text.get(&format!("p{n}g")) {
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .map_err(|_| FcsError::parse(format!("invalid $P{n}G value")))?,
            None => 1.0,
        };
        let pnr = text
            .get(&format!("p{n}r"))
            .ok_or_else(|| FcsError::parse(format!("missing required $P{n}R")))?
            .trim()
            .parse::<f64>()
            .map_err(|_| FcsError::parse(format!("invalid $P{n}R value")))?;

        let role = classify(&pnn, null_channels);
        if role == ChannelRole::Time {
            // The time channel is scaled by $TIMESTEP, not by amplifier
            // gain; some cytometers still write a PnG for it, so force it.
            png = 1.0;
        }

        channels.push(ChannelSpec {
            number: n,
            pnn,
            pns,
            pnb,
            pne,
            png,
            pnr,
            role,
        });
    }
    Ok(channels)
}

/// Apply the documented time-step, log-scale and gain corrections to a
/// flat row-major event sequence, returning a new 64-bit float buffer.
pub(crate) fn preprocess(
    events: &[f64],
    channel_count: usize,
    channels: &[ChannelSpec],
    timestep_text: Option<&str>,
    warnings: &mut Vec<Warning>,
) -> FcsResult<Vec<f64>> {
    let mut out = events.to_vec();
    if channel_count == 0 {
        return Ok(out);
    }
    let rows = out.len() / channel_count;

    let time_index = channels
        .iter()
        .find(|c| c.role == ChannelRole::Time)
        .map(|c| c.number - 1);

    if let (Some(ti), Some(raw)) = (time_index, timestep_text) {
        let step = if raw.trim().is_empty() {
            warn(warnings, Warning::InvalidTimestep(raw.to_string()));
            1.0
        } else {
            raw.trim().parse::<f64>().map_err(|_| {
                FcsError::parse(format!(
                    "timestep value should be a float value but found the value '{raw}'"
                ))
            })?
        };
        for row in 0..rows {
            out[row * channel_count + ti] *= step;
        }
    }

    for ch in channels {
        let idx = ch.number - 1;
        if idx >= channel_count {
            continue;
        }
        let (decades, log0) = ch.pne;
        if decades > 0.0 {
            for row in 0..rows {
                let pos = row * channel_count + idx;
                out[pos] = log0 * 10f64.powf(decades * out[pos] / ch.pnr);
            }
        }
        if ch.png != 0.0 && ch.png != 1.0 {
            for row in 0..rows {
                let pos = row * channel_count + idx;
                out[pos] /= ch.png;
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta_with(pairs: &[(&str, &str)]) -> Metadata {
        let mut m = Metadata::new();
        for (k, v) in pairs {
            m.insert(*k, *v);
        }
        m
    }

    #[test]
    fn extracts_channels_in_ascending_order() {
        let text = meta_with(&[
            ("p2n", "SSC-A"),
            ("p2b", "32"),
            ("p2r", "1024"),
            ("p1n", "FSC-A"),
            ("p1b", "32"),
            ("p1r", "1024"),
        ]);
        let channels = extract_channels(&text, &[]).unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].number, 1);
        assert_eq!(channels[0].pnn, "FSC-A");
        assert_eq!(channels[1].number, 2);
        assert_eq!(channels[1].role, ChannelRole::Scatter);
    }

    #[test]
    fn time_channel_gain_is_forced_to_one() {
        let text = meta_with(&[
            ("p1n", "Time"),
            ("p1b", "32"),
            ("p1r", "1024"),
            ("p1g", "4.5"),
        ]);
        let channels = extract_channels(&text, &[]).unwrap();
        assert_eq!(channels[0].role, ChannelRole::Time);
        assert_eq!(channels[0].png, 1.0);
    }

    #[test]
    fn pne_canonicalises_zero_log0() {
        let text = meta_with(&[("p1n", "FL1-A"), ("p1b", "32"), ("p1r", "1024"), ("p1e", "4,0")]);
        let channels = extract_channels(&text, &[]).unwrap();
        assert_eq!(channels[0].pne, (4.0, 1.0));
    }

    #[test]
    fn log_scale_decode_matches_documented_example() {
        let channels = vec![ChannelSpec {
            number: 1,
            pnn: "FL1-A".into(),
            pns: "".into(),
            pnb: 32,
            pne: (4.0, 1.0),
            png: 1.0,
            pnr: 1024.0,
            role: ChannelRole::Fluorescence,
        }];
        let mut warnings = vec![];
        let out = preprocess(&[256.0], 1, &channels, None, &mut warnings).unwrap();
        assert!((out[0] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn timestep_scales_time_column_only() {
        let channels = vec![
            ChannelSpec {
                number: 1,
                pnn: "Time".into(),
                pns: "".into(),
                pnb: 32,
                pne: (0.0, 0.0),
                png: 1.0,
                pnr: 1024.0,
                role: ChannelRole::Time,
            },
            ChannelSpec {
                number: 2,
                pnn: "FSC-A".into(),
                pns: "".into(),
                pnb: 32,
                pne: (0.0, 0.0),
                png: 1.0,
                pnr: 1024.0,
                role: ChannelRole::Scatter,
            },
        ];
        let mut warnings = vec![];
        let out = preprocess(&[2.0, 10.0], 2, &channels, Some("0.5"), &mut warnings).unwrap();
        assert_eq!(out, vec![1.0, 10.0]);
    }

    #[test]
    fn blank_timestep_defaults_to_one_with_warning() {
        let channels = vec![ChannelSpec {
            number: 1,
            pnn: "Time".into(),
            pns: "".into(),
            pnb: 32,
            pne: (0.0, 0.0),
            png: 1.0,
            pnr: 1024.0,
            role: ChannelRole::Time,
        }];
        let mut warnings = vec![];
        let out = preprocess(&[2.0], 1, &channels, Some("  "), &mut warnings).unwrap();
        assert_eq!(out, vec![2.0]);
        assert_eq!(warnings.len(), 1);
    }
}
