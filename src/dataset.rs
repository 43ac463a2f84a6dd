//! Top-level `DataSet`: orchestrates HEADER, TEXT, channel derivation
//! and DATA parsing into one immutable read result, plus multi-set
//! chaining over `$nextdata`.

use std::io::{Read, Seek, Write};

use crate::channel::{self, ChannelSpec};
use crate::config::ReadOptions;
use crate::data;
use crate::error::{FcsError, FcsResult, Warning};
use crate::header::{self, Header};
use crate::reader::ByteReader;
use crate::text::{self, Metadata};
use crate::writer;

/// One parsed FCS data set: header, both metadata segments, derived
/// channel table and the raw (unpreprocessed) event sequence.
#[derive(Debug, Clone)]
pub struct DataSet {
    pub header: Header,
    pub text: Metadata,
    pub analysis: Metadata,
    pub channels: Vec<ChannelSpec>,
    pub events: Vec<f64>,
    pub channel_count: usize,
    pub event_count: usize,
    pub file_size: u64,
    pub name: String,
    pub warnings: Vec<Warning>,
}

impl DataSet {
    /// Reshape `events` into a row-major N x P matrix, optionally
    /// applying the documented time-step/log-scale/gain corrections.
    pub fn as_array(&self, preprocess: bool) -> FcsResult<Vec<Vec<f64>>> {
        let flat = if preprocess {
            let mut warnings = self.warnings.clone();
            channel::preprocess(
                &self.events,
                self.channel_count,
                &self.channels,
                self.text.get("timestep"),
                &mut warnings,
            )?
        } else {
            self.events.clone()
        };

        if self.channel_count == 0 {
            return Ok(Vec::new());
        }
        Ok(flat
            .chunks(self.channel_count)
            .map(|row| row.to_vec())
            .collect())
    }

    /// Write this data set's events back out as a new FCS 3.1 file,
    /// using this data set's channel names and a caller-chosen subset
    /// of metadata.
    ///
    /// When `metadata` is `None`, carries over `$spillover` (or
    /// `$spill`), `$date`, `$cyt`, and each channel's original `$PnR`
    /// from this data set instead of writing bare defaults — the same
    /// default behavior this method is grounded on. Pass `Some` with an
    /// empty [`Metadata`] for the bare minimum instead.
    pub fn write_fcs<W: Write>(
        &self,
        output: &mut W,
        metadata: Option<&Metadata>,
        warnings: &mut Vec<Warning>,
    ) -> FcsResult<()> {
        let channel_names: Vec<String> = self.channels.iter().map(|c| c.pnn.clone()).collect();
        let event_data: Vec<f32> = self.events.iter().map(|&v| v as f32).collect();

        let default_meta;
        let metadata = match metadata {
            Some(m) => m,
            None => {
                default_meta = self.default_write_metadata();
                &default_meta
            }
        };

        writer::create_fcs(output, &event_data, &channel_names, None, Some(metadata), warnings)
    }

    fn default_write_metadata(&self) -> Metadata {
        let mut meta = Metadata::new();

        if let Some(spillover) = self.text.get("spillover").or_else(|| self.text.get("spill")) {
            meta.insert("spillover", spillover);
        }
        if let Some(date) = self.text.get("date") {
            meta.insert("date", date);
        }
        if let Some(cyt) = self.text.get("cyt") {
            meta.insert("cyt", cyt);
        }
        for channel in &self.channels {
            meta.insert(format!("p{}r", channel.number), channel.pnr.to_string());
        }

        meta
    }
}

fn read_one<R: Read + Seek>(
    source: &mut R,
    base_offset: u64,
    options: &ReadOptions,
) -> FcsResult<DataSet> {
    let mut reader = ByteReader::new(source)?;
    let file_size = reader.len();

    let header_bytes = reader.read_range(base_offset, 0, header::HEADER_LEN - 1)?;
    let mut warnings = Vec::new();
    let head = header::parse_header(&header_bytes, &mut warnings)?;

    let text_bytes = reader.read_range(base_offset, head.text_start, head.text_stop)?;
    let text = text::parse_segment(&text_bytes)?;

    // analysis_start of 0 would overlap the fixed HEADER prologue and can
    // never be a real offset; both the "absent" (-1) and "empty" (0, 0)
    // conventions collapse to the same empty-map result here.
    let analysis = if head.analysis_start > 0 && head.analysis_stop >= head.analysis_start {
        let bytes = reader.read_range(
            base_offset,
            head.analysis_start as u64,
            head.analysis_stop as u64,
        )?;
        text::parse_segment(&bytes)?
    } else {
        Metadata::new()
    };

    let channels = channel::extract_channels(&text, &options.null_channels)?;
    let channel_count = channels.len();

    let tot: usize = text
        .get("tot")
        .ok_or_else(|| FcsError::parse("TEXT is missing required $TOT"))?
        .trim()
        .parse()
        .map_err(|_| FcsError::parse("$TOT is not a valid integer"))?;

    let events = if options.only_text {
        Vec::new()
    } else {
        data::read_data(
            &mut reader,
            base_offset,
            &head,
            &text,
            &channels,
            options,
            &mut warnings,
        )?
    };

    if !options.only_text && events.len() != tot * channel_count {
        return Err(FcsError::parse(format!(
            "parsed {} event values, expected tot * par = {}",
            events.len(),
            tot * channel_count
        )));
    }

    let name = format!("data set at offset {base_offset}");

    Ok(DataSet {
        header: head,
        text,
        analysis,
        channels,
        events,
        channel_count,
        event_count: tot,
        file_size,
        name,
        warnings,
    })
}

/// Open a single FCS data set. Fails with [`FcsError::MultipleDataSets`]
/// if the file chains to a further data set via `$nextdata` and the
/// caller has not opted into multi-set reading through
/// [`ReadOptions::nextdata_offset`].
pub fn open<R: Read + Seek>(source: &mut R, options: &ReadOptions) -> FcsResult<DataSet> {
    let data_set = read_one(source, options.nextdata_offset, options)?;

    let nextdata: i64 = data_set
        .text
        .get("nextdata")
        .map(|s| s.trim().parse().unwrap_or(0))
        .unwrap_or(0);

    if nextdata < 0 {
        return Err(FcsError::MultipleDataSets(
            "$NEXTDATA is negative".to_string(),
        ));
    }
    if nextdata != 0 {
        return Err(FcsError::MultipleDataSets(format!(
            "file chains to another data set at relative offset {nextdata}; use read_multiple_data_sets"
        )));
    }

    Ok(data_set)
}

/// Walk the `$nextdata` chain from the start of the file, returning
/// every data set found.
pub fn read_multiple_data_sets<R: Read + Seek>(
    source: &mut R,
    options: &ReadOptions,
) -> FcsResult<Vec<DataSet>> {
    let mut data_sets = Vec::new();
    let mut base_offset = options.nextdata_offset;

    loop {
        let data_set = read_one(source, base_offset, options)?;
        let nextdata: i64 = data_set
            .text
            .get("nextdata")
            .map(|s| s.trim().parse().unwrap_or(0))
            .unwrap_or(0);

        data_sets.push(data_set);

        if nextdata < 0 {
            return Err(FcsError::MultipleDataSets(
                "$NEXTDATA is negative".to_string(),
            ));
        }
        if nextdata == 0 {
            break;
        }
        base_offset += nextdata as u64;
    }

    Ok(data_sets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn make_file(channel_names: &[&str], events: &[f32]) -> Vec<u8> {
        let names: Vec<String> = channel_names.iter().map(|s| s.to_string()).collect();
        let mut buf = Vec::new();
        let mut warnings = vec![];
        writer::create_fcs(&mut buf, events, &names, None, None, &mut warnings).unwrap();
        buf
    }

    #[test]
    fn opens_a_written_file_and_recovers_events() {
        let events: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let bytes = make_file(&["FSC-A"], &events);
        let mut cursor = Cursor::new(bytes);
        let data_set = open(&mut cursor, &ReadOptions::new()).unwrap();
        assert_eq!(data_set.channel_count, 1);
        assert_eq!(data_set.event_count, 10);
        assert_eq!(data_set.events, events.iter().map(|&v| v as f64).collect::<Vec<_>>());
    }

    #[test]
    fn as_array_reshapes_row_major() {
        let events: Vec<f32> = vec![0.0, 1.0, 2.0, 3.0];
        let bytes = make_file(&["FSC-A", "SSC-A"], &events);
        let mut cursor = Cursor::new(bytes);
        let data_set = open(&mut cursor, &ReadOptions::new()).unwrap();
        let matrix = data_set.as_array(false).unwrap();
        assert_eq!(matrix, vec![vec![0.0, 1.0], vec![2.0, 3.0]]);
    }

    #[test]
    fn empty_event_round_trip() {
        let events: Vec<f32> = vec![];
        let bytes = make_file(&["FSC-A"], &events);
        let mut cursor = Cursor::new(bytes);
        let data_set = open(&mut cursor, &ReadOptions::new()).unwrap();
        assert_eq!(data_set.event_count, 0);
        assert!(data_set.events.is_empty());
    }
}
