//! Caller-facing options for reading FCS files.

/// Options controlling how tolerant a read is of non-conformant files,
/// and how much of the file gets parsed.
///
/// Mirrors the options-struct convention used across the FCS-reading
/// ecosystem (e.g. `fireflow-core`'s `HeaderConfig`): one struct,
/// `Default` plus `with_*` builder setters, instead of a long list of
/// boolean parameters on `open`.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Tolerate the "exclusive stop" off-by-one bug in the DATA segment
    /// size by decrementing `data_stop` by one.
    pub ignore_offset_error: bool,

    /// Tolerate a disagreement between HEADER and TEXT DATA offsets.
    pub ignore_offset_discrepancy: bool,

    /// Use the HEADER's DATA offsets unconditionally, bypassing all
    /// discrepancy checking against TEXT.
    pub use_header_offsets: bool,

    /// Only parse HEADER/TEXT/ANALYSIS; skip the DATA segment entirely.
    pub only_text: bool,

    /// Byte offset of this data set's HEADER, relative to the start of
    /// the file. Used internally by [`crate::read_multiple_data_sets`]
    /// to walk a `$nextdata` chain; callers reading a single data set
    /// normally leave this at the default of `0`.
    pub nextdata_offset: u64,

    /// Channel (`PnN`) names to exclude from both the fluorescence and
    /// scatter role classification.
    pub null_channels: Vec<String>,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ignore_offset_error(mut self, v: bool) -> Self {
        self.ignore_offset_error = v;
        self
    }

    pub fn with_ignore_offset_discrepancy(mut self, v: bool) -> Self {
        self.ignore_offset_discrepancy = v;
        self
    }

    pub fn with_use_header_offsets(mut self, v: bool) -> Self {
        self.use_header_offsets = v;
        self
    }

    pub fn with_only_text(mut self, v: bool) -> Self {
        self.only_text = v;
        self
    }

    pub fn with_nextdata_offset(mut self, offset: u64) -> Self {
        self.nextdata_offset = offset;
        self
    }

    pub fn with_null_channels(mut self, names: Vec<String>) -> Self {
        self.null_channels = names;
        self
    }
}
