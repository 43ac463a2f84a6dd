//! Error and warning types for reading and writing FCS files.

use std::io;
use thiserror::Error;

/// Everything that can go wrong while reading or writing an FCS file.
#[derive(Debug, Error)]
pub enum FcsError {
    /// The underlying byte source failed (seek, short read, EOF).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A structural violation of the FCS format.
    #[error("FCS parse error: {0}")]
    Parse(String),

    /// HEADER and TEXT disagree on the DATA segment bounds and the
    /// caller has not opted in to tolerate the discrepancy.
    #[error(
        "DATA offset discrepancy for '{name}': HEADER gives {header_start}..={header_stop}, \
         TEXT gives {text_start}..={text_stop}"
    )]
    OffsetDiscrepancy {
        name: String,
        header_start: u64,
        header_stop: u64,
        text_start: u64,
        text_stop: u64,
    },

    /// The file contains more than one data set and the caller used the
    /// single-data-set entry point, or a `$nextdata` value was negative.
    #[error("multiple data sets error: {0}")]
    MultipleDataSets(String),

    /// A feature the engine deliberately does not implement.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl FcsError {
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        FcsError::Parse(msg.into())
    }

    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        FcsError::Unsupported(msg.into())
    }
}

pub type FcsResult<T> = Result<T, FcsError>;

/// A non-fatal condition encountered while parsing or writing, collected
/// alongside a successful result so a caller without a `tracing`
/// subscriber installed can still inspect what happened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Warning {
    #[error("unsupported FCS version tag '{0}', parsing as FCS3.1")]
    UnsupportedVersion(String),

    #[error(
        "FCS file reports a DATA offset that is off by 1; corrected by decrementing data_stop"
    )]
    OffByOneDataOffset,

    #[error("unsupported byte order '{0}', using host byte order")]
    UnsupportedByteOrder(String),

    #[error("non-standard integer bit width ({0}) for DATA segment; no event data produced")]
    NonStandardBitWidth(u32),

    #[error("invalid $PnE value '{given}' for channel {channel}, rewritten to '{rewritten}'")]
    PnE {
        channel: usize,
        given: String,
        rewritten: String,
    },

    #[error("invalid $TIMESTEP value '{0}', treated as 1.0")]
    InvalidTimestep(String),
}

/// Emits a [`Warning`] through `tracing` and appends it to `sink`.
pub(crate) fn warn(sink: &mut Vec<Warning>, w: Warning) {
    tracing::warn!("{w}");
    sink.push(w);
}
