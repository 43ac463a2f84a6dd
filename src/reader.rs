//! Positioned, bounded reads against a seekable byte source.

use std::io::{Read, Seek, SeekFrom};

use crate::error::FcsResult;

/// Wraps a `Read + Seek` byte source and exposes the one operation the
/// rest of the engine needs: "give me exactly these inclusive bytes".
///
/// No caching; every call re-seeks and re-reads. FCS files are parsed
/// once per data set, so there is nothing to amortise.
pub(crate) struct ByteReader<'a, R: Read + Seek> {
    inner: &'a mut R,
    len: u64,
}

impl<'a, R: Read + Seek> ByteReader<'a, R> {
    pub(crate) fn new(inner: &'a mut R) -> FcsResult<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(ByteReader { inner, len })
    }

    /// Total length of the underlying stream.
    pub(crate) fn len(&self) -> u64 {
        self.len
    }

    /// Read the bytes in `[offset_base + start, offset_base + stop]`
    /// inclusive on both ends.
    pub(crate) fn read_range(&mut self, offset_base: u64, start: u64, stop: u64) -> FcsResult<Vec<u8>> {
        let n = (stop - start + 1) as usize;
        self.inner.seek(SeekFrom::Start(offset_base + start))?;
        let mut buf = vec![0u8; n];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }
}
