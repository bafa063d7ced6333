//! Random-access byte source.
//!
//! A [`Document`](crate::document::Document) reads its container through a
//! `ByteSource` for its whole lifetime: backward from the end to find the
//! index pointer, forward from any declared offset to parse objects. The
//! underlying reader is owned, so dropping the source releases the handle.

use crate::error::{Error, Result};
use std::io::{Read, Seek, SeekFrom};

/// Anything that can back a document.
pub trait PdfSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> PdfSource for T {}

/// Owned, seekable input with a known length.
pub struct ByteSource {
    inner: Box<dyn PdfSource>,
    len: u64,
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteSource").field("len", &self.len).finish()
    }
}

impl ByteSource {
    /// Wrap a reader, measuring its length.
    pub fn new(mut inner: Box<dyn PdfSource>) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self { inner, len })
    }

    /// Wrap an in-memory buffer.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let len = data.len() as u64;
        Self {
            inner: Box::new(std::io::Cursor::new(data)),
            len,
        }
    }

    /// Total length in bytes.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the source is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read up to `max_len` bytes starting at `offset`.
    ///
    /// Returns fewer bytes near the end of the source; an offset past the end
    /// is an error.
    pub fn read_at(&mut self, offset: usize, max_len: usize) -> Result<Vec<u8>> {
        if offset as u64 > self.len {
            return Err(Error::UnexpectedEof { offset });
        }
        let available = (self.len - offset as u64).min(max_len as u64) as usize;
        let mut buf = vec![0u8; available];
        self.inner.seek(SeekFrom::Start(offset as u64))?;
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read the last `n` bytes (or the whole source when shorter).
    pub fn tail(&mut self, n: usize) -> Result<(usize, Vec<u8>)> {
        let start = self.len().saturating_sub(n);
        let data = self.read_at(start, n)?;
        Ok((start, data))
    }

    /// Read the whole source.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        self.read_at(0, self.len())
    }

    /// Run `parse` over a window at `offset`, doubling the window while the
    /// parser reports end of input and more bytes exist.
    ///
    /// The closure receives the window and whether it reaches the end of the
    /// source.
    pub fn with_window<T>(
        &mut self,
        offset: usize,
        initial: usize,
        mut parse: impl FnMut(&[u8], bool) -> Result<T>,
    ) -> Result<T> {
        let mut size = initial.max(64);
        loop {
            let window = self.read_at(offset, size)?;
            let complete = offset + window.len() >= self.len();
            match parse(&window, complete) {
                Err(e) if e.is_eof() && !complete => size = size.saturating_mul(2),
                other => return other,
            }
        }
    }
}
