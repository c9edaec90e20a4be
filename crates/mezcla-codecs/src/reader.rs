//! Adapters from [`ByteStream`] to `std::io` reader traits.
//!
//! hound and symphonia both consume `io::Read + io::Seek`; these wrappers
//! translate the sentinel-based [`ByteStream`] contract into `io` results.
//! A short read maps to `Ok(0)` (EOF), a rejected seek to an error.

use std::io::{self, Read, Seek, SeekFrom};

use mezcla_core::{ByteStream, SeekOrigin};
use symphonia::core::io::MediaSource;

fn apply_seek(stream: &mut dyn ByteStream, pos: SeekFrom) -> io::Result<u64> {
    let (offset, origin) = match pos {
        SeekFrom::Start(o) => (o as i64, SeekOrigin::Start),
        SeekFrom::Current(o) => (o, SeekOrigin::Current),
        SeekFrom::End(o) => (o, SeekOrigin::End),
    };
    let new_pos = stream.seek(offset, origin);
    if new_pos < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "seek out of range",
        ));
    }
    Ok(new_pos as u64)
}

/// Owning adapter used by decoders after `open` transfers the stream in.
pub(crate) struct StreamReader {
    inner: Box<dyn ByteStream>,
    len: Option<u64>,
}

impl StreamReader {
    pub(crate) fn new(mut inner: Box<dyn ByteStream>) -> Self {
        let len = match inner.size() {
            n if n >= 0 => Some(n as u64),
            _ => None,
        };
        Self { inner, len }
    }
}

impl Read for StreamReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.inner.read(buf))
    }
}

impl Seek for StreamReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        apply_seek(self.inner.as_mut(), pos)
    }
}

impl MediaSource for StreamReader {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        self.len
    }
}

/// Borrowing adapter used by `accept` probes, which only inspect the
/// stream and must leave ownership with the caller.
pub(crate) struct BorrowedReader<'a> {
    inner: &'a mut dyn ByteStream,
}

impl<'a> BorrowedReader<'a> {
    pub(crate) fn new(inner: &'a mut dyn ByteStream) -> Self {
        Self { inner }
    }
}

impl Read for BorrowedReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.inner.read(buf))
    }
}

impl Seek for BorrowedReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        apply_seek(self.inner, pos)
    }
}
