//! Seekable binary I/O over files, memory, or caller-supplied sources.
//!
//! [`ByteStream`] is the input abstraction every decoder reads from. All
//! methods are total — they report failure through `0` / `-1` sentinels
//! instead of errors — so they are usable from realtime-sensitive paths.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Origin for a [`ByteStream::seek`] operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    /// Seek from the beginning of the stream.
    Start,
    /// Seek relative to the current position.
    Current,
    /// Seek relative to the end of the stream.
    End,
}

/// Seekable binary stream consumed by decoders.
///
/// Contracts:
/// - `read` returns `0` at EOF or on any error.
/// - `seek` past the end returns `-1` and leaves the position unchanged.
/// - `size` may return `-1` when the total length is unknown.
/// - After `close`, every operation except `is_open` reports failure.
///
/// All methods take `&mut self`, so the `Sync` bound costs implementations
/// nothing; it lets owned streams flow into readers that demand it.
pub trait ByteStream: Send + Sync {
    /// Read up to `buf.len()` bytes; returns the number actually read.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Write `buf` to the stream; returns the number of bytes written.
    /// Streams that do not support writing return `0`.
    fn write(&mut self, _buf: &[u8]) -> usize {
        0
    }

    /// Seek to a byte position. Returns the new position from the start,
    /// or `-1` on failure.
    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> i64;

    /// Current byte position from the start, or `-1` on failure.
    fn tell(&mut self) -> i64;

    /// Total stream size in bytes, or `-1` if unknown.
    fn size(&mut self) -> i64;

    /// Close the stream. Subsequent operations report failure.
    fn close(&mut self);

    /// Whether the stream is open and usable.
    fn is_open(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Memory stream
// ---------------------------------------------------------------------------

/// In-memory byte stream over an owned buffer.
pub struct MemoryStream {
    data: Vec<u8>,
    pos: usize,
    writable: bool,
    open: bool,
}

impl MemoryStream {
    /// Create a read-only stream over `data`.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            writable: false,
            open: true,
        }
    }

    /// Create a read-write stream over `data`. Writes overwrite in place and
    /// never grow the buffer.
    pub fn writable(data: Vec<u8>) -> Self {
        Self {
            writable: true,
            ..Self::new(data)
        }
    }

    /// Consume the stream and return the underlying buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl ByteStream for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        if !self.open || self.pos >= self.data.len() {
            return 0;
        }
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        n
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        if !self.open || !self.writable || self.pos >= self.data.len() {
            return 0;
        }
        let n = buf.len().min(self.data.len() - self.pos);
        self.data[self.pos..self.pos + n].copy_from_slice(&buf[..n]);
        self.pos += n;
        n
    }

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> i64 {
        if !self.open {
            return -1;
        }
        let base = match origin {
            SeekOrigin::Start => 0,
            SeekOrigin::Current => self.pos as i64,
            SeekOrigin::End => self.data.len() as i64,
        };
        let new_pos = base + offset;
        if new_pos < 0 || new_pos > self.data.len() as i64 {
            return -1;
        }
        self.pos = new_pos as usize;
        new_pos
    }

    fn tell(&mut self) -> i64 {
        if self.open { self.pos as i64 } else { -1 }
    }

    fn size(&mut self) -> i64 {
        if self.open { self.data.len() as i64 } else { -1 }
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

// ---------------------------------------------------------------------------
// File stream
// ---------------------------------------------------------------------------

/// Byte stream backed by a file on disk.
pub struct FileStream {
    file: Option<File>,
}

impl FileStream {
    /// Open a file for reading. Returns `None` when the file cannot be
    /// opened; callers check before use.
    pub fn open(path: impl AsRef<Path>) -> Option<Self> {
        File::open(path).ok().map(|file| Self { file: Some(file) })
    }

    /// Create (or truncate) a file for read-write access. Returns `None`
    /// on failure.
    pub fn create(path: impl AsRef<Path>) -> Option<Self> {
        File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .ok()
            .map(|file| Self { file: Some(file) })
    }
}

impl ByteStream for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let Some(file) = self.file.as_mut() else {
            return 0;
        };
        file.read(buf).unwrap_or(0)
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        let Some(file) = self.file.as_mut() else {
            return 0;
        };
        file.write(buf).unwrap_or(0)
    }

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> i64 {
        let Some(file) = self.file.as_mut() else {
            return -1;
        };
        let end = match file.metadata() {
            Ok(meta) => meta.len() as i64,
            Err(_) => return -1,
        };
        let base = match origin {
            SeekOrigin::Start => 0,
            SeekOrigin::Current => match file.stream_position() {
                Ok(pos) => pos as i64,
                Err(_) => return -1,
            },
            SeekOrigin::End => end,
        };
        let target = base + offset;
        if target < 0 || target > end {
            return -1;
        }
        match file.seek(SeekFrom::Start(target as u64)) {
            Ok(pos) => pos as i64,
            Err(_) => -1,
        }
    }

    fn tell(&mut self) -> i64 {
        match self.file.as_mut() {
            Some(file) => file.stream_position().map_or(-1, |p| p as i64),
            None => -1,
        }
    }

    fn size(&mut self) -> i64 {
        match self.file.as_ref() {
            Some(file) => file.metadata().map_or(-1, |m| m.len() as i64),
            None => -1,
        }
    }

    fn close(&mut self) {
        self.file = None;
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

// ---------------------------------------------------------------------------
// Endian-aware read helpers
// ---------------------------------------------------------------------------

/// Read exactly `N` bytes, or `None` on a short read.
fn read_exact<const N: usize>(stream: &mut dyn ByteStream) -> Option<[u8; N]> {
    let mut buf = [0u8; N];
    (stream.read(&mut buf) == N).then_some(buf)
}

/// Read an unsigned 8-bit value.
pub fn read_u8(stream: &mut dyn ByteStream) -> Option<u8> {
    read_exact::<1>(stream).map(|b| b[0])
}

/// Read an unsigned 16-bit little-endian value.
pub fn read_u16le(stream: &mut dyn ByteStream) -> Option<u16> {
    read_exact::<2>(stream).map(u16::from_le_bytes)
}

/// Read an unsigned 16-bit big-endian value.
pub fn read_u16be(stream: &mut dyn ByteStream) -> Option<u16> {
    read_exact::<2>(stream).map(u16::from_be_bytes)
}

/// Read an unsigned 32-bit little-endian value.
pub fn read_u32le(stream: &mut dyn ByteStream) -> Option<u32> {
    read_exact::<4>(stream).map(u32::from_le_bytes)
}

/// Read an unsigned 32-bit big-endian value.
pub fn read_u32be(stream: &mut dyn ByteStream) -> Option<u32> {
    read_exact::<4>(stream).map(u32::from_be_bytes)
}

/// Read a signed 16-bit little-endian value.
pub fn read_s16le(stream: &mut dyn ByteStream) -> Option<i16> {
    read_exact::<2>(stream).map(i16::from_le_bytes)
}

/// Read a signed 16-bit big-endian value.
pub fn read_s16be(stream: &mut dyn ByteStream) -> Option<i16> {
    read_exact::<2>(stream).map(i16::from_be_bytes)
}

/// Read a signed 32-bit little-endian value.
pub fn read_s32le(stream: &mut dyn ByteStream) -> Option<i32> {
    read_exact::<4>(stream).map(i32::from_le_bytes)
}

/// Read a signed 32-bit big-endian value.
pub fn read_s32be(stream: &mut dyn ByteStream) -> Option<i32> {
    read_exact::<4>(stream).map(i32::from_be_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_stream_read_and_eof() {
        let mut s = MemoryStream::new(vec![1, 2, 3, 4, 5]);
        let mut buf = [0u8; 3];
        assert_eq!(s.read(&mut buf), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(s.read(&mut buf), 2);
        assert_eq!(s.read(&mut buf), 0);
    }

    #[test]
    fn memory_stream_seek_bounds() {
        let mut s = MemoryStream::new(vec![0u8; 10]);
        assert_eq!(s.seek(4, SeekOrigin::Start), 4);
        assert_eq!(s.seek(2, SeekOrigin::Current), 6);
        assert_eq!(s.seek(-4, SeekOrigin::End), 6);
        // Past end and before start both fail without moving.
        assert_eq!(s.seek(11, SeekOrigin::Start), -1);
        assert_eq!(s.seek(-1, SeekOrigin::Start), -1);
        assert_eq!(s.tell(), 6);
    }

    #[test]
    fn memory_stream_write_respects_mode() {
        let mut ro = MemoryStream::new(vec![0u8; 4]);
        assert_eq!(ro.write(&[1, 2]), 0);

        let mut rw = MemoryStream::writable(vec![0u8; 4]);
        assert_eq!(rw.write(&[1, 2]), 2);
        assert_eq!(rw.into_inner(), vec![1, 2, 0, 0]);
    }

    #[test]
    fn closed_stream_reports_failure() {
        let mut s = MemoryStream::new(vec![1, 2, 3]);
        s.close();
        assert!(!s.is_open());
        let mut buf = [0u8; 1];
        assert_eq!(s.read(&mut buf), 0);
        assert_eq!(s.tell(), -1);
        assert_eq!(s.size(), -1);
        assert_eq!(s.seek(0, SeekOrigin::Start), -1);
    }

    #[test]
    fn endian_helpers() {
        let mut s = MemoryStream::new(vec![0x34, 0x12, 0x12, 0x34]);
        assert_eq!(read_u16le(&mut s), Some(0x1234));
        assert_eq!(read_u16be(&mut s), Some(0x1234));
        assert_eq!(read_u16le(&mut s), None);
    }

    #[test]
    fn file_stream_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, [9u8, 8, 7, 6]).unwrap();

        let mut s = FileStream::open(&path).unwrap();
        assert_eq!(s.size(), 4);
        let mut buf = [0u8; 2];
        assert_eq!(s.read(&mut buf), 2);
        assert_eq!(buf, [9, 8]);
        assert_eq!(s.seek(0, SeekOrigin::Start), 0);
        assert_eq!(s.read(&mut buf), 2);
        assert_eq!(buf, [9, 8]);
        assert_eq!(s.seek(10, SeekOrigin::Start), -1);

        assert!(FileStream::open(dir.path().join("missing.bin")).is_none());
    }
}
