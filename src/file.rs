// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! File descriptors handed to the state machines.
//!
//! The protocol never opens anything itself: a receive manifest carries one
//! [`FileSink`] per expected name, a transmit list one [`FileSource`] per file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

// ============================================================================
// Capability Traits
// ============================================================================

/// Destination for a received file.
pub trait FileSink {
    /// Called once when a header binds this descriptor, before any data.
    fn begin(&mut self, _declared_size: u64) -> std::io::Result<()> {
        Ok(())
    }

    /// Returns how many bytes were accepted. A short count leaves the
    /// remainder owed, so the transfer will not finish cleanly.
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize>;
}

/// Origin of a transmitted file.
pub trait FileSource {
    /// Fill `buf` from `offset`; returning 0 before the declared size is
    /// reached is an error for the sender.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize>;
}

impl FileSink for Vec<u8> {
    fn begin(&mut self, _declared_size: u64) -> std::io::Result<()> {
        self.clear();
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.extend_from_slice(data);
        Ok(data.len())
    }
}

impl FileSource for &[u8] {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        let start = (offset as usize).min(self.len());
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }
}

impl FileSource for Vec<u8> {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        self.as_slice().read_at(offset, buf)
    }
}

// ============================================================================
// Descriptors
// ============================================================================

/// Manifest entry for a receive.
pub struct IncomingFile<'a> {
    pub name: String,
    /// Largest size the caller will accept. Once a header binds this entry
    /// it holds the bytes still owed and reaches 0 when the file is complete.
    pub size: u64,
    pub sink: &'a mut dyn FileSink,
}

impl<'a> IncomingFile<'a> {
    pub fn new(name: impl Into<String>, max_size: u64, sink: &'a mut dyn FileSink) -> Self {
        IncomingFile { name: name.into(), size: max_size, sink }
    }
}

/// One file of a transmit batch, sent in list order.
pub struct OutgoingFile<'a> {
    pub name: String,
    pub size: u64,
    pub source: &'a mut dyn FileSource,
}

impl<'a> OutgoingFile<'a> {
    pub fn new(name: impl Into<String>, size: u64, source: &'a mut dyn FileSource) -> Self {
        OutgoingFile { name: name.into(), size, source }
    }
}

// ============================================================================
// Filesystem Implementations
// ============================================================================

/// Writes into a file that is created (or truncated) when the header arrives.
pub struct FsSink {
    path: PathBuf,
    file: Option<File>,
}

impl FsSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FsSink { path: path.into(), file: None }
    }
}

impl FileSink for FsSink {
    fn begin(&mut self, declared_size: u64) -> std::io::Result<()> {
        log::debug!("Creating {} ({} bytes)", self.path.display(), declared_size);
        self.file = Some(File::create(&self.path)?);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        let file = self.file.as_mut().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                format!("{} written before header", self.path.display()),
            )
        })?;
        file.write_all(data)?;
        Ok(data.len())
    }
}

/// Reads an existing file by offset.
pub struct FsSource {
    file: File,
}

impl FsSource {
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        Ok(FsSource { file: File::open(path.into())? })
    }

    pub fn size(&self) -> std::io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

impl FileSource for FsSource {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_source_reads_by_offset() {
        let mut source: &[u8] = b"0123456789";
        let mut buf = [0u8; 4];

        assert_eq!(source.read_at(0, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"0123");
        assert_eq!(source.read_at(8, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"89");
        assert_eq!(source.read_at(20, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_vec_sink_restarts_on_begin() {
        let mut sink = b"stale".to_vec();
        sink.begin(3).unwrap();
        assert_eq!(FileSink::write(&mut sink, b"abc").unwrap(), 3);
        assert_eq!(sink, b"abc");
    }

    #[test]
    fn test_fs_round_trip() {
        let path = std::env::temp_dir().join("ymodem_fs_round_trip.bin");

        let mut sink = FsSink::new(&path);
        assert!(sink.write(b"early").is_err());
        sink.begin(6).unwrap();
        assert_eq!(sink.write(b"abc").unwrap(), 3);
        assert_eq!(sink.write(b"def").unwrap(), 3);
        drop(sink);

        let mut source = FsSource::open(&path).unwrap();
        assert_eq!(source.size().unwrap(), 6);
        let mut buf = [0u8; 8];
        assert_eq!(source.read_at(2, &mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"cdef");

        std::fs::remove_file(&path).ok();
    }
}
