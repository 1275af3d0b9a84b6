// Byte store abstraction used by the page codec and the splice engine
//
// Everything above this layer talks to a StreamIo, so the same code runs
// against a file on disk or an in-memory buffer in tests.

use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::Result;

/// Read/write/tell/seek capability over a byte store
pub trait StreamIo {
    /// Read up to buf.len() bytes, returning how many were read (0 at end)
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write up to buf.len() bytes, returning how many were written
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Current absolute position
    fn tell(&mut self) -> Result<u64>;

    /// Move to an absolute position
    fn seek(&mut self, offset: u64) -> Result<()>;

    /// Cut the store to len bytes
    fn truncate(&mut self, len: u64) -> Result<()>;

    /// Push buffered writes down to the store
    fn flush(&mut self) -> Result<()>;

    /// Read until buf is full or the store is exhausted
    fn read_full(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Write every byte of buf
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = self.write(&buf[written..])?;
            if n == 0 {
                return Err(std::io::Error::from(std::io::ErrorKind::WriteZero).into());
            }
            written += n;
        }
        Ok(())
    }
}

/// File-backed store
#[derive(Debug)]
pub struct FileIo {
    file: File,
}

impl FileIo {
    /// Open an existing file for reading and in-place rewriting
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(FileIo { file })
    }

    /// Open an existing file for inspection only; writes will fail
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(FileIo { file })
    }

    pub fn from_file(file: File) -> Self {
        FileIo { file }
    }

    pub fn into_inner(self) -> File {
        self.file
    }
}

impl StreamIo for FileIo {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file.read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Ok(self.file.write(buf)?)
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.file.stream_position()?)
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }
}

/// In-memory store
#[derive(Debug, Default, Clone)]
pub struct MemoryIo {
    cursor: Cursor<Vec<u8>>,
}

impl MemoryIo {
    pub fn new(data: Vec<u8>) -> Self {
        MemoryIo { cursor: Cursor::new(data) }
    }

    pub fn get_ref(&self) -> &[u8] {
        self.cursor.get_ref()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.cursor.into_inner()
    }
}

impl StreamIo for MemoryIo {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.cursor.read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Ok(self.cursor.write(buf)?)
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.cursor.position())
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.cursor.set_position(offset);
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        self.cursor.get_mut().truncate(len as usize);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
