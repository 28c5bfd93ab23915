use crate::backend::ObjectBackend;
use crate::buffer::RangeWindow;
use bytes::Bytes;
use silo_core::StreamReader;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;
use tracing::trace;

/// A reader that adapts an object to `std::io::Read`, `Seek` and positional reads
///
/// Seeking only moves the cursor; the next read fetches from the new position
/// with a ranged request.
pub struct ObjectReader<B> {
    backend: Arc<B>,
    key: String,
    /// Current position in the object
    position: u64,
    /// Total size of the object
    size: u64,
    /// Bytes requested per sequential fetch
    buffer_size: usize,
    window: Option<RangeWindow>,
}

impl<B> std::fmt::Debug for ObjectReader<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectReader")
            .field("key", &self.key)
            .field("position", &self.position)
            .field("size", &self.size)
            .finish()
    }
}

impl<B: ObjectBackend> ObjectReader<B> {
    /// Reader over `key`, whose size the caller already knows from a stat.
    pub fn new(backend: Arc<B>, key: impl Into<String>, size: u64, buffer_size: usize) -> Self {
        Self {
            backend,
            key: key.into(),
            position: 0,
            size,
            buffer_size: buffer_size.max(1),
            window: None,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Download `start..end`; callers never ask for an empty range.
    fn fetch(&self, start: u64, end: u64) -> io::Result<Bytes> {
        trace!(key = %self.key, start, end, "fetching range");
        Ok(self.backend.get_range(&self.key, start..end)?)
    }

    /// Download the window around the cursor unless it is already held.
    fn ensure_window(&mut self) -> io::Result<()> {
        if self.window.as_ref().is_some_and(|w| w.holds(self.position)) {
            return Ok(());
        }

        let end = (self.position + self.buffer_size as u64).min(self.size);
        let data = self.fetch(self.position, end)?;
        if data.is_empty() {
            // Object shrank underneath us.
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{}: object ended before its reported size", self.key),
            ));
        }
        self.window = Some(RangeWindow::new(self.position, data));
        Ok(())
    }
}

impl<B: ObjectBackend> Read for ObjectReader<B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.position >= self.size {
            return Ok(0);
        }

        self.ensure_window()?;

        let Some(available) = self.window.as_ref().and_then(|w| w.tail(self.position)) else {
            return Ok(0);
        };
        let to_read = buf.len().min(available.len());
        buf[..to_read].copy_from_slice(&available[..to_read]);
        self.position += to_read as u64;
        Ok(to_read)
    }
}

impl<B: ObjectBackend> Seek for ObjectReader<B> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(offset) => self.size.checked_add_signed(offset),
            SeekFrom::Current(offset) => self.position.checked_add_signed(offset),
        };

        match new_pos {
            Some(new_pos) => {
                self.position = new_pos;
                Ok(new_pos)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Cannot seek before start of object",
            )),
        }
    }
}

impl<B: ObjectBackend> StreamReader for ObjectReader<B> {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }

        let range = offset..(offset + buf.len() as u64).min(self.size);
        if let Some(held) = self.window.as_ref().and_then(|w| w.slice(&range)) {
            buf[..held.len()].copy_from_slice(held);
            return Ok(held.len());
        }

        let data = self.fetch(range.start, range.end)?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::MemoryBucket;

    fn reader_over(data: &'static [u8], buffer_size: usize) -> ObjectReader<MemoryBucket> {
        let bucket = MemoryBucket::new();
        bucket.put("obj", Bytes::from_static(data)).unwrap();
        ObjectReader::new(Arc::new(bucket), "obj", data.len() as u64, buffer_size)
    }

    #[test]
    fn test_sequential_read_across_buffers() {
        let mut reader = reader_over(b"0123456789", 3);
        let mut all = Vec::new();
        reader.read_to_end(&mut all).unwrap();
        assert_eq!(all, b"0123456789");
    }

    #[test]
    fn test_seek_is_deferred() {
        let mut reader = reader_over(b"0123456789", 4);
        assert_eq!(reader.seek(SeekFrom::End(-3)).unwrap(), 7);
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"789");

        // Past the end reads as EOF, before the start is an error.
        assert_eq!(reader.seek(SeekFrom::Start(50)).unwrap(), 50);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert!(reader.seek(SeekFrom::Current(-100)).is_err());
    }

    #[test]
    fn test_read_at_short_count_at_end() {
        let mut reader = reader_over(b"0123456789", 4);
        let mut buf = [0u8; 4];
        assert_eq!(reader.read_at(&mut buf, 8).unwrap(), 2);
        assert_eq!(&buf[..2], b"89");
        assert_eq!(reader.read_at(&mut buf, 10).unwrap(), 0);
        assert_eq!(reader.read_at(&mut [], 0).unwrap(), 0);

        // Positional reads leave the cursor where it was.
        let mut head = [0u8; 2];
        reader.read_exact(&mut head).unwrap();
        assert_eq!(&head, b"01");
    }
}
