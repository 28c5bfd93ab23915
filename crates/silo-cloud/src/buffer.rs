//! Byte windows shared by the object reader and the pipe writer

use bytes::{Bytes, BytesMut};
use std::ops::Range;

/// One downloaded range of an object, addressed by object offsets
#[derive(Debug)]
pub(crate) struct RangeWindow {
    start: u64,
    data: Bytes,
}

impl RangeWindow {
    pub fn new(start: u64, data: Bytes) -> Self {
        Self { start, data }
    }

    fn end(&self) -> u64 {
        self.start + self.data.len() as u64
    }

    pub fn holds(&self, pos: u64) -> bool {
        pos >= self.start && pos < self.end()
    }

    /// Everything buffered from `pos` on.
    pub fn tail(&self, pos: u64) -> Option<&[u8]> {
        if !self.holds(pos) {
            return None;
        }
        Some(&self.data[(pos - self.start) as usize..])
    }

    /// Exactly `range`, when all of it is buffered.
    pub fn slice(&self, range: &Range<u64>) -> Option<&[u8]> {
        if range.start < self.start || range.end > self.end() || range.start > range.end {
            return None;
        }
        let from = (range.start - self.start) as usize;
        let to = (range.end - self.start) as usize;
        Some(&self.data[from..to])
    }
}

/// Accumulates written bytes into chunks of a fixed size
#[derive(Debug)]
pub(crate) struct ChunkBuffer {
    pending: BytesMut,
    chunk_size: usize,
}

impl ChunkBuffer {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            pending: BytesMut::with_capacity(chunk_size),
            chunk_size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.chunk_size
    }

    /// Copy as much of `data` as the current chunk has room for.
    pub fn fill(&mut self, data: &[u8]) -> usize {
        let room = self.chunk_size.saturating_sub(self.pending.len());
        let n = data.len().min(room);
        self.pending.extend_from_slice(&data[..n]);
        n
    }

    /// Hand out the pending chunk.
    pub fn take(&mut self) -> Bytes {
        self.pending.split().freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_addresses_object_offsets() {
        let window = RangeWindow::new(10, Bytes::from_static(b"abcdef"));
        assert!(window.holds(10));
        assert!(!window.holds(16));
        assert!(!window.holds(9));
        assert_eq!(window.tail(13), Some(&b"def"[..]));
        assert_eq!(window.slice(&(11..14)), Some(&b"bcd"[..]));
        assert_eq!(window.slice(&(11..17)), None);
        assert_eq!(window.slice(&(8..12)), None);
    }

    #[test]
    fn test_chunk_fills_to_size() {
        let mut chunk = ChunkBuffer::new(4);
        assert_eq!(chunk.fill(b"abcdef"), 4);
        assert!(chunk.is_full());
        assert_eq!(chunk.fill(b"ef"), 0);
        assert_eq!(chunk.take(), Bytes::from_static(b"abcd"));
        assert!(chunk.is_empty() && !chunk.is_full());
    }
}
