//! PipeWriter - streams writes to a background upload

use crate::backend::ObjectBackend;
use crate::buffer::ChunkBuffer;
use crate::error::CloudError;
use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, Sender};
use silo_core::config::TransferConfig;
use silo_core::{Result, StreamWriter};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

/// Writer whose bytes flow through a bounded channel to a transfer thread
///
/// The thread runs [`ObjectBackend::upload`] with the receiving end of the
/// channel as the body and reports the outcome on a single-slot channel.
/// [`StreamWriter::close`] ends the body and waits for that outcome.
/// [`StreamWriter::abort`], or dropping the writer, makes the body fail
/// instead, so the backend never stores it.
#[derive(Debug)]
pub struct PipeWriter {
    key: String,
    chunk: ChunkBuffer,
    chunks: Option<Sender<Bytes>>,
    aborted: Arc<AtomicBool>,
    outcome: Receiver<Result<()>>,
    transfer: Option<JoinHandle<()>>,
    bytes_written: u64,
}

impl PipeWriter {
    /// Start the transfer thread for `key` and return the writing end.
    pub fn spawn<B: ObjectBackend>(
        backend: Arc<B>,
        key: impl Into<String>,
        transfer: &TransferConfig,
    ) -> Result<Self> {
        let key = key.into();
        let (chunk_tx, chunk_rx) = bounded::<Bytes>(transfer.pipe_depth.max(1));
        let (outcome_tx, outcome_rx) = bounded(1);
        let aborted = Arc::new(AtomicBool::new(false));

        let upload_key = key.clone();
        let body_aborted = Arc::clone(&aborted);
        let handle = thread::Builder::new()
            .name("silo-transfer".to_string())
            .spawn(move || {
                let mut body = PipeReader::new(chunk_rx, body_aborted);
                let result = backend.upload(&upload_key, &mut body);
                // Unblock a producer still waiting on a full channel.
                drop(body);
                match &result {
                    Ok(()) => debug!(key = %upload_key, "transfer finished"),
                    Err(e) => debug!(key = %upload_key, error = %e, "transfer failed"),
                }
                let _ = outcome_tx.send(result);
            })?;

        Ok(Self {
            key,
            chunk: ChunkBuffer::new(transfer.chunk_size.max(1)),
            chunks: Some(chunk_tx),
            aborted,
            outcome: outcome_rx,
            transfer: Some(handle),
            bytes_written: 0,
        })
    }

    /// Total bytes accepted so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn send_chunk(&mut self) -> io::Result<()> {
        if self.chunk.is_empty() {
            return Ok(());
        }
        let chunk = self.chunk.take();
        trace!(key = %self.key, len = chunk.len(), "sending chunk");
        let sent = match &self.chunks {
            Some(chunks) => chunks.send(chunk).is_ok(),
            None => false,
        };
        if sent {
            Ok(())
        } else {
            Err(CloudError::PipeClosed(self.key.clone()).into())
        }
    }

    /// End the body and wait for the transfer's outcome.
    fn finish(&mut self) -> Result<()> {
        let Some(handle) = self.transfer.take() else {
            return Ok(());
        };

        let flushed = self.send_chunk();
        // Dropping the sender is what tells the transfer the body ended.
        self.chunks = None;

        let outcome = self.wait(handle);
        // A failed transfer explains a refused chunk better than the refusal.
        outcome?;
        flushed?;
        Ok(())
    }

    /// Fail the body and wait until the transfer has given up.
    fn discard(&mut self) {
        let Some(handle) = self.transfer.take() else {
            return;
        };

        // The flag must be visible before the body sees the channel close.
        self.aborted.store(true, Ordering::SeqCst);
        self.chunks = None;
        self.chunk.take();

        match self.wait(handle) {
            Err(e) => debug!(key = %self.key, error = %e, "transfer aborted"),
            Ok(()) => warn!(key = %self.key, "aborted transfer reported success"),
        }
    }

    fn wait(&self, handle: JoinHandle<()>) -> Result<()> {
        let outcome = self
            .outcome
            .recv()
            .unwrap_or_else(|_| Err(CloudError::TransferLost(self.key.clone()).into()));
        if handle.join().is_err() {
            warn!(key = %self.key, "transfer thread panicked");
        }
        outcome
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut remaining = buf;
        while !remaining.is_empty() {
            let n = self.chunk.fill(remaining);
            self.bytes_written += n as u64;
            remaining = &remaining[n..];

            if self.chunk.is_full() {
                self.send_chunk()?;
            }
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // Nothing is visible before close, so flushing only hands the
        // buffered bytes to the transfer.
        self.send_chunk()
    }
}

impl StreamWriter for PipeWriter {
    fn close(mut self: Box<Self>) -> Result<()> {
        self.finish()
    }

    fn abort(mut self: Box<Self>) {
        self.discard();
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        if self.transfer.is_some() {
            debug!(key = %self.key, "discarding unclosed writer");
            self.discard();
        }
    }
}

/// Receiving end of the pipe, read by the transfer thread
#[derive(Debug)]
struct PipeReader {
    chunks: Receiver<Bytes>,
    aborted: Arc<AtomicBool>,
    current: Bytes,
}

impl PipeReader {
    fn new(chunks: Receiver<Bytes>, aborted: Arc<AtomicBool>) -> Self {
        Self {
            chunks,
            aborted,
            current: Bytes::new(),
        }
    }

    fn check_aborted(&self) -> io::Result<()> {
        if self.aborted.load(Ordering::SeqCst) {
            return Err(io::Error::other("write aborted"));
        }
        Ok(())
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_aborted()?;
        if buf.is_empty() {
            return Ok(0);
        }
        while self.current.is_empty() {
            match self.chunks.recv() {
                Ok(chunk) => self.current = chunk,
                // Sender dropped: the body is complete unless it was aborted.
                Err(_) => {
                    self.check_aborted()?;
                    return Ok(0);
                }
            }
        }
        let n = buf.len().min(self.current.len());
        let chunk = self.current.split_to(n);
        buf[..n].copy_from_slice(&chunk);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::MemoryBucket;
    use bytes::Bytes;
    use silo_core::StoreError;

    fn small_transfer() -> TransferConfig {
        TransferConfig {
            pipe_depth: 1,
            chunk_size: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_chunks_arrive_in_order() {
        let bucket = Arc::new(MemoryBucket::new());
        let mut writer = PipeWriter::spawn(Arc::clone(&bucket), "k", &small_transfer()).unwrap();
        writer.write_all(b"hello, pipe").unwrap();
        assert_eq!(writer.bytes_written(), 11);
        Box::new(writer).close().unwrap();

        assert_eq!(
            bucket.get_range("k", 0..11).unwrap(),
            Bytes::from_static(b"hello, pipe")
        );
    }

    #[test]
    fn test_empty_body_creates_empty_object() {
        let bucket = Arc::new(MemoryBucket::new());
        let writer = PipeWriter::spawn(Arc::clone(&bucket), "empty", &small_transfer()).unwrap();
        Box::new(writer).close().unwrap();
        assert_eq!(bucket.keys(), vec!["empty".to_string()]);
    }

    struct Refusing;

    impl ObjectBackend for Refusing {
        fn list(&self, _: &crate::ListQuery) -> Result<crate::ListPage> {
            Ok(Default::default())
        }

        fn get_range(&self, key: &str, _: std::ops::Range<u64>) -> Result<Bytes> {
            Err(StoreError::NotFound(key.to_string()))
        }

        fn put(&self, _: &str, _: Bytes) -> Result<()> {
            Ok(())
        }

        fn upload(&self, key: &str, _: &mut dyn Read) -> Result<()> {
            Err(StoreError::ContractViolation(format!("{key}: refused")))
        }

        fn delete(&self, _: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_abort_stores_nothing() {
        let bucket = Arc::new(MemoryBucket::new());
        bucket.put("k", Bytes::from_static(b"old")).unwrap();

        let mut writer = PipeWriter::spawn(Arc::clone(&bucket), "k", &small_transfer()).unwrap();
        writer.write_all(b"half of the body").unwrap();
        Box::new(writer).abort();
        assert_eq!(bucket.get_range("k", 0..3).unwrap(), Bytes::from_static(b"old"));

        {
            let mut writer =
                PipeWriter::spawn(Arc::clone(&bucket), "dropped", &small_transfer()).unwrap();
            writer.write_all(b"never stored").unwrap();
        }
        assert_eq!(bucket.keys(), vec!["k".to_string()]);
    }

    #[test]
    fn test_failed_transfer_surfaces_at_close() {
        let mut writer = PipeWriter::spawn(Arc::new(Refusing), "k", &small_transfer()).unwrap();
        // The transfer gives up without reading, so larger writes may be refused.
        let _ = writer.write_all(&[7u8; 64]);

        let err = Box::new(writer).close().unwrap_err();
        assert!(matches!(err, StoreError::ContractViolation(m) if m == "k: refused"));
    }
}
