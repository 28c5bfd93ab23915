//! The stream-store contract and helpers built only on top of it

use crate::info::FileInfo;
use crate::{path, Result, StoreError};
use std::io::{self, Read, Seek, Write};
use std::sync::Arc;

/// Handle returned by [`StreamStore::open_read`].
///
/// Besides sequential reads and seeking it supports positional reads that
/// leave the cursor alone.
pub trait StreamReader: Read + Seek + Send {
    /// Read into `buf` starting at `offset`.
    ///
    /// Fills as much of `buf` as the object holds past `offset`. A count
    /// shorter than `buf.len()` (including 0) means the end of the object
    /// was reached; it is never reported as an error.
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

/// Handle returned by [`StreamStore::open_write`].
///
/// Content becomes visible once [`StreamWriter::close`] returns `Ok`, and
/// never partially: until then readers see the previous content, or nothing.
/// Dropping a writer without closing it aborts the write.
pub trait StreamWriter: Write + Send {
    /// Finish the object and report whether it was stored.
    fn close(self: Box<Self>) -> Result<()>;

    /// Give up on the object. Nothing written through this writer becomes
    /// visible and whatever the path held before stays in place.
    fn abort(self: Box<Self>);
}

/// File and directory operations common to every backend
pub trait StreamStore: Send + Sync {
    /// Metadata for `path`.
    fn stat(&self, path: &str) -> Result<FileInfo>;

    /// Like [`StreamStore::stat`] but does not follow links. Backends without
    /// links use the default.
    fn lstat(&self, path: &str) -> Result<FileInfo> {
        self.stat(path)
    }

    /// Entries of a directory, sorted by name.
    fn readdir(&self, path: &str) -> Result<Vec<FileInfo>>;

    /// Create a single directory. The parent must already exist.
    fn mkdir(&self, path: &str, mode: u32) -> Result<()>;

    /// Remove a file or an empty directory.
    fn remove(&self, path: &str) -> Result<()>;

    /// Open a file for reading.
    fn open_read(&self, path: &str) -> Result<Box<dyn StreamReader>>;

    /// Create or truncate a file for writing.
    fn open_write(&self, path: &str) -> Result<Box<dyn StreamWriter>>;

    /// Release backend connections.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

impl<S: StreamStore + ?Sized> StreamStore for Box<S> {
    fn stat(&self, path: &str) -> Result<FileInfo> {
        (**self).stat(path)
    }

    fn lstat(&self, path: &str) -> Result<FileInfo> {
        (**self).lstat(path)
    }

    fn readdir(&self, path: &str) -> Result<Vec<FileInfo>> {
        (**self).readdir(path)
    }

    fn mkdir(&self, path: &str, mode: u32) -> Result<()> {
        (**self).mkdir(path, mode)
    }

    fn remove(&self, path: &str) -> Result<()> {
        (**self).remove(path)
    }

    fn open_read(&self, path: &str) -> Result<Box<dyn StreamReader>> {
        (**self).open_read(path)
    }

    fn open_write(&self, path: &str) -> Result<Box<dyn StreamWriter>> {
        (**self).open_write(path)
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }
}

impl<S: StreamStore + ?Sized> StreamStore for Arc<S> {
    fn stat(&self, path: &str) -> Result<FileInfo> {
        (**self).stat(path)
    }

    fn lstat(&self, path: &str) -> Result<FileInfo> {
        (**self).lstat(path)
    }

    fn readdir(&self, path: &str) -> Result<Vec<FileInfo>> {
        (**self).readdir(path)
    }

    fn mkdir(&self, path: &str, mode: u32) -> Result<()> {
        (**self).mkdir(path, mode)
    }

    fn remove(&self, path: &str) -> Result<()> {
        (**self).remove(path)
    }

    fn open_read(&self, path: &str) -> Result<Box<dyn StreamReader>> {
        (**self).open_read(path)
    }

    fn open_write(&self, path: &str) -> Result<Box<dyn StreamWriter>> {
        (**self).open_write(path)
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }
}

/// Create `path` and any missing ancestors.
///
/// Succeeds without doing anything when `path` already is a directory.
pub fn mkdir_all<S: StreamStore + ?Sized>(store: &S, dir: &str, mode: u32) -> Result<()> {
    match store.stat(dir) {
        Ok(info) if info.is_dir() => return Ok(()),
        Ok(_) => return Err(StoreError::NotADirectory(dir.to_string())),
        Err(StoreError::NotFound(_)) => {}
        Err(e) => return Err(e),
    }

    if let Some(parent) = path::parent(dir) {
        // Keep absolute paths absolute for stores that use native paths.
        if dir.starts_with('/') {
            mkdir_all(store, &format!("/{parent}"), mode)?;
        } else {
            mkdir_all(store, parent, mode)?;
        }
    }

    match store.mkdir(dir, mode) {
        Ok(()) => Ok(()),
        // Somebody else created it in the meantime.
        Err(err) => match store.lstat(dir) {
            Ok(info) if info.is_dir() => Ok(()),
            _ => Err(err),
        },
    }
}

/// Write `data` to `path`, replacing any previous content.
pub fn write_file<S: StreamStore + ?Sized>(store: &S, path: &str, data: &[u8]) -> Result<()> {
    write_from(store, path, &mut &data[..]).map(|_| ())
}

/// Copy everything `source` yields to `path` and return the byte count.
///
/// A failure on either side aborts the writer, so `path` keeps its previous
/// content.
pub fn write_from<S, R>(store: &S, path: &str, source: &mut R) -> Result<u64>
where
    S: StreamStore + ?Sized,
    R: Read + ?Sized,
{
    let mut writer = store.open_write(path)?;
    match io::copy(source, &mut writer) {
        Ok(copied) => {
            writer.close()?;
            Ok(copied)
        }
        Err(e) => {
            writer.abort();
            Err(e.into())
        }
    }
}

/// Read the whole content of `path`.
pub fn read_file<S: StreamStore + ?Sized>(store: &S, path: &str) -> Result<Vec<u8>> {
    let mut reader = store.open_read(path)?;
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    Ok(data)
}

/// Fill `buf` from `reader` until it is full or the reader is exhausted.
pub fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
