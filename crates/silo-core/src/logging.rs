//! Store decorator that traces every call

use crate::info::FileInfo;
use crate::store::{StreamReader, StreamStore, StreamWriter};
use crate::Result;
use tracing::debug;

/// Wraps a store and emits a `debug` event before and after each operation
#[derive(Debug, Clone)]
pub struct TracingStore<S> {
    inner: S,
    label: String,
}

impl<S: StreamStore> TracingStore<S> {
    /// Wrap `inner`; `label` tells stores apart in the log.
    pub fn new(inner: S, label: impl Into<String>) -> Self {
        Self {
            inner,
            label: label.into(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn traced<T>(&self, op: &str, path: &str, call: impl FnOnce(&S) -> Result<T>) -> Result<T> {
        debug!(store = %self.label, op, path, "before");
        let result = call(&self.inner);
        match &result {
            Ok(_) => debug!(store = %self.label, op, path, "after: ok"),
            Err(e) => debug!(store = %self.label, op, path, error = %e, "after: failed"),
        }
        result
    }
}

impl<S: StreamStore> StreamStore for TracingStore<S> {
    fn stat(&self, path: &str) -> Result<FileInfo> {
        self.traced("stat", path, |s| s.stat(path))
    }

    fn lstat(&self, path: &str) -> Result<FileInfo> {
        self.traced("lstat", path, |s| s.lstat(path))
    }

    fn readdir(&self, path: &str) -> Result<Vec<FileInfo>> {
        self.traced("readdir", path, |s| s.readdir(path))
    }

    fn mkdir(&self, path: &str, mode: u32) -> Result<()> {
        self.traced("mkdir", path, |s| s.mkdir(path, mode))
    }

    fn remove(&self, path: &str) -> Result<()> {
        self.traced("remove", path, |s| s.remove(path))
    }

    fn open_read(&self, path: &str) -> Result<Box<dyn StreamReader>> {
        self.traced("open_read", path, |s| s.open_read(path))
    }

    fn open_write(&self, path: &str) -> Result<Box<dyn StreamWriter>> {
        self.traced("open_write", path, |s| s.open_write(path))
    }

    fn close(&self) -> Result<()> {
        self.traced("close", "", |s| s.close())
    }
}
