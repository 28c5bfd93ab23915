//! The primitive operations a flat object store has to offer
//!
//! Keys are plain strings with no leading slash. Directory markers are keys
//! ending in `/`; how a backend stores them is its own business as long as
//! they come back from [`ObjectBackend::list`] under that name.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use silo_core::{read_full, Result};
use std::io::Read;
use std::ops::Range;

/// One listing request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListQuery {
    /// Only keys starting with this string are listed.
    pub prefix: String,
    /// Keys with this character after the prefix are rolled up into a
    /// common prefix ending at the character.
    pub delimiter: Option<char>,
    /// Upper bound on entries (objects plus common prefixes) in the page.
    /// `None` leaves the page size to the backend.
    pub max_keys: Option<usize>,
    /// Token from the previous page.
    pub continuation: Option<String>,
}

impl ListQuery {
    /// Delimited listing of everything under `prefix`.
    pub fn delimited(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            delimiter: Some(silo_core::path::SEPARATOR),
            ..Default::default()
        }
    }

    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = Some(max_keys);
        self
    }

    pub fn with_continuation(mut self, token: Option<String>) -> Self {
        self.continuation = token;
        self
    }
}

/// An object as reported by a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    pub key: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// One page of a listing, both parts sorted by key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub objects: Vec<ListedObject>,
    pub common_prefixes: Vec<String>,
    /// Set when more entries follow; pass it back as the continuation.
    pub next: Option<String>,
}

impl ListPage {
    /// Greatest key or common prefix in the page.
    pub fn last_entry(&self) -> Option<&str> {
        let last_object = self.objects.last().map(|o| o.key.as_str());
        let last_prefix = self.common_prefixes.last().map(String::as_str);
        last_object.max(last_prefix)
    }
}

/// Flat, prefix-addressed storage
pub trait ObjectBackend: Send + Sync + 'static {
    /// One page of keys matching `query`.
    fn list(&self, query: &ListQuery) -> Result<ListPage>;

    /// Bytes `range` of the object at `key`. The range lies within the object.
    fn get_range(&self, key: &str, range: Range<u64>) -> Result<Bytes>;

    /// Store `body` at `key`, replacing any previous object.
    fn put(&self, key: &str, body: Bytes) -> Result<()>;

    /// Store everything `body` yields at `key`.
    ///
    /// The default collects the body and calls [`ObjectBackend::put`].
    fn upload(&self, key: &str, body: &mut dyn Read) -> Result<()> {
        let mut data = Vec::new();
        let mut chunk = vec![0u8; 64 * 1024];
        loop {
            let n = read_full(body, &mut chunk)?;
            data.extend_from_slice(&chunk[..n]);
            if n < chunk.len() {
                break;
            }
        }
        self.put(key, Bytes::from(data))
    }

    /// Delete the object at `key`. Deleting a missing key succeeds.
    fn delete(&self, key: &str) -> Result<()>;

    /// Release connections.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}
