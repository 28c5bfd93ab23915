//! In-process flat bucket with S3 listing semantics

use crate::backend::{ListPage, ListQuery, ListedObject, ObjectBackend};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use silo_core::{Result, StoreError};
use std::collections::BTreeMap;
use std::ops::{Bound, Range};
use std::sync::{Mutex, MutexGuard};
use tracing::trace;

/// Largest page S3 hands out.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    modified: DateTime<Utc>,
}

/// A bucket held in memory
///
/// Listings are paginated like S3: at most `page_size` entries per page,
/// common prefixes count as one entry each, and the continuation token is the
/// last entry returned.
#[derive(Debug)]
pub struct MemoryBucket {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    page_size: usize,
}

impl Default for MemoryBucket {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBucket {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// A bucket that never returns more than `page_size` entries per page.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Every key in the bucket, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The entry `key` contributes to a listing: itself, or the common prefix it
/// rolls up into.
enum Entry<'a> {
    Object(&'a str),
    Prefix(&'a str),
}

fn entry_for<'a>(key: &'a str, prefix: &str, delimiter: Option<char>) -> Entry<'a> {
    let rest = &key[prefix.len()..];
    match delimiter.and_then(|d| rest.find(d).map(|idx| idx + d.len_utf8())) {
        Some(end) => Entry::Prefix(&key[..prefix.len() + end]),
        None => Entry::Object(key),
    }
}

impl ObjectBackend for MemoryBucket {
    fn list(&self, query: &ListQuery) -> Result<ListPage> {
        let limit = query
            .max_keys
            .map_or(self.page_size, |max| max.clamp(1, self.page_size));
        let token = query.continuation.as_deref();
        let start = match token {
            Some(token) if token >= query.prefix.as_str() => Bound::Excluded(token),
            _ => Bound::Included(query.prefix.as_str()),
        };

        let objects = self.lock();
        let mut page = ListPage::default();
        let mut returned = 0;
        for (key, object) in objects.range::<str, _>((start, Bound::Unbounded)) {
            if !key.starts_with(&query.prefix) {
                break;
            }
            let entry = entry_for(key, &query.prefix, query.delimiter);
            if let Entry::Prefix(common) = entry {
                if Some(common) == token
                    || page.common_prefixes.last().map(String::as_str) == Some(common)
                {
                    continue;
                }
            }
            if returned == limit {
                page.next = page.last_entry().map(str::to_string);
                break;
            }
            match entry {
                Entry::Object(key) => page.objects.push(ListedObject {
                    key: key.to_string(),
                    size: object.data.len() as u64,
                    modified: Some(object.modified),
                }),
                Entry::Prefix(common) => page.common_prefixes.push(common.to_string()),
            }
            returned += 1;
        }

        trace!(
            prefix = %query.prefix,
            objects = page.objects.len(),
            prefixes = page.common_prefixes.len(),
            truncated = page.next.is_some(),
            "listed bucket page"
        );
        Ok(page)
    }

    fn get_range(&self, key: &str, range: Range<u64>) -> Result<Bytes> {
        let objects = self.lock();
        let object = objects
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        let len = object.data.len() as u64;
        let end = range.end.min(len);
        let start = range.start.min(end);
        Ok(object.data.slice(start as usize..end as usize))
    }

    fn put(&self, key: &str, body: Bytes) -> Result<()> {
        trace!(key, len = body.len(), "put object");
        self.lock().insert(
            key.to_string(),
            StoredObject {
                data: body,
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}
