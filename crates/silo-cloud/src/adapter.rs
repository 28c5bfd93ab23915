//! [`ObjectBackend`] over the `object_store` crate
//!
//! `object_store` paths cannot end in a delimiter, so the directory marker
//! `p/` is stored as the object `p/.silo_dir` and translated back on listing.
//! Keys are handed to `object_store` verbatim (no percent-encoding), so a
//! listed location is the key that was written.

use crate::backend::{ListPage, ListQuery, ListedObject, ObjectBackend};
use crate::error::CloudError;
use crate::runtime::block_on;
use bytes::Bytes;
use futures_util::TryStreamExt;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore, PutPayload, WriteMultipart};
use silo_core::config::TransferConfig;
use silo_core::{path, read_full, Result, StoreError};
use std::io::Read;
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;

/// Object name that stands in for a directory marker.
pub const MARKER_NAME: &str = ".silo_dir";

/// Parts in flight at once during a multipart upload.
const MAX_CONCURRENT_PARTS: usize = 8;

/// Backend talking to any `object_store` implementation
#[derive(Debug, Clone)]
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    multipart_threshold: usize,
    part_size: usize,
}

impl ObjectStoreBackend {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_transfer(store, &TransferConfig::default())
    }

    /// Backend using the multipart settings of `transfer`.
    pub fn with_transfer(store: Arc<dyn ObjectStore>, transfer: &TransferConfig) -> Self {
        Self {
            store,
            multipart_threshold: transfer.multipart_threshold.max(1),
            part_size: transfer.part_size.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    fn listed(meta: ObjectMeta) -> ListedObject {
        let location = meta.location.as_ref();
        let key = match location.strip_suffix(MARKER_NAME) {
            Some(dir) if dir.is_empty() || dir.ends_with(path::SEPARATOR) => dir.to_string(),
            _ => location.to_string(),
        };
        ListedObject {
            key,
            size: meta.size as u64,
            modified: Some(meta.last_modified),
        }
    }
}

/// Path an object key is stored under.
fn object_path(key: &str) -> Result<ObjectPath> {
    let location = if key.ends_with(path::SEPARATOR) {
        format!("{key}{MARKER_NAME}")
    } else {
        key.to_string()
    };
    ObjectPath::parse(&location).map_err(|e| StoreError::InvalidPath(format!("{key}: {e}")))
}

/// Send `head` followed by the rest of `body` as a multipart upload.
///
/// A failed read aborts the upload and comes back as the inner error.
async fn multipart_upload(
    store: &dyn ObjectStore,
    location: &ObjectPath,
    head: &[u8],
    body: &mut dyn Read,
    part_size: usize,
) -> object_store::Result<std::io::Result<()>> {
    let upload = store.put_multipart(location).await?;
    let mut write = WriteMultipart::new_with_chunk_size(upload, part_size);
    write.write(head);

    let mut part = vec![0u8; part_size];
    loop {
        let n = match read_full(body, &mut part) {
            Ok(n) => n,
            Err(e) => {
                write.abort().await?;
                return Ok(Err(e));
            }
        };
        if n == 0 {
            break;
        }
        write.wait_for_capacity(MAX_CONCURRENT_PARTS).await?;
        write.write(&part[..n]);
    }
    write.finish().await?;
    Ok(Ok(()))
}

/// The directory part of a listing prefix: everything up to the last slash.
fn directory_of(prefix: &str) -> Result<Option<ObjectPath>> {
    match prefix.rfind(path::SEPARATOR) {
        Some(idx) if idx > 0 => object_path(&prefix[..idx]).map(Some),
        _ => Ok(None),
    }
}

impl ObjectBackend for ObjectStoreBackend {
    /// Lists the directory containing `query.prefix` in one page and keeps
    /// the entries that start with the raw prefix. `max_keys` is not applied.
    fn list(&self, query: &ListQuery) -> Result<ListPage> {
        let dir = directory_of(&query.prefix)?;
        let mut page = ListPage::default();

        match query.delimiter {
            Some(_) => {
                let result = block_on(self.store.list_with_delimiter(dir.as_ref()))?
                    .map_err(CloudError::from)?;
                page.objects = result.objects.into_iter().map(Self::listed).collect();
                page.common_prefixes = result
                    .common_prefixes
                    .into_iter()
                    .map(|p| path::with_trailing_slash(p.as_ref()))
                    .collect();
            }
            None => {
                let metas: Vec<ObjectMeta> =
                    block_on(self.store.list(dir.as_ref()).try_collect::<Vec<_>>())?
                        .map_err(CloudError::from)?;
                page.objects = metas.into_iter().map(Self::listed).collect();
            }
        }

        page.objects.retain(|o| o.key.starts_with(&query.prefix));
        page.objects.sort_by(|a, b| a.key.cmp(&b.key));
        page.common_prefixes.retain(|p| p.starts_with(&query.prefix));
        page.common_prefixes.sort();
        Ok(page)
    }

    fn get_range(&self, key: &str, range: Range<u64>) -> Result<Bytes> {
        let range = range.start as usize..range.end as usize;
        let data = block_on(self.store.get_range(&object_path(key)?, range))?
            .map_err(CloudError::from)?;
        Ok(data)
    }

    fn put(&self, key: &str, body: Bytes) -> Result<()> {
        debug!(key, len = body.len(), "put object");
        let location = object_path(key)?;
        block_on(self.store.put(&location, PutPayload::from(body)))?
            .map_err(CloudError::from)?;
        Ok(())
    }

    /// Single put below the multipart threshold, multipart upload above it.
    fn upload(&self, key: &str, body: &mut dyn Read) -> Result<()> {
        let location = object_path(key)?;
        let mut head = vec![0u8; self.multipart_threshold];
        let n = read_full(body, &mut head)?;
        if n < head.len() {
            head.truncate(n);
            return self.put(key, Bytes::from(head));
        }

        debug!(key, part_size = self.part_size, "starting multipart upload");
        let outcome = block_on(multipart_upload(
            self.store.as_ref(),
            &location,
            &head,
            body,
            self.part_size,
        ))?;
        outcome.map_err(CloudError::from)??;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        match block_on(self.store.delete(&object_path(key)?))? {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(CloudError::from(e).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    fn backend() -> ObjectStoreBackend {
        ObjectStoreBackend::new(Arc::new(InMemory::new()))
    }

    #[test]
    fn test_marker_round_trip() {
        let backend = backend();
        backend.put("dir/", Bytes::new()).unwrap();
        backend.put("dir/file", Bytes::from_static(b"x")).unwrap();

        let page = backend.list(&ListQuery::delimited("dir/")).unwrap();
        let keys: Vec<&str> = page.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["dir/", "dir/file"]);

        let page = backend.list(&ListQuery::delimited("di")).unwrap();
        assert!(page.objects.is_empty());
        assert_eq!(page.common_prefixes, vec!["dir/"]);
    }

    #[test]
    fn test_raw_prefix_filter() {
        let backend = backend();
        for key in ["top/a", "top/a-b", "top/b"] {
            backend.put(key, Bytes::from_static(b"x")).unwrap();
        }
        let page = backend.list(&ListQuery::delimited("top/a")).unwrap();
        let keys: Vec<&str> = page.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["top/a", "top/a-b"]);
    }

    #[test]
    fn test_keys_are_stored_verbatim() {
        let backend = backend();
        let key = "odd/100% [a]{b}#c";
        backend.put(key, Bytes::from_static(b"x")).unwrap();

        let page = backend.list(&ListQuery::delimited("odd/")).unwrap();
        let keys: Vec<&str> = page.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec![key]);
        assert_eq!(backend.get_range(key, 0..1).unwrap(), Bytes::from_static(b"x"));

        let page = backend.list(&ListQuery::delimited("")).unwrap();
        assert_eq!(page.common_prefixes, vec!["odd/"]);
    }

    #[test]
    fn test_unrepresentable_key_is_invalid() {
        let backend = backend();
        let err = backend.put("a//b", Bytes::new()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath(_)));
    }

    #[test]
    fn test_multipart_above_threshold() {
        let transfer = TransferConfig {
            multipart_threshold: 16,
            part_size: 5 * 1024 * 1024,
            ..Default::default()
        };
        let backend = ObjectStoreBackend::with_transfer(Arc::new(InMemory::new()), &transfer);

        let data: Vec<u8> = (0..100u8).collect();
        backend.upload("big", &mut data.as_slice()).unwrap();
        assert_eq!(backend.get_range("big", 0..100).unwrap(), Bytes::from(data));

        backend.upload("small", &mut &b"tiny"[..]).unwrap();
        assert_eq!(backend.get_range("small", 0..4).unwrap(), Bytes::from_static(b"tiny"));
    }

    #[test]
    fn test_missing_object_is_not_found() {
        let backend = backend();
        assert!(backend.get_range("nope", 0..1).unwrap_err().is_not_found());
        backend.delete("nope").unwrap();
    }
}
