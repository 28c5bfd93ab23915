//! Files and directories emulated over a flat object backend
//!
//! A file is an object whose key is the normalized path. A directory exists
//! when a zero-length marker `path/` exists or when any key starts with
//! `path/`. The root always exists. No node may be called `.silo_dir`; the
//! `object_store` adapter keeps its markers under that name.

use crate::adapter::MARKER_NAME;
use crate::backend::{ListPage, ListQuery, ListedObject, ObjectBackend};
use crate::reader::ObjectReader;
use crate::writer::PipeWriter;
use bytes::Bytes;
use silo_core::config::{SiloConfig, TransferConfig};
use silo_core::{path, FileInfo, Result, StoreError, StreamReader, StreamStore, StreamWriter};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Entries requested per listing page when resolving a single path.
const STAT_PAGE: usize = 2;

/// Stream store over any [`ObjectBackend`]
#[derive(Debug)]
pub struct ObjectStreamStore<B> {
    backend: Arc<B>,
    transfer: TransferConfig,
    read_buffer_size: usize,
}

impl<B> Clone for ObjectStreamStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            transfer: self.transfer.clone(),
            read_buffer_size: self.read_buffer_size,
        }
    }
}

impl<B: ObjectBackend> ObjectStreamStore<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, &SiloConfig::default())
    }

    /// Store whose readers and writers use the `transfer` and `read` settings of `config`.
    pub fn with_config(backend: B, config: &SiloConfig) -> Self {
        Self::from_arc(Arc::new(backend), config)
    }

    pub fn from_arc(backend: Arc<B>, config: &SiloConfig) -> Self {
        Self {
            backend,
            transfer: config.transfer.clone(),
            read_buffer_size: config.read.buffer_size,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Resolve `name` to the file and directory candidates the listing holds.
    fn lookup(&self, key: &str) -> Result<(Option<ListedObject>, bool)> {
        let marker = path::with_trailing_slash(key);
        let mut file = None;
        let mut dir = false;
        let mut token = None;

        loop {
            let query = ListQuery::delimited(key)
                .with_max_keys(STAT_PAGE)
                .with_continuation(token.take());
            let page = self.backend.list(&query)?;

            for object in &page.objects {
                if object.key == key {
                    file = Some(object.clone());
                } else if object.key == marker {
                    dir = true;
                }
            }
            if page.common_prefixes.iter().any(|p| *p == marker) {
                dir = true;
            }

            // Keys such as `name-x` sort before `name/`; stop once past it.
            let passed = page.last_entry().is_some_and(|last| last >= marker.as_str());
            match page.next {
                Some(next) if !passed => token = Some(next),
                _ => break,
            }
        }

        Ok((file, dir))
    }

    /// Refuse names that would collide with directory markers.
    fn check_creatable(name: &str) -> Result<()> {
        if path::segments(name).any(|s| s == MARKER_NAME) {
            return Err(StoreError::InvalidPath(format!(
                "{name}: {MARKER_NAME} is reserved for directory markers"
            )));
        }
        Ok(())
    }

    /// Stat the parent of `name` and require a directory there.
    fn check_parent(&self, name: &str) -> Result<()> {
        let Some(parent) = path::parent(name) else {
            return Ok(());
        };
        let info = self.stat(parent)?;
        if !info.is_dir() {
            return Err(StoreError::NotADirectory(parent.to_string()));
        }
        Ok(())
    }

    /// Every page of a delimited listing of `prefix`.
    fn list_all(&self, prefix: &str) -> Result<Vec<ListPage>> {
        let mut pages = Vec::new();
        let mut token = None;
        loop {
            let query = ListQuery::delimited(prefix).with_continuation(token.take());
            let page = self.backend.list(&query)?;
            let next = page.next.clone();
            pages.push(page);
            match next {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        debug!(prefix, pages = pages.len(), "listed directory");
        Ok(pages)
    }
}

impl<B: ObjectBackend> StreamStore for ObjectStreamStore<B> {
    fn stat(&self, name: &str) -> Result<FileInfo> {
        path::check_segments(name)?;
        if path::is_root(name) {
            return Ok(FileInfo::root());
        }

        let key = path::normalize(name);
        let file_name = path::last_element(name);
        match self.lookup(key)? {
            (Some(_), true) => Err(StoreError::ContractViolation(format!(
                "{name}: both a file and a directory"
            ))),
            (Some(object), false) => Ok(FileInfo::file(file_name, object.size, object.modified)),
            (None, true) => Ok(FileInfo::directory(file_name)),
            (None, false) => Err(StoreError::NotFound(name.to_string())),
        }
    }

    fn readdir(&self, name: &str) -> Result<Vec<FileInfo>> {
        if !self.stat(name)?.is_dir() {
            return Err(StoreError::NotADirectory(name.to_string()));
        }

        let prefix = if path::is_root(name) {
            String::new()
        } else {
            path::with_trailing_slash(path::normalize(name))
        };

        let mut entries: BTreeMap<String, FileInfo> = BTreeMap::new();
        for page in self.list_all(&prefix)? {
            for object in page.objects {
                let child = &object.key[prefix.len()..];
                if child.is_empty() {
                    // The directory's own marker.
                    continue;
                }
                entries
                    .entry(child.to_string())
                    .or_insert_with(|| FileInfo::file(child, object.size, object.modified));
            }
            for common in page.common_prefixes {
                let child = path::strip_trailing_slash(&common[prefix.len()..]);
                if child.is_empty() {
                    continue;
                }
                entries
                    .entry(child.to_string())
                    .or_insert_with(|| FileInfo::directory(child));
            }
        }

        Ok(entries.into_values().collect())
    }

    fn mkdir(&self, name: &str, _mode: u32) -> Result<()> {
        path::check_segments(name)?;
        if path::is_root(name) {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        Self::check_creatable(name)?;
        self.check_parent(name)?;
        match self.stat(name) {
            Ok(_) => return Err(StoreError::AlreadyExists(name.to_string())),
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let marker = path::with_trailing_slash(path::normalize(name));
        debug!(marker = %marker, "writing directory marker");
        self.backend.put(&marker, Bytes::new())
    }

    fn remove(&self, name: &str) -> Result<()> {
        if path::is_root(name) {
            return Err(StoreError::InvalidPath("cannot remove the root".to_string()));
        }

        let key = path::normalize(name);
        if self.stat(name)?.is_dir() {
            if !self.readdir(name)?.is_empty() {
                return Err(StoreError::DirectoryNotEmpty(name.to_string()));
            }
            self.backend.delete(&path::with_trailing_slash(key))
        } else {
            self.backend.delete(key)
        }
    }

    fn open_read(&self, name: &str) -> Result<Box<dyn StreamReader>> {
        let info = self.stat(name)?;
        if info.is_dir() {
            return Err(StoreError::IsADirectory(name.to_string()));
        }
        Ok(Box::new(ObjectReader::new(
            Arc::clone(&self.backend),
            path::normalize(name),
            info.size(),
            self.read_buffer_size,
        )))
    }

    fn open_write(&self, name: &str) -> Result<Box<dyn StreamWriter>> {
        path::check_segments(name)?;
        if path::is_root(name) {
            return Err(StoreError::IsADirectory(name.to_string()));
        }
        Self::check_creatable(name)?;
        self.check_parent(name)?;
        match self.stat(name) {
            Ok(info) if info.is_dir() => return Err(StoreError::IsADirectory(name.to_string())),
            Ok(_) | Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let writer = PipeWriter::spawn(
            Arc::clone(&self.backend),
            path::normalize(name),
            &self.transfer,
        )?;
        Ok(Box::new(writer))
    }

    fn close(&self) -> Result<()> {
        self.backend.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::MemoryBucket;
    use silo_core::{read_file, write_file};

    fn store_with(keys: &[&str]) -> ObjectStreamStore<MemoryBucket> {
        let bucket = MemoryBucket::new();
        for key in keys {
            bucket.put(key, Bytes::from_static(b"data")).unwrap();
        }
        ObjectStreamStore::new(bucket)
    }

    #[test]
    fn test_stat_sees_implicit_and_marked_directories() {
        let store = store_with(&["implicit/child", "marked/"]);
        assert!(store.stat("/implicit").unwrap().is_dir());
        assert!(store.stat("marked").unwrap().is_dir());
        assert_eq!(store.stat("/implicit/child").unwrap().size(), 4);
        assert!(store.stat("/impl").unwrap_err().is_not_found());
    }

    #[test]
    fn test_stat_looks_past_sibling_keys() {
        // `a-b` and `a.c` sort between `a` and `a/`.
        let store = store_with(&["a-b", "a.c", "a/x"]);
        let info = store.stat("/a").unwrap();
        assert!(info.is_dir());
        assert_eq!(info.name(), "a");
    }

    #[test]
    fn test_file_and_marker_is_a_contract_violation() {
        let store = store_with(&["dup", "dup/"]);
        assert!(matches!(
            store.stat("/dup").unwrap_err(),
            StoreError::ContractViolation(_)
        ));
    }

    #[test]
    fn test_readdir_skips_own_marker_and_sorts() {
        let store = store_with(&["d/", "d/b", "d/a/", "d/c/x", "d/c/y"]);
        let names: Vec<(String, bool)> = store
            .readdir("/d")
            .unwrap()
            .into_iter()
            .map(|i| (i.name().to_string(), i.is_dir()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("a".to_string(), true),
                ("b".to_string(), false),
                ("c".to_string(), true),
            ]
        );
        assert!(matches!(
            store.readdir("/d/b").unwrap_err(),
            StoreError::NotADirectory(_)
        ));
    }

    #[test]
    fn test_remove_keeps_non_empty_directory() {
        let store = store_with(&["d/", "d/f"]);
        assert!(matches!(
            store.remove("/d").unwrap_err(),
            StoreError::DirectoryNotEmpty(_)
        ));
        store.remove("/d/f").unwrap();
        store.remove("/d").unwrap();
        assert!(store.backend().keys().is_empty());
    }

    #[test]
    fn test_write_then_read_through_bucket() {
        let store = store_with(&[]);
        store.mkdir("/dir", 0o755).unwrap();
        write_file(&store, "/dir/file", b"payload").unwrap();
        assert_eq!(read_file(&store, "/dir/file").unwrap(), b"payload");
        assert_eq!(store.backend().keys(), vec!["dir/", "dir/file"]);

        assert!(store.open_write("/missing/file").err().unwrap().is_not_found());
        assert!(matches!(
            store.open_write("/dir/file/below").err().unwrap(),
            StoreError::NotADirectory(_)
        ));
    }

    #[test]
    fn test_marker_name_is_reserved() {
        let store = store_with(&[]);
        store.mkdir("/d", 0o755).unwrap();

        assert!(matches!(
            store.open_write("/d/.silo_dir").err().unwrap(),
            StoreError::InvalidPath(_)
        ));
        assert!(matches!(
            store.mkdir("/.silo_dir", 0o755).unwrap_err(),
            StoreError::InvalidPath(_)
        ));
        assert!(store.readdir("/d").unwrap().is_empty());
        assert_eq!(store.backend().keys(), vec!["d/"]);
    }
}
