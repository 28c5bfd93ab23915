//! In-memory reference store
//!
//! A tree of nodes behind one mutex. Every operation, reads included, holds
//! the lock for its whole duration, which keeps the semantics simple enough
//! to serve as the oracle the other backends are checked against.

use crate::info::FileInfo;
use crate::store::{StreamReader, StreamStore, StreamWriter};
use crate::{path, Result, StoreError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

#[derive(Debug)]
enum Node {
    File {
        content: Bytes,
        modified: DateTime<Utc>,
    },
    Dir {
        entries: BTreeMap<String, Node>,
    },
}

impl Node {
    fn empty_dir() -> Self {
        Node::Dir {
            entries: BTreeMap::new(),
        }
    }

    fn info(&self, name: &str) -> FileInfo {
        match self {
            Node::File { content, modified } => {
                FileInfo::file(name, content.len() as u64, Some(*modified))
            }
            Node::Dir { .. } => FileInfo::directory(name),
        }
    }

    fn child(&self, name: &str) -> Option<&Node> {
        match self {
            Node::Dir { entries } => entries.get(name),
            Node::File { .. } => None,
        }
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut Node> {
        match self {
            Node::Dir { entries } => entries.get_mut(name),
            Node::File { .. } => None,
        }
    }

    fn lookup<'a, I>(&self, segments: I) -> Option<&Node>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut node = self;
        for segment in segments {
            node = node.child(segment)?;
        }
        Some(node)
    }

    fn lookup_mut<'a, I>(&mut self, segments: I) -> Option<&mut Node>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut node = self;
        for segment in segments {
            node = node.child_mut(segment)?;
        }
        Some(node)
    }
}

/// Splits a path into its parent segments and final name.
fn split_last(name: &str) -> Option<(Vec<&str>, &str)> {
    let mut segments: Vec<&str> = path::segments(name).collect();
    let last = segments.pop()?;
    Some((segments, last))
}

fn lock(tree: &Mutex<Node>) -> MutexGuard<'_, Node> {
    tree.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Stream store holding everything in a single in-memory tree
#[derive(Debug, Clone)]
pub struct MemStreamStore {
    tree: Arc<Mutex<Node>>,
}

impl Default for MemStreamStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStreamStore {
    /// An empty store holding only the root directory.
    pub fn new() -> Self {
        Self {
            tree: Arc::new(Mutex::new(Node::empty_dir())),
        }
    }

    /// Entries of the parent directory named by `parents`, mapping failures
    /// the same way for mkdir and open_write.
    fn parent_entries<'a>(
        root: &'a mut Node,
        parents: &[&str],
    ) -> Result<&'a mut BTreeMap<String, Node>> {
        match root.lookup_mut(parents.iter().copied()) {
            Some(Node::Dir { entries }) => Ok(entries),
            Some(Node::File { .. }) => Err(StoreError::NotADirectory(parents.join("/"))),
            None => Err(StoreError::NotFound(parents.join("/"))),
        }
    }
}

impl StreamStore for MemStreamStore {
    fn stat(&self, name: &str) -> Result<FileInfo> {
        path::check_segments(name)?;
        if path::is_root(name) {
            return Ok(FileInfo::root());
        }
        let root = lock(&self.tree);
        root.lookup(path::segments(name))
            .map(|node| node.info(path::last_element(name)))
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn readdir(&self, name: &str) -> Result<Vec<FileInfo>> {
        path::check_segments(name)?;
        let root = lock(&self.tree);
        match root.lookup(path::segments(name)) {
            Some(Node::Dir { entries }) => Ok(entries
                .iter()
                .map(|(child, node)| node.info(child))
                .collect()),
            Some(Node::File { .. }) => Err(StoreError::NotADirectory(name.to_string())),
            None => Err(StoreError::NotFound(name.to_string())),
        }
    }

    fn mkdir(&self, name: &str, _mode: u32) -> Result<()> {
        path::check_segments(name)?;
        let (parents, dir_name) =
            split_last(name).ok_or_else(|| StoreError::AlreadyExists(name.to_string()))?;

        let mut root = lock(&self.tree);
        let entries = Self::parent_entries(&mut root, &parents)?;
        if entries.contains_key(dir_name) {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        entries.insert(dir_name.to_string(), Node::empty_dir());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        path::check_segments(name)?;
        let (parents, file_name) = split_last(name)
            .ok_or_else(|| StoreError::InvalidPath("cannot remove the root".to_string()))?;

        let mut root = lock(&self.tree);
        let Some(Node::Dir { entries }) = root.lookup_mut(parents.iter().copied()) else {
            return Err(StoreError::NotFound(name.to_string()));
        };
        let has_children = match entries.get(file_name) {
            None => return Err(StoreError::NotFound(name.to_string())),
            Some(Node::Dir { entries: children }) => !children.is_empty(),
            Some(Node::File { .. }) => false,
        };
        if has_children {
            return Err(StoreError::DirectoryNotEmpty(name.to_string()));
        }
        trace!(path = name, "removing node");
        entries.remove(file_name);
        Ok(())
    }

    fn open_read(&self, name: &str) -> Result<Box<dyn StreamReader>> {
        path::check_segments(name)?;
        let root = lock(&self.tree);
        match root.lookup(path::segments(name)) {
            Some(Node::File { content, .. }) => Ok(Box::new(MemReader::new(content.clone()))),
            Some(Node::Dir { .. }) => Err(StoreError::IsADirectory(name.to_string())),
            None => Err(StoreError::NotFound(name.to_string())),
        }
    }

    fn open_write(&self, name: &str) -> Result<Box<dyn StreamWriter>> {
        path::check_segments(name)?;
        let (parents, file_name) =
            split_last(name).ok_or_else(|| StoreError::IsADirectory(name.to_string()))?;

        // Only validate here; the tree changes when the writer closes.
        let mut root = lock(&self.tree);
        let entries = Self::parent_entries(&mut root, &parents)?;
        if let Some(Node::Dir { .. }) = entries.get(file_name) {
            return Err(StoreError::IsADirectory(name.to_string()));
        }

        Ok(Box::new(MemWriter {
            tree: Arc::clone(&self.tree),
            path: name.to_string(),
            buffer: Vec::new(),
            closed: false,
        }))
    }
}

/// Reader over a snapshot of a file's content
#[derive(Debug)]
pub struct MemReader {
    cursor: Cursor<Bytes>,
}

impl MemReader {
    pub fn new(content: Bytes) -> Self {
        Self {
            cursor: Cursor::new(content),
        }
    }
}

impl Read for MemReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for MemReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl StreamReader for MemReader {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let data = self.cursor.get_ref();
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }
}

/// Writer that buffers locally and publishes into the tree on close
#[derive(Debug)]
struct MemWriter {
    tree: Arc<Mutex<Node>>,
    path: String,
    buffer: Vec<u8>,
    closed: bool,
}

impl MemWriter {
    /// Replace the file with the buffered content in one step.
    fn publish(&mut self) -> Result<()> {
        self.closed = true;
        let content = Bytes::from(std::mem::take(&mut self.buffer));
        let (parents, file_name) = split_last(&self.path)
            .ok_or_else(|| StoreError::IsADirectory(self.path.clone()))?;

        let mut root = lock(&self.tree);
        let entries = MemStreamStore::parent_entries(&mut root, &parents)?;
        if let Some(Node::Dir { .. }) = entries.get(file_name) {
            return Err(StoreError::IsADirectory(self.path.clone()));
        }
        entries.insert(
            file_name.to_string(),
            Node::File {
                content,
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    fn discard(&mut self) {
        self.closed = true;
        self.buffer = Vec::new();
    }
}

impl Write for MemWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl StreamWriter for MemWriter {
    fn close(mut self: Box<Self>) -> Result<()> {
        self.publish()
    }

    fn abort(mut self: Box<Self>) {
        self.discard();
    }
}

impl Drop for MemWriter {
    fn drop(&mut self) {
        if !self.closed {
            debug!(path = %self.path, "discarding unclosed writer");
            self.discard();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{read_file, write_file};

    #[test]
    fn test_root_stat() {
        let store = MemStreamStore::new();
        let info = store.stat("/").unwrap();
        assert!(info.is_dir());
        assert_eq!(info.size(), 4096);
        assert_eq!(store.stat("").unwrap(), info);
    }

    #[test]
    fn test_write_visible_after_close() {
        let store = MemStreamStore::new();
        let mut writer = store.open_write("/f").unwrap();
        writer.write_all(b"hello").unwrap();

        // Nothing is visible while the writer is open.
        assert!(store.stat("/f").unwrap_err().is_not_found());

        writer.close().unwrap();
        assert_eq!(store.stat("/f").unwrap().size(), 5);
        assert_eq!(read_file(&store, "/f").unwrap(), b"hello");
    }

    #[test]
    fn test_dropped_or_aborted_writer_publishes_nothing() {
        let store = MemStreamStore::new();
        write_file(&store, "/kept", b"old").unwrap();
        {
            let mut writer = store.open_write("/kept").unwrap();
            writer.write_all(b"new content").unwrap();
        }
        assert_eq!(read_file(&store, "/kept").unwrap(), b"old");

        let mut writer = store.open_write("/aborted").unwrap();
        writer.write_all(b"abc").unwrap();
        writer.abort();
        assert!(store.stat("/aborted").unwrap_err().is_not_found());
    }

    #[test]
    fn test_close_after_parent_removed_reports_not_found() {
        let store = MemStreamStore::new();
        store.mkdir("/d", 0o755).unwrap();
        let mut writer = store.open_write("/d/gone").unwrap();
        writer.write_all(b"abc").unwrap();
        store.remove("/d").unwrap();

        let err = writer.close().unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_relative_segments_rejected() {
        let store = MemStreamStore::new();
        store.mkdir("/d", 0o755).unwrap();
        for name in ["/d/../x", "/..", "/d/./x"] {
            assert!(matches!(
                store.open_write(name).err().unwrap(),
                StoreError::InvalidPath(_)
            ));
        }
        assert!(matches!(
            store.stat("/d/..").unwrap_err(),
            StoreError::InvalidPath(_)
        ));
        assert_eq!(store.readdir("/").unwrap().len(), 1);
    }

    #[test]
    fn test_open_write_under_file() {
        let store = MemStreamStore::new();
        write_file(&store, "/file", b"1").unwrap();

        let err = store.open_write("/file/child").err().unwrap();
        assert!(matches!(err, StoreError::NotADirectory(_)));

        let err = store.open_write("/missing/child").err().unwrap();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_remove_root_rejected() {
        let store = MemStreamStore::new();
        assert!(matches!(
            store.remove("/").unwrap_err(),
            StoreError::InvalidPath(_)
        ));
    }

    #[test]
    fn test_read_at_short_at_end() {
        let mut reader = MemReader::new(Bytes::from_static(b"0123456789"));
        let mut buf = [0u8; 4];
        assert_eq!(reader.read_at(&mut buf, 8).unwrap(), 2);
        assert_eq!(&buf[..2], b"89");
        assert_eq!(reader.read_at(&mut buf, 10).unwrap(), 0);

        // Positional reads leave the cursor alone.
        let mut all = Vec::new();
        reader.read_to_end(&mut all).unwrap();
        assert_eq!(all.len(), 10);
    }
}
