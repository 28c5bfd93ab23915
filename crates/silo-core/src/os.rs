//! Local-disk store, a thin pass-through to `std::fs`
//!
//! Writes go to a temporary file next to the target and are renamed into
//! place on close, so a failed or abandoned write leaves the target alone.

use crate::info::FileInfo;
use crate::store::{read_full, StreamReader, StreamStore, StreamWriter};
use crate::{path, Result, StoreError};
use chrono::{DateTime, Utc};
use std::fs::{self, File, Metadata};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Stream store backed by the local filesystem
///
/// Without a root, store paths are used as native paths. With a root, every
/// store path (absolute or not) is resolved below it, `/` names the root
/// directory itself and paths with `.` or `..` segments are rejected.
#[derive(Debug, Clone, Default)]
pub struct OsStreamStore {
    root: Option<PathBuf>,
}

impl OsStreamStore {
    /// Store that uses paths as given.
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Store confined below `root`.
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let Some(root) = &self.root else {
            return Ok(PathBuf::from(name));
        };
        path::check_segments(name)?;

        let mut native = root.clone();
        for component in Path::new(path::normalize(name)).components() {
            match component {
                Component::Normal(part) => native.push(part),
                Component::CurDir
                | Component::ParentDir
                | Component::RootDir
                | Component::Prefix(_) => {
                    warn!(path = name, "path leaves the store root");
                    return Err(StoreError::InvalidPath(format!(
                        "{name}: outside the store root"
                    )));
                }
            }
        }
        Ok(native)
    }
}

/// Translate an I/O failure on `name` into the store taxonomy.
fn map_io(err: io::Error, name: &str) -> StoreError {
    match err.kind() {
        ErrorKind::NotFound => StoreError::NotFound(name.to_string()),
        ErrorKind::AlreadyExists => StoreError::AlreadyExists(name.to_string()),
        ErrorKind::IsADirectory => StoreError::IsADirectory(name.to_string()),
        ErrorKind::NotADirectory => StoreError::NotADirectory(name.to_string()),
        ErrorKind::DirectoryNotEmpty => StoreError::DirectoryNotEmpty(name.to_string()),
        _ => StoreError::Io(err),
    }
}

fn to_info(name: &str, meta: &Metadata) -> FileInfo {
    let info = if meta.is_dir() {
        FileInfo::directory(name)
    } else {
        let modified = meta.modified().ok().map(DateTime::<Utc>::from);
        FileInfo::file(name, meta.len(), modified)
    };
    native_mode(info, meta)
}

#[cfg(unix)]
fn native_mode(info: FileInfo, meta: &Metadata) -> FileInfo {
    use std::os::unix::fs::MetadataExt;
    info.with_mode(meta.mode())
}

#[cfg(not(unix))]
fn native_mode(info: FileInfo, _meta: &Metadata) -> FileInfo {
    info
}

fn file_name(name: &str, native: &Path) -> String {
    if path::is_root(name) {
        return crate::info::ROOT_NAME.to_string();
    }
    match native.file_name() {
        Some(os_name) => os_name.to_string_lossy().into_owned(),
        None => path::last_element(name).to_string(),
    }
}

impl StreamStore for OsStreamStore {
    fn stat(&self, name: &str) -> Result<FileInfo> {
        let native = self.resolve(name)?;
        let meta = fs::metadata(&native).map_err(|e| map_io(e, name))?;
        Ok(to_info(&file_name(name, &native), &meta))
    }

    fn lstat(&self, name: &str) -> Result<FileInfo> {
        let native = self.resolve(name)?;
        let meta = fs::symlink_metadata(&native).map_err(|e| map_io(e, name))?;
        Ok(to_info(&file_name(name, &native), &meta))
    }

    fn readdir(&self, name: &str) -> Result<Vec<FileInfo>> {
        let native = self.resolve(name)?;
        let mut infos = Vec::new();
        for entry in fs::read_dir(&native).map_err(|e| map_io(e, name))? {
            let entry = entry?;
            let meta = entry.metadata()?;
            infos.push(to_info(&entry.file_name().to_string_lossy(), &meta));
        }
        infos.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(infos)
    }

    fn mkdir(&self, name: &str, mode: u32) -> Result<()> {
        let mut builder = fs::DirBuilder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;
        builder
            .create(self.resolve(name)?)
            .map_err(|e| map_io(e, name))
    }

    fn remove(&self, name: &str) -> Result<()> {
        if self.root.is_some() && path::is_root(name) {
            return Err(StoreError::InvalidPath("cannot remove the root".to_string()));
        }
        let native = self.resolve(name)?;
        let meta = fs::symlink_metadata(&native).map_err(|e| map_io(e, name))?;
        let removed = if meta.is_dir() {
            fs::remove_dir(&native)
        } else {
            fs::remove_file(&native)
        };
        removed.map_err(|e| map_io(e, name))
    }

    fn open_read(&self, name: &str) -> Result<Box<dyn StreamReader>> {
        let native = self.resolve(name)?;
        let file = File::open(&native).map_err(|e| map_io(e, name))?;
        if file.metadata()?.is_dir() {
            return Err(StoreError::IsADirectory(name.to_string()));
        }
        Ok(Box::new(OsReader { file }))
    }

    fn open_write(&self, name: &str) -> Result<Box<dyn StreamWriter>> {
        let native = self.resolve(name)?;
        if native.is_dir() {
            return Err(StoreError::IsADirectory(name.to_string()));
        }
        let dir = match native.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut builder = tempfile::Builder::new();
        builder.prefix(".silo-").suffix(".part");
        // An overwrite keeps the permissions of the file it replaces.
        #[cfg(unix)]
        {
            if let Ok(meta) = fs::metadata(&native) {
                builder.permissions(meta.permissions());
            }
        }
        let temp = builder.tempfile_in(dir).map_err(|e| map_io(e, name))?;

        Ok(Box::new(OsWriter {
            temp,
            target: native,
            name: name.to_string(),
        }))
    }
}

#[derive(Debug)]
struct OsReader {
    file: File,
}

impl Read for OsReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for OsReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl StreamReader for OsReader {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let saved = self.file.stream_position()?;
        self.file.seek(SeekFrom::Start(offset))?;
        let result = read_full(&mut self.file, buf);
        self.file.seek(SeekFrom::Start(saved))?;
        result
    }
}

/// Writes into a temporary sibling of `target`; dropping it removes the
/// temporary file.
#[derive(Debug)]
struct OsWriter {
    temp: NamedTempFile,
    target: PathBuf,
    name: String,
}

impl Write for OsWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}

impl StreamWriter for OsWriter {
    fn close(self: Box<Self>) -> Result<()> {
        let OsWriter {
            mut temp,
            target,
            name,
        } = *self;
        temp.flush()?;
        temp.as_file().sync_all()?;
        temp.persist(&target).map_err(|e| map_io(e.error, &name))?;
        Ok(())
    }

    fn abort(self: Box<Self>) {
        let OsWriter { temp, name, .. } = *self;
        if let Err(e) = temp.close() {
            debug!(path = %name, error = %e, "failed to remove temporary file");
        }
    }
}
