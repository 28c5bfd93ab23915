//! Node metadata returned by `stat` and `readdir`

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Size reported for every directory, real or synthesized.
pub const DIRECTORY_SIZE: u64 = 4096;

/// Mode of a directory: type bit plus `rwxr-xr-x`.
pub const DIRECTORY_MODE: u32 = 0o040_755;

/// Mode of a regular file: type bit plus `rw-r--r--`.
pub const FILE_MODE: u32 = 0o100_644;

/// Name given to the root node.
pub const ROOT_NAME: &str = "/";

/// Metadata of a single node in a stream store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    name: String,
    size: u64,
    is_dir: bool,
    modified: Option<DateTime<Utc>>,
    mode: u32,
}

impl FileInfo {
    /// A regular file.
    pub fn file(name: impl Into<String>, size: u64, modified: Option<DateTime<Utc>>) -> Self {
        Self {
            name: name.into(),
            size,
            is_dir: false,
            modified,
            mode: FILE_MODE,
        }
    }

    /// A directory. Directories carry the fixed size and no modification time.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: DIRECTORY_SIZE,
            is_dir: true,
            modified: None,
            mode: DIRECTORY_MODE,
        }
    }

    /// The root node.
    pub fn root() -> Self {
        Self::directory(ROOT_NAME)
    }

    /// Override the mode, for backends that report a native one.
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.modified
    }

    /// Full mode including the file-type bits.
    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// Permission bits only.
    pub fn permissions(&self) -> u32 {
        self.mode & 0o777
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_defaults() {
        let info = FileInfo::directory("dir");
        assert!(info.is_dir());
        assert_eq!(info.size(), 4096);
        assert_eq!(info.permissions(), 0o755);
        assert!(info.modified().is_none());
    }

    #[test]
    fn test_file_defaults() {
        let info = FileInfo::file("f", 5, None);
        assert!(!info.is_dir());
        assert_eq!(info.size(), 5);
        assert_eq!(info.permissions(), 0o644);
        assert_eq!(FileInfo::root().name(), "/");
    }
}
