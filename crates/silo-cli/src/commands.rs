//! Subcommand handlers
//!
//! Each handler works on an already opened store and writes its output to
//! the given writer, so the binary and the tests drive them the same way.

use anyhow::{Context, Result};
use serde::Serialize;
use silo_core::{mkdir_all, walk, write_from, FileInfo, StoreError, StreamStore, WalkAction};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::{debug, info};

/// One node of a `walk`, as printed with `--json`.
#[derive(Serialize)]
struct WalkRecord<'a> {
    path: &'a str,
    #[serde(flatten)]
    info: &'a FileInfo,
}

/// `ls -l` style line for a node.
pub fn format_line(info: &FileInfo) -> String {
    let kind = if info.is_dir() { 'd' } else { '-' };
    let modified = info
        .modified()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{kind} {:04o} {:>12} {:>16} {}",
        info.permissions(),
        info.size(),
        modified,
        info.name()
    )
}

pub fn stat(store: &dyn StreamStore, path: &str, json: bool, out: &mut dyn Write) -> Result<()> {
    let info = store.stat(path)?;
    if json {
        serde_json::to_writer_pretty(&mut *out, &info)?;
        writeln!(out)?;
    } else {
        writeln!(out, "{}", format_line(&info))?;
    }
    Ok(())
}

pub fn ls(store: &dyn StreamStore, path: &str, json: bool, out: &mut dyn Write) -> Result<()> {
    let info = store.stat(path)?;
    // Listing a file shows the file itself.
    let entries = if info.is_dir() {
        store.readdir(path)?
    } else {
        vec![info]
    };

    if json {
        serde_json::to_writer_pretty(&mut *out, &entries)?;
        writeln!(out)?;
    } else {
        for entry in &entries {
            writeln!(out, "{}", format_line(entry))?;
        }
    }
    Ok(())
}

pub fn mkdir(store: &dyn StreamStore, path: &str, parents: bool, mode: u32) -> Result<()> {
    if parents {
        mkdir_all(store, path, mode)?;
    } else {
        store.mkdir(path, mode)?;
    }
    debug!(path, mode = %format!("{mode:o}"), "created directory");
    Ok(())
}

pub fn rm(store: &dyn StreamStore, path: &str) -> Result<()> {
    store.remove(path)?;
    debug!(path, "removed");
    Ok(())
}

pub fn cat(store: &dyn StreamStore, path: &str, out: &mut dyn Write) -> Result<()> {
    let mut reader = store.open_read(path)?;
    let copied = io::copy(&mut reader, &mut *out).with_context(|| format!("reading {path}"))?;
    out.flush()?;
    debug!(path, bytes = copied, "copied to output");
    Ok(())
}

/// Upload `source` (or `input` when absent) to `path`.
///
/// If reading the input fails, nothing is stored.
pub fn put(
    store: &dyn StreamStore,
    path: &str,
    source: Option<&Path>,
    input: &mut dyn Read,
) -> Result<u64> {
    let copied = match source {
        Some(local) => {
            let mut file =
                File::open(local).with_context(|| format!("opening {}", local.display()))?;
            write_from(store, path, &mut file)
        }
        None => write_from(store, path, input),
    }
    .with_context(|| format!("writing {path}"))?;

    info!(path, bytes = copied, "stored");
    Ok(copied)
}

pub fn walk_tree(
    store: &dyn StreamStore,
    root: &str,
    json: bool,
    out: &mut dyn Write,
) -> Result<()> {
    walk(store, root, |path, info| -> Result<WalkAction> {
        let info = info.with_context(|| format!("walking {path}"))?;
        if json {
            serde_json::to_writer(&mut *out, &WalkRecord { path, info })?;
            writeln!(out)?;
        } else {
            writeln!(out, "{path}")?;
        }
        Ok(WalkAction::Continue)
    })
}

/// Exit code for a failed command.
///
/// 2: the node does not exist; 3: the node or argument is unsuitable for
/// the operation; 4: the backend failed or holds inconsistent data.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(store_err) = err.chain().find_map(|e| e.downcast_ref::<StoreError>()) {
        match store_err {
            StoreError::NotFound(_) => 2,
            StoreError::Io(_) => 2,
            StoreError::AlreadyExists(_) => 3,
            StoreError::IsADirectory(_) => 3,
            StoreError::NotADirectory(_) => 3,
            StoreError::DirectoryNotEmpty(_) => 3,
            StoreError::InvalidPath(_) => 3,
            StoreError::InvalidUrl(_) => 3,
            StoreError::UnknownScheme(_) => 3,
            StoreError::ContractViolation(_) => 4,
            StoreError::Backend(_) => 4,
            StoreError::DuplicateScheme(_) => 1,
            StoreError::Config(_) => 1,
        }
    } else if err.chain().any(|e| e.is::<io::Error>()) {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silo_core::{read_file, write_file, MemStreamStore};

    #[test]
    fn test_ls_lists_sorted_entries() {
        let store = MemStreamStore::new();
        store.mkdir("/dir", 0o755).unwrap();
        write_file(&store, "/b.txt", b"hello").unwrap();

        let mut out = Vec::new();
        ls(&store, "/", false, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('-') && lines[0].ends_with("b.txt"));
        assert!(lines[1].starts_with('d') && lines[1].ends_with("dir"));
    }

    #[test]
    fn test_ls_json() {
        let store = MemStreamStore::new();
        write_file(&store, "/f", b"abc").unwrap();

        let mut out = Vec::new();
        ls(&store, "/", true, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value[0]["name"], "f");
        assert_eq!(value[0]["size"], 3);
        assert_eq!(value[0]["is_dir"], false);
    }

    #[test]
    fn test_put_then_cat() {
        let store = MemStreamStore::new();
        let mut input: &[u8] = b"from stdin";
        assert_eq!(put(&store, "/in", None, &mut input).unwrap(), 10);

        let mut out = Vec::new();
        cat(&store, "/in", &mut out).unwrap();
        assert_eq!(out, b"from stdin");
        assert_eq!(read_file(&store, "/in").unwrap(), b"from stdin");
    }

    /// Yields a few bytes, then fails.
    struct Interrupted(usize);

    impl Read for Interrupted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0 == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input cut off"));
            }
            self.0 -= 1;
            let n = buf.len().min(4);
            buf[..n].fill(b'z');
            Ok(n)
        }
    }

    #[test]
    fn test_failed_put_stores_nothing() {
        let store = MemStreamStore::new();
        let err = put(&store, "/obj", None, &mut Interrupted(3)).unwrap_err();
        assert_eq!(exit_code(&err), 2);
        assert!(store.stat("/obj").unwrap_err().is_not_found());

        write_file(&store, "/obj", b"previous").unwrap();
        put(&store, "/obj", None, &mut Interrupted(1)).unwrap_err();
        assert_eq!(read_file(&store, "/obj").unwrap(), b"previous");
    }

    #[test]
    fn test_walk_json_lines() {
        let store = MemStreamStore::new();
        mkdir(&store, "/a/b", true, 0o755).unwrap();
        write_file(&store, "/a/b/c", b"x").unwrap();

        let mut out = Vec::new();
        walk_tree(&store, "/", true, &mut out).unwrap();
        let records: Vec<serde_json::Value> = out
            .split(|b| *b == b'\n')
            .filter(|l| !l.is_empty())
            .map(|l| serde_json::from_slice(l).unwrap())
            .collect();
        let paths: Vec<_> = records.iter().map(|r| r["path"].as_str().unwrap()).collect();
        assert_eq!(paths, vec!["/", "/a", "/a/b", "/a/b/c"]);
        assert_eq!(records[3]["size"], 1);
    }

    #[test]
    fn test_exit_codes() {
        let store = MemStreamStore::new();
        let err = rm(&store, "/missing").unwrap_err();
        assert_eq!(exit_code(&err), 2);

        store.mkdir("/d", 0o755).unwrap();
        let err = mkdir(&store, "/d", false, 0o755).unwrap_err();
        assert_eq!(exit_code(&err), 3);

        let err = anyhow::Error::new(StoreError::ContractViolation("x".into()))
            .context("while listing");
        assert_eq!(exit_code(&err), 4);
        assert_eq!(exit_code(&anyhow::anyhow!("plain failure")), 1);
    }
}
