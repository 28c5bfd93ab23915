//! Common test fixtures for silo testing

use anyhow::{Context, Result};
use silo_core::{mkdir_all, path, write_file, StreamStore};

/// Builds the small tree the walk tests use: `/a/1`, `/b` and the empty
/// directory `/c`.
pub fn create_walk_tree<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    store.mkdir("/a", 0o755).context("mkdir /a")?;
    write_file(store, "/a/1", b"1").context("write /a/1")?;
    write_file(store, "/b", b"b").context("write /b")?;
    store.mkdir("/c", 0o755).context("mkdir /c")?;
    Ok(())
}

/// Creates a standard test file structure below `root`
pub fn create_test_files<S: StreamStore + ?Sized>(store: &S, root: &str) -> Result<()> {
    mkdir_all(store, root, 0o755)?;
    write_file(store, &path::join(root, "file1.txt"), b"This is file 1 content.")?;
    write_file(store, &path::join(root, "file2.txt"), b"This is file 2 content.")?;

    let subdir = path::join(root, "subdir");
    store.mkdir(&subdir, 0o755)?;
    write_file(store, &path::join(&subdir, "file3.txt"), b"This is file 3 in subdir.")?;

    // Binary file (simple image placeholder)
    write_file(store, &path::join(root, "image.jpg"), &[0xFF, 0xD8, 0xFF, 0xE0])?;

    store.mkdir(&path::join(root, "empty"), 0o755)?;
    Ok(())
}

/// Writes `count` one-byte files named `file0`, `file1`, ... into `dir`.
pub fn create_many_files<S: StreamStore + ?Sized>(
    store: &S,
    dir: &str,
    count: usize,
) -> Result<()> {
    for i in 0..count {
        let name = path::join(dir, &format!("file{i}"));
        write_file(store, &name, &[1]).with_context(|| format!("writing {name}"))?;
    }
    Ok(())
}

/// Deterministic content of `len` bytes.
pub fn patterned_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
