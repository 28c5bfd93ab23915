//! Behaviour every stream store must share
//!
//! Each case receives a fresh, empty store and works from its root. Run the
//! whole suite with [`run_suite`], giving it a factory for the store under
//! test; the in-memory store is the reference the cases were written against.

use crate::assertions::{assert_entries, assert_not_found, collect_tree};
use crate::fixtures::{create_many_files, create_walk_tree, patterned_bytes};
use anyhow::{bail, ensure, Context, Result};
use silo_core::info::DIRECTORY_SIZE;
use silo_core::{
    mkdir_all, read_file, walk, write_file, write_from, FileInfo, StoreError, StreamStore,
    WalkAction,
};
use std::io::{self, Read, Seek, SeekFrom, Write};

const TYPE_MASK: u32 = 0o170_000;
const TYPE_DIR: u32 = 0o040_000;
const TYPE_FILE: u32 = 0o100_000;

/// A named check run against one fresh store
pub struct Case<S: ?Sized> {
    pub name: &'static str,
    pub run: fn(&S) -> Result<()>,
}

impl<S: ?Sized> Clone for Case<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ?Sized> Copy for Case<S> {}

/// Number of files the pagination case writes; more than one listing page.
pub const MANY_FILES: usize = 1010;

/// Every case of the suite.
pub fn cases<S: StreamStore + ?Sized>() -> Vec<Case<S>> {
    vec![
        Case { name: "open_read_not_existing", run: open_read_not_existing },
        Case { name: "open_read_on_directory", run: open_read_on_directory },
        Case { name: "create_new_file", run: create_new_file },
        Case { name: "create_on_existing_dir", run: create_on_existing_dir },
        Case { name: "create_below_file", run: create_below_file },
        Case { name: "create_in_missing_dir", run: create_in_missing_dir },
        Case { name: "mkdir_at_root", run: mkdir_at_root },
        Case { name: "mkdir_trailing_slash", run: mkdir_trailing_slash },
        Case { name: "mkdir_on_existing_dir", run: mkdir_on_existing_dir },
        Case { name: "mkdir_on_existing_file", run: mkdir_on_existing_file },
        Case { name: "mkdir_in_missing_dir", run: mkdir_in_missing_dir },
        Case { name: "mkdir_all_nested", run: mkdir_all_nested },
        Case { name: "remove_missing_at_root", run: remove_missing_at_root },
        Case { name: "remove_missing_in_subdir", run: remove_missing_in_subdir },
        Case { name: "remove_missing_parent", run: remove_missing_parent },
        Case { name: "remove_empty_dir", run: remove_empty_dir },
        Case { name: "remove_non_empty_dir", run: remove_non_empty_dir },
        Case { name: "remove_file_in_dir", run: remove_file_in_dir },
        Case { name: "remove_root", run: remove_root },
        Case { name: "overwrite_replaces_content", run: overwrite_replaces_content },
        Case { name: "unfinished_write_leaves_nothing", run: unfinished_write_leaves_nothing },
        Case { name: "unusual_names_round_trip", run: unusual_names_round_trip },
        Case { name: "relative_segments_rejected", run: relative_segments_rejected },
        Case { name: "readdir_sorted", run: readdir_sorted },
        Case { name: "readdir_on_file", run: readdir_on_file },
        Case { name: "readdir_many_files", run: readdir_many_files },
        Case { name: "stat_nodes", run: stat_nodes },
        Case { name: "stat_is_idempotent", run: stat_is_idempotent },
        Case { name: "reader_seek_and_read_at", run: reader_seek_and_read_at },
        Case { name: "large_file_round_trip", run: large_file_round_trip },
        Case { name: "walk_tree", run: walk_tree },
    ]
}

/// Run every case, each on a store from `factory`.
///
/// Stops at the first failing case and names it in the error.
pub fn run_suite<S, F>(mut factory: F) -> Result<()>
where
    S: StreamStore,
    F: FnMut() -> Result<S>,
{
    for case in cases::<S>() {
        let store = factory().with_context(|| format!("creating store for {}", case.name))?;
        (case.run)(&store).with_context(|| format!("conformance case {} failed", case.name))?;
        store.close().with_context(|| format!("closing store after {}", case.name))?;
    }
    Ok(())
}

fn has_type(info: &FileInfo, file_type: u32) -> bool {
    info.mode() & TYPE_MASK == file_type
}

fn expect_err<T>(result: silo_core::Result<T>, what: &str) -> Result<StoreError> {
    match result {
        Ok(_) => bail!("{what}: expected an error, got success"),
        Err(e) => Ok(e),
    }
}

fn open_read_not_existing<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    assert_not_found(store.open_read("/does/not/exist"))
}

fn open_read_on_directory<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    let name = "/OpenReadOnDirectory";
    store.mkdir(name, 0o755)?;

    let err = expect_err(store.open_read(name), "open_read on a directory")?;
    ensure!(matches!(err, StoreError::IsADirectory(_)), "unexpected error: {err}");
    ensure!(err.to_string() == format!("{name} is a directory"), "message: {err}");
    Ok(())
}

fn create_new_file<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    let name = "/CreateNewFile";
    let mut writer = store.open_write(name)?;
    writer.write_all(&[0, 1, 2, 3, 4])?;
    writer.close()?;

    let info = store.stat(name)?;
    ensure!(info.size() == 5 && !info.is_dir(), "stat after write: {info:?}");

    let entries = store.readdir("/")?;
    ensure!(entries.len() == 1, "root holds {} entries", entries.len());
    let entry = &entries[0];
    ensure!(entry.name() == "CreateNewFile", "entry name {}", entry.name());
    ensure!(entry.size() == 5, "entry size {}", entry.size());
    ensure!(has_type(entry, TYPE_FILE), "entry mode {:o}", entry.mode());
    Ok(())
}

fn create_on_existing_dir<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    let name = "/CreateOnExistingDir";
    store.mkdir(name, 0o755)?;

    let err = expect_err(store.open_write(name), "open_write on a directory")?;
    ensure!(err.to_string().ends_with("is a directory"), "message: {err}");

    let info = store.stat(name)?;
    ensure!(info.is_dir() && info.size() == DIRECTORY_SIZE, "stat: {info:?}");
    Ok(())
}

fn create_below_file<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    let file = "/CreateBelowFile";
    write_file(store, file, &[0, 1, 2, 3, 4])?;

    let err = expect_err(
        store.open_write("/CreateBelowFile/another_filename"),
        "open_write below a file",
    )?;
    ensure!(matches!(err, StoreError::NotADirectory(_)), "unexpected error: {err}");
    ensure!(err.to_string().ends_with("not a directory"), "message: {err}");
    Ok(())
}

fn create_in_missing_dir<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    assert_not_found(store.open_write("/CreateInMissingDir/file"))?;
    assert_not_found(store.stat("/CreateInMissingDir"))
}

fn mkdir_at_root<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    let name = "/MkdirAtRoot";
    store.mkdir(name, 0o755)?;

    let info = store.stat(name)?;
    ensure!(info.is_dir(), "not a directory: {info:?}");
    ensure!(info.size() == DIRECTORY_SIZE, "size {}", info.size());
    Ok(())
}

fn mkdir_trailing_slash<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    let name = "/MkdirTrailingSlash/";
    store.mkdir(name, 0o755)?;

    let info = store.stat(name)?;
    ensure!(info.is_dir() && info.size() == DIRECTORY_SIZE, "stat: {info:?}");
    ensure!(store.stat("/MkdirTrailingSlash")?.is_dir(), "lookup without the slash");
    Ok(())
}

fn mkdir_on_existing_dir<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    let name = "/MkdirOnExistingDir";
    store.mkdir(name, 0o755)?;

    let err = expect_err(store.mkdir(name, 0o755), "second mkdir")?;
    ensure!(matches!(err, StoreError::AlreadyExists(_)), "unexpected error: {err}");
    ensure!(err.to_string().ends_with("file exists"), "message: {err}");
    Ok(())
}

fn mkdir_on_existing_file<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    let dir = "/MkdirOnExistingFile";
    store.mkdir(dir, 0o755)?;
    let file = "/MkdirOnExistingFile/testfile";
    write_file(store, file, &[0, 1, 2, 3, 4])?;

    let err = expect_err(store.mkdir(file, 0o755), "mkdir over a file")?;
    ensure!(err.to_string().ends_with("file exists"), "message: {err}");
    Ok(())
}

fn mkdir_in_missing_dir<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    assert_not_found(store.mkdir("/MkdirInMissingDir/innerdir", 0o755))
}

fn mkdir_all_nested<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    mkdir_all(store, "/foo/bar/baz/qux/quux/", 0o755)?;
    mkdir_all(store, "/foo/bar/baz/qux/quux/", 0o755)?;
    assert_entries(store, "/foo/bar/baz/qux/", &[("quux", true)])
}

fn remove_missing_at_root<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    assert_not_found(store.remove("not_existing_file"))
}

fn remove_missing_in_subdir<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    store.mkdir("/RemoveMissingInSubdir", 0o755)?;
    assert_not_found(store.remove("/RemoveMissingInSubdir/not_existing_file"))
}

fn remove_missing_parent<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    assert_not_found(store.remove("/RemoveMissingParent/some_filename"))
}

fn remove_empty_dir<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    let name = "/RemoveEmptyDir";
    store.mkdir(name, 0o755)?;
    store.stat(name)?;

    store.remove(name)?;
    assert_not_found(store.stat(name))
}

fn remove_non_empty_dir<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    let name = "/RemoveNonEmptyDir";
    store.mkdir(name, 0o755)?;
    write_file(store, "/RemoveNonEmptyDir/a_file", &[0, 1, 2, 3, 4])?;

    let err = expect_err(store.remove(name), "remove of a non-empty directory")?;
    ensure!(matches!(err, StoreError::DirectoryNotEmpty(_)), "unexpected error: {err}");
    ensure!(err.to_string().ends_with("directory not empty"), "message: {err}");

    // Nothing was deleted.
    ensure!(store.stat(name)?.name() == "RemoveNonEmptyDir", "directory name changed");
    ensure!(store.stat("/RemoveNonEmptyDir/a_file")?.size() == 5, "child lost");
    Ok(())
}

fn remove_file_in_dir<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    let dir = "/RemoveFileInDir";
    let file = "/RemoveFileInDir/a_file";
    store.mkdir(dir, 0o755)?;
    write_file(store, file, &[1])?;
    store.stat(file)?;

    store.remove(file)?;
    assert_not_found(store.stat(file))?;
    ensure!(store.readdir(dir)?.is_empty(), "directory not empty after remove");
    ensure!(store.stat(dir)?.is_dir(), "directory vanished with its last child");
    Ok(())
}

fn remove_root<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    let err = expect_err(store.remove("/"), "remove of the root")?;
    ensure!(matches!(err, StoreError::InvalidPath(_)), "unexpected error: {err}");
    ensure!(store.stat("/")?.is_dir(), "root vanished");
    Ok(())
}

fn overwrite_replaces_content<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    let name = "/Overwrite";
    write_file(store, name, &[0, 1, 2, 3, 4])?;
    ensure!(read_file(store, name)? == [0, 1, 2, 3, 4], "first content");

    write_file(store, name, &[5, 6, 7])?;
    ensure!(read_file(store, name)? == [5, 6, 7], "shorter overwrite left old bytes");
    ensure!(store.stat(name)?.size() == 3, "size after overwrite");
    Ok(())
}

/// Source that yields the given number of chunks and then fails.
struct BrokenSource(usize);

impl Read for BrokenSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.0 == 0 {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "source went away"));
        }
        self.0 -= 1;
        let n = buf.len().min(1024);
        buf[..n].fill(0xab);
        Ok(n)
    }
}

fn unfinished_write_leaves_nothing<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    let mut writer = store.open_write("/Aborted")?;
    writer.write_all(&[1; 4096])?;
    writer.abort();
    assert_not_found(store.stat("/Aborted"))?;

    {
        let mut writer = store.open_write("/Dropped")?;
        writer.write_all(&[2; 4096])?;
    }
    assert_not_found(store.stat("/Dropped"))?;

    let failed = write_from(store, "/Failed", &mut BrokenSource(5));
    expect_err(failed, "write from a broken source")?;
    assert_not_found(store.stat("/Failed"))?;

    let kept = "/Kept";
    write_file(store, kept, b"original")?;
    let mut writer = store.open_write(kept)?;
    writer.write_all(b"replacement that never lands")?;
    writer.abort();
    let failed = write_from(store, kept, &mut BrokenSource(2));
    expect_err(failed, "overwrite from a broken source")?;
    ensure!(read_file(store, kept)? == b"original", "previous content lost");

    assert_entries(store, "/", &[("Kept", false)])
}

fn unusual_names_round_trip<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    let dir = "/dir%20x";
    store.mkdir(dir, 0o755)?;
    let names = ["100%", "a b [1] {2} #3", "plus+equals=~"];
    for (i, name) in names.iter().enumerate() {
        let file = format!("{dir}/{name}");
        write_file(store, &file, name.as_bytes())?;
        let info = store.stat(&file).with_context(|| format!("stat {file}"))?;
        ensure!(info.name() == *name && info.size() == name.len() as u64, "stat: {info:?}");
        ensure!(read_file(store, &file)? == name.as_bytes(), "content of {file}");
        ensure!(store.readdir(dir)?.len() == i + 1, "listing after {file}");
    }

    assert_entries(
        store,
        dir,
        &[("100%", false), ("a b [1] {2} #3", false), ("plus+equals=~", false)],
    )?;
    assert_entries(store, "/", &[("dir%20x", true)])?;

    store.remove(&format!("{dir}/100%"))?;
    assert_not_found(store.stat(&format!("{dir}/100%")))
}

fn relative_segments_rejected<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    store.mkdir("/Inner", 0o755)?;

    let attempts = [
        ("open_write", store.open_write("/Inner/../../Escaped").map(|_| ())),
        ("mkdir", store.mkdir("/../Outside", 0o755)),
        ("stat", store.stat("/Inner/..").map(|_| ())),
        ("readdir", store.readdir("/..").map(|_| ())),
        ("remove", store.remove("/Inner/../Inner")),
    ];
    for (op, result) in attempts {
        let err = expect_err(result, op)?;
        ensure!(matches!(err, StoreError::InvalidPath(_)), "{op}: unexpected error {err}");
    }

    assert_entries(store, "/", &[("Inner", true)])
}

fn readdir_sorted<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    store.mkdir("/Readdir", 0o755)?;
    store.mkdir("/Readdir/dir1", 0o755)?;
    write_file(store, "/Readdir/file1", &[1])?;
    write_file(store, "/Readdir/dir1/file2", &[2])?;
    write_file(store, "/Readdir/a-file", &[3])?;

    assert_entries(
        store,
        "/Readdir",
        &[("a-file", false), ("dir1", true), ("file1", false)],
    )?;
    assert_entries(store, "/Readdir/dir1", &[("file2", false)])?;
    assert_entries(store, "/", &[("Readdir", true)])
}

fn readdir_on_file<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    write_file(store, "/ReaddirOnFile", &[1])?;
    let err = expect_err(store.readdir("/ReaddirOnFile"), "readdir of a file")?;
    ensure!(matches!(err, StoreError::NotADirectory(_)), "unexpected error: {err}");
    assert_not_found(store.readdir("/ReaddirMissing"))
}

fn readdir_many_files<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    let dir = "/ReaddirManyFiles";
    store.mkdir(dir, 0o755)?;
    create_many_files(store, dir, MANY_FILES)?;

    let entries = store.readdir(dir)?;
    ensure!(entries.len() == MANY_FILES, "listed {} entries", entries.len());
    ensure!(
        entries.windows(2).all(|w| w[0].name() < w[1].name()),
        "entries are not sorted"
    );
    Ok(())
}

fn stat_nodes<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    store.mkdir("/Stat", 0o755)?;
    store.mkdir("/Stat/dir", 0o755)?;
    write_file(store, "/Stat/dir/file", &[2])?;

    let info = store.stat("/Stat/dir")?;
    ensure!(info.is_dir() && info.name() == "dir", "dir stat: {info:?}");
    ensure!(has_type(&info, TYPE_DIR), "dir mode {:o}", info.mode());
    ensure!(info.size() == DIRECTORY_SIZE, "dir size {}", info.size());

    let info = store.stat("/Stat/dir/file")?;
    ensure!(!info.is_dir() && info.name() == "file", "file stat: {info:?}");
    ensure!(has_type(&info, TYPE_FILE), "file mode {:o}", info.mode());
    ensure!(info.size() == 1, "file size {}", info.size());
    ensure!(info.modified().is_some(), "file without modification time");

    let root = store.stat("/")?;
    ensure!(root.is_dir() && root.name() == "/", "root stat: {root:?}");
    ensure!(store.lstat("/Stat/dir/file")?.size() == 1, "lstat of a plain file");
    Ok(())
}

fn stat_is_idempotent<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    write_file(store, "/Idempotent", b"abc")?;
    let first = store.stat("/Idempotent")?;
    let second = store.stat("/Idempotent")?;
    ensure!(first == second, "{first:?} != {second:?}");
    ensure!(store.stat("/")? == store.stat("")?, "root spelled two ways");
    Ok(())
}

fn reader_seek_and_read_at<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    write_file(store, "/Seekable", b"0123456789")?;
    let mut reader = store.open_read("/Seekable")?;

    let mut head = [0u8; 3];
    reader.read_exact(&mut head)?;
    ensure!(&head == b"012", "head {head:?}");

    ensure!(reader.seek(SeekFrom::End(-2))? == 8, "seek from end");
    let mut tail = Vec::new();
    reader.read_to_end(&mut tail)?;
    ensure!(tail == b"89", "tail {tail:?}");

    let mut buf = [0u8; 4];
    ensure!(reader.read_at(&mut buf, 4)? == 4 && &buf == b"4567", "read_at middle");
    ensure!(reader.read_at(&mut buf, 8)? == 2 && &buf[..2] == b"89", "read_at end");
    ensure!(reader.read_at(&mut buf, 10)? == 0, "read_at past the end");

    reader.seek(SeekFrom::Start(1))?;
    let mut one = [0u8; 1];
    reader.read_exact(&mut one)?;
    ensure!(one == *b"1", "read after seek back");
    Ok(())
}

fn large_file_round_trip<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    let data = patterned_bytes(3 * 1024 * 1024 + 17);
    let mut writer = store.open_write("/Large")?;
    for chunk in data.chunks(100_003) {
        writer.write_all(chunk)?;
    }
    writer.close()?;

    ensure!(store.stat("/Large")?.size() == data.len() as u64, "size");
    ensure!(read_file(store, "/Large")? == data, "content");
    Ok(())
}

fn walk_tree<S: StreamStore + ?Sized>(store: &S) -> Result<()> {
    create_walk_tree(store)?;

    let paths: Vec<String> = collect_tree(store, "/")?.into_iter().map(|n| n.0).collect();
    ensure!(paths == ["/", "/a", "/a/1", "/b", "/c"], "walk order {paths:?}");

    let mut visited = Vec::new();
    walk(store, "/", |path, _| -> std::result::Result<_, StoreError> {
        if path == "/a" {
            return Ok(WalkAction::SkipDir);
        }
        visited.push(path.to_string());
        Ok(WalkAction::Continue)
    })?;
    ensure!(visited == ["/", "/b", "/c"], "walk with skip {visited:?}");
    Ok(())
}
