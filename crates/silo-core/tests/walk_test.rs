use silo_core::{
    mkdir_all, walk, write_file, MemStreamStore, OsStreamStore, StoreError, StreamStore,
    WalkAction,
};
use tempfile::TempDir;

#[derive(Debug, PartialEq)]
struct Stop(&'static str);

/// Builds `/a/1`, `/b` and the empty directory `/c`.
fn populate<S: StreamStore>(store: &S) {
    mkdir_all(store, "/a", 0o755).unwrap();
    write_file(store, "/a/1", b"one").unwrap();
    write_file(store, "/b", b"bee").unwrap();
    store.mkdir("/c", 0o755).unwrap();
}

fn collect<S: StreamStore>(store: &S, root: &str, skip: Option<&str>) -> Vec<(String, String)> {
    let mut seen = Vec::new();
    walk(store, root, |path, info| -> Result<_, StoreError> {
        let info = info?;
        if skip == Some(path) {
            return Ok(WalkAction::SkipDir);
        }
        seen.push((path.to_string(), info.name().to_string()));
        Ok(WalkAction::Continue)
    })
    .unwrap();
    seen
}

fn paths(seen: &[(String, String)]) -> Vec<&str> {
    seen.iter().map(|(p, _)| p.as_str()).collect()
}

#[test]
fn test_walk_is_preorder_and_sorted() {
    let store = MemStreamStore::new();
    populate(&store);

    let seen = collect(&store, "/", None);
    assert_eq!(paths(&seen), vec!["/", "/a", "/a/1", "/b", "/c"]);

    let names: Vec<&str> = seen.iter().map(|(_, n)| n.as_str()).collect();
    assert_eq!(names, vec!["/", "a", "1", "b", "c"]);
}

#[test]
fn test_walk_skip_dir_prunes_subtree() {
    let store = MemStreamStore::new();
    populate(&store);

    let seen = collect(&store, "/", Some("/a"));
    assert_eq!(paths(&seen), vec!["/", "/b", "/c"]);
}

#[test]
fn test_walk_visitor_error_is_returned_unchanged() {
    let store = MemStreamStore::new();
    populate(&store);

    let mut seen = Vec::new();
    let err = walk(&store, "/", |path, _| {
        if path == "/b" {
            return Err(Stop("stop at b"));
        }
        seen.push(path.to_string());
        Ok(WalkAction::Continue)
    })
    .unwrap_err();

    assert_eq!(err, Stop("stop at b"));
    assert_eq!(seen, vec!["/", "/a", "/a/1"]);
}

#[test]
fn test_walk_missing_root_reports_once() {
    let store = MemStreamStore::new();

    let mut calls = Vec::new();
    walk(&store, "/nope", |path, info| -> Result<_, StoreError> {
        calls.push((path.to_string(), info.err().map(|e| e.is_not_found())));
        Ok(WalkAction::Continue)
    })
    .unwrap();

    assert_eq!(calls, vec![("/nope".to_string(), Some(true))]);
}

#[test]
fn test_walk_subtree_root() {
    let store = MemStreamStore::new();
    populate(&store);

    let seen = collect(&store, "/a", None);
    assert_eq!(paths(&seen), vec!["/a", "/a/1"]);
}

#[test]
fn test_walk_on_disk_matches_memory() {
    let temp_dir = TempDir::new().unwrap();
    let disk = OsStreamStore::rooted(temp_dir.path());
    let mem = MemStreamStore::new();
    populate(&disk);
    populate(&mem);

    assert_eq!(paths(&collect(&disk, "/", None)), paths(&collect(&mem, "/", None)));
}
