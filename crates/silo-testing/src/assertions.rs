//! Common assertions for silo testing

use anyhow::{bail, ensure, Result};
use silo_core::{read_file, walk, StoreError, StreamStore, WalkAction};

/// `(path, is_dir, content)` for every node below `root`, in walk order.
pub type TreeListing = Vec<(String, bool, Option<Vec<u8>>)>;

/// Asserts that `result` failed with [`StoreError::NotFound`]
pub fn assert_not_found<T>(result: silo_core::Result<T>) -> Result<()> {
    match result {
        Err(StoreError::NotFound(_)) => Ok(()),
        Err(e) => bail!("expected a not-found error, got: {e}"),
        Ok(_) => bail!("expected a not-found error, got success"),
    }
}

/// Asserts the names and kinds of the entries of `dir`, in order
pub fn assert_entries<S: StreamStore + ?Sized>(
    store: &S,
    dir: &str,
    expected: &[(&str, bool)],
) -> Result<()> {
    let entries = store.readdir(dir)?;
    let actual: Vec<(&str, bool)> = entries.iter().map(|i| (i.name(), i.is_dir())).collect();
    ensure!(
        actual == expected,
        "entries of {dir}: expected {expected:?}, got {actual:?}"
    );
    Ok(())
}

/// Walk `root` and record every node along with file content
pub fn collect_tree<S: StreamStore + ?Sized>(store: &S, root: &str) -> Result<TreeListing> {
    let mut nodes = Vec::new();
    walk(store, root, |path, info| -> std::result::Result<_, StoreError> {
        let info = info?;
        let content = if info.is_dir() {
            None
        } else {
            Some(read_file(store, path)?)
        };
        nodes.push((path.to_string(), info.is_dir(), content));
        Ok(WalkAction::Continue)
    })?;
    Ok(nodes)
}

/// Asserts that two stores hold identical trees below `root`
pub fn assert_trees_equal<A, B>(left: &A, right: &B, root: &str) -> Result<()>
where
    A: StreamStore + ?Sized,
    B: StreamStore + ?Sized,
{
    let left = collect_tree(left, root)?;
    let right = collect_tree(right, root)?;

    ensure!(
        left.len() == right.len(),
        "Different number of entries: {} vs {}",
        left.len(),
        right.len()
    );
    for (l, r) in left.iter().zip(right.iter()) {
        ensure!(l.0 == r.0, "Different paths: {} vs {}", l.0, r.0);
        ensure!(l.1 == r.1, "File type mismatch for {}", l.0);
        ensure!(l.2 == r.2, "Content mismatch for {}", l.0);
    }
    Ok(())
}
