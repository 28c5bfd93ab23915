//! Recursive tree walk over any stream store
//!
//! The walk is a deterministic pre-order traversal: a directory is visited
//! before its children and children are visited in the sorted order
//! `readdir` returns them in.

use crate::info::FileInfo;
use crate::store::StreamStore;
use crate::{path, StoreError};

/// What the walk should do after a successful visit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalkAction {
    /// Keep going; descend into the node when it is a directory.
    #[default]
    Continue,
    /// On a directory, skip its contents. On a file, skip the remaining
    /// entries of the directory that contains it.
    SkipDir,
}

/// Walk the tree rooted at `root`, calling `visit` for every node, `root`
/// included.
///
/// `visit` receives the node's path (`root` joined with the entry names) and
/// either its metadata or the error met while reaching it. When the root
/// cannot be stat-ed the visitor is called once with that error and the walk
/// ends. When a directory cannot be listed the visitor is called a second
/// time for that directory with the error and its contents are skipped.
/// Any `Err` from the visitor aborts the walk and is returned unchanged.
pub fn walk<S, F, E>(store: &S, root: &str, mut visit: F) -> Result<(), E>
where
    S: StreamStore + ?Sized,
    F: FnMut(&str, Result<&FileInfo, StoreError>) -> Result<WalkAction, E>,
{
    match store.stat(root) {
        Err(e) => visit(root, Err(e)).map(|_| ()),
        Ok(info) => walk_node(store, root, &info, &mut visit).map(|_| ()),
    }
}

fn walk_node<S, F, E>(
    store: &S,
    node_path: &str,
    info: &FileInfo,
    visit: &mut F,
) -> Result<WalkAction, E>
where
    S: StreamStore + ?Sized,
    F: FnMut(&str, Result<&FileInfo, StoreError>) -> Result<WalkAction, E>,
{
    let action = visit(node_path, Ok(info))?;
    if !info.is_dir() || action == WalkAction::SkipDir {
        return Ok(action);
    }

    let children = match store.readdir(node_path) {
        Ok(children) => children,
        Err(e) => {
            visit(node_path, Err(e))?;
            return Ok(WalkAction::Continue);
        }
    };

    for child in &children {
        let child_path = path::join(node_path, child.name());
        let action = walk_node(store, &child_path, child, visit)?;
        if action == WalkAction::SkipDir && !child.is_dir() {
            break;
        }
    }
    Ok(WalkAction::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::write_file;
    use crate::MemStreamStore;

    #[test]
    fn test_walk_single_file() {
        let store = MemStreamStore::new();
        write_file(&store, "/only", b"x").unwrap();

        let mut seen = Vec::new();
        walk(&store, "/only", |p, info| -> Result<_, StoreError> {
            seen.push((p.to_string(), info?.size()));
            Ok(WalkAction::Continue)
        })
        .unwrap();
        assert_eq!(seen, vec![("/only".to_string(), 1)]);
    }

    #[test]
    fn test_skip_on_file_skips_siblings() {
        let store = MemStreamStore::new();
        for name in ["/a", "/b", "/c"] {
            write_file(&store, name, b"x").unwrap();
        }

        let mut seen = Vec::new();
        walk(&store, "/", |p, _| -> Result<_, StoreError> {
            seen.push(p.to_string());
            if p == "/b" {
                return Ok(WalkAction::SkipDir);
            }
            Ok(WalkAction::Continue)
        })
        .unwrap();
        assert_eq!(seen, vec!["/", "/a", "/b"]);
    }

    #[test]
    fn test_skip_at_root_ends_walk() {
        let store = MemStreamStore::new();
        write_file(&store, "/a", b"x").unwrap();

        let mut count = 0;
        walk(&store, "/", |_, _| -> Result<_, StoreError> {
            count += 1;
            Ok(WalkAction::SkipDir)
        })
        .unwrap();
        assert_eq!(count, 1);
    }
}
