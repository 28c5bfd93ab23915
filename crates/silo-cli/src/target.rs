//! Turning a command-line argument into a store URL plus a path inside it

use anyhow::{anyhow, Context, Result};
use std::env;
use url::{ParseError, Url};

/// A node named on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// URL the registry opens: scheme, host and query of the argument
    pub store: Url,
    /// Path of the node inside that store
    pub path: String,
}

/// Parse `arg` as a URL, or as a local path when it has no scheme.
///
/// `file:` URLs and plain paths open the unrooted disk store with the
/// absolute native path. Every other scheme keeps its host and query for
/// the store and uses the URL path as the node path.
pub fn parse(arg: &str) -> Result<Target> {
    match Url::parse(arg) {
        // Single-letter schemes are Windows drive letters.
        Ok(url) if url.scheme().len() > 1 => from_url(url),
        Ok(_) | Err(ParseError::RelativeUrlWithoutBase) => local(arg),
        Err(e) => Err(anyhow!("invalid URL {arg}: {e}")),
    }
}

fn from_url(url: Url) -> Result<Target> {
    if url.scheme() == "file" {
        let native = url
            .to_file_path()
            .map_err(|_| anyhow!("{url} does not name a local path"))?;
        return Ok(Target {
            store: disk_root()?,
            path: native.to_string_lossy().into_owned(),
        });
    }

    let path = match url.path() {
        "" => "/".to_string(),
        p => p.to_string(),
    };
    let mut store = url;
    store.set_path("/");
    store.set_fragment(None);
    Ok(Target { store, path })
}

fn local(arg: &str) -> Result<Target> {
    let cwd = env::current_dir().context("reading the current directory")?;
    let native = cwd.join(arg);
    Ok(Target {
        store: disk_root()?,
        path: native.to_string_lossy().into_owned(),
    })
}

fn disk_root() -> Result<Url> {
    Ok(Url::parse("file:///")?)
}
