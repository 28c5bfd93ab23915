//! Testing utilities and fixtures for silo
//!
//! This crate provides the conformance suite every stream store is checked
//! against, plus fixtures and helpers shared by the workspace tests.

use anyhow::{Context, Result};
use silo_core::OsStreamStore;
use std::path::Path;
use std::sync::Once;
use tempfile::TempDir;
use url::Url;

pub mod assertions;
pub mod conformance;
pub mod fixtures;

/// Scratch directory on disk, removed on drop
pub struct TestDir {
    dir: TempDir,
}

impl TestDir {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new().context("creating a scratch directory")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// `file://` URL naming the directory, for opening it through a registry
    pub fn url(&self) -> Result<Url> {
        Url::from_directory_path(self.dir.path())
            .map_err(|_| anyhow::anyhow!("not an absolute path: {:?}", self.dir.path()))
    }

    /// Disk store rooted at the directory.
    pub fn store(&self) -> OsStreamStore {
        OsStreamStore::rooted(self.dir.path())
    }
}

/// Route `tracing` output to the test harness. Safe to call from every test.
pub fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}
