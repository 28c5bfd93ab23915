//! URL-scheme registry
//!
//! Maps a URL scheme to a constructor that builds a store from the parsed
//! URL. Nothing registers itself; callers build a [`Registry`] and add the
//! schemes they want.

use crate::config::SiloConfig;
use crate::mem::MemStreamStore;
use crate::os::OsStreamStore;
use crate::store::StreamStore;
use crate::{path, Result, StoreError};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;
use url::Url;

/// Builds a store for one URL.
pub type Constructor =
    Box<dyn Fn(&Url, &SiloConfig) -> Result<Box<dyn StreamStore>> + Send + Sync>;

/// Scheme to constructor table
pub struct Registry {
    constructors: BTreeMap<String, Constructor>,
    config: SiloConfig,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("schemes", &self.schemes())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// An empty registry using the default configuration.
    pub fn new() -> Self {
        Self::with_config(SiloConfig::default())
    }

    /// An empty registry whose constructors receive `config`.
    pub fn with_config(config: SiloConfig) -> Self {
        Self {
            constructors: BTreeMap::new(),
            config,
        }
    }

    /// A registry holding the `file` and `mem` schemes.
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        registry.register_defaults()?;
        Ok(registry)
    }

    /// Add the `file` and `mem` schemes.
    ///
    /// `file:///some/dir` opens a disk store rooted at `/some/dir`;
    /// `file:///` uses paths as given. `mem://` opens a fresh memory tree.
    /// Fails with [`StoreError::DuplicateScheme`] if either is already taken.
    pub fn register_defaults(&mut self) -> Result<()> {
        if let Some(taken) = ["file", "mem"]
            .into_iter()
            .find(|scheme| self.constructors.contains_key(*scheme))
        {
            return Err(StoreError::DuplicateScheme(taken.to_string()));
        }

        self.register("file", |url, _| {
            let dir = url
                .to_file_path()
                .map_err(|_| StoreError::InvalidUrl(url.to_string()))?;
            let store: Box<dyn StreamStore> = if path::is_root(url.path()) {
                Box::new(OsStreamStore::new())
            } else {
                Box::new(OsStreamStore::rooted(dir))
            };
            Ok(store)
        })?;
        self.register("mem", |_, _| Ok(Box::new(MemStreamStore::new())))
    }

    /// Register `constructor` for `scheme`. Each scheme can be registered once.
    pub fn register<F>(&mut self, scheme: &str, constructor: F) -> Result<()>
    where
        F: Fn(&Url, &SiloConfig) -> Result<Box<dyn StreamStore>> + Send + Sync + 'static,
    {
        let scheme = scheme.to_ascii_lowercase();
        if self.constructors.contains_key(&scheme) {
            return Err(StoreError::DuplicateScheme(scheme));
        }
        debug!(scheme = %scheme, "registered store scheme");
        self.constructors.insert(scheme, Box::new(constructor));
        Ok(())
    }

    /// Registered schemes, sorted.
    pub fn schemes(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn config(&self) -> &SiloConfig {
        &self.config
    }

    /// Parse `url` and build a store for it.
    pub fn open(&self, url: &str) -> Result<Box<dyn StreamStore>> {
        let parsed = Url::parse(url).map_err(|e| StoreError::InvalidUrl(format!("{url}: {e}")))?;
        self.open_url(&parsed)
    }

    /// Build a store for an already parsed URL.
    pub fn open_url(&self, url: &Url) -> Result<Box<dyn StreamStore>> {
        let constructor = self
            .constructors
            .get(url.scheme())
            .ok_or_else(|| StoreError::UnknownScheme(url.scheme().to_string()))?;
        debug!(scheme = url.scheme(), url = %url, "opening store");
        constructor(url, &self.config)
    }
}
