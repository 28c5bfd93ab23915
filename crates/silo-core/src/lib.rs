//! Silo - one file and directory API over disk, memory and object stores
//!
//! This library defines the stream-store contract, the error taxonomy every
//! backend reports through, and the backends that need no network: the local
//! disk and an in-memory tree used as the reference model.

pub mod config;
pub mod error;
pub mod info;
pub mod logging;
pub mod mem;
pub mod os;
pub mod path;
pub mod registry;
pub mod store;
pub mod walk;

pub use error::{Result, StoreError};

// Re-export commonly used types
pub use config::SiloConfig;
pub use info::FileInfo;
pub use logging::TracingStore;
pub use mem::{MemReader, MemStreamStore};
pub use os::OsStreamStore;
pub use registry::{Constructor, Registry};
pub use store::{
    mkdir_all, read_file, read_full, write_file, write_from, StreamReader, StreamStore,
    StreamWriter,
};
pub use walk::{walk, WalkAction};
