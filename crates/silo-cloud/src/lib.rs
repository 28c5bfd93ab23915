//! # silo-cloud
//!
//! Object-store backends for silo. Flat, prefix-addressed buckets have no
//! directories; this crate emulates them on top of a small set of primitive
//! operations so that S3, GCS, Azure or an in-process bucket can be used
//! through the same [`silo_core::StreamStore`] contract as the local disk.
//!
//! ## Architecture
//!
//! - [`ObjectBackend`]: list / ranged get / put / upload / delete
//! - [`ObjectStreamStore`]: stat resolution and directory emulation over any backend
//! - [`ObjectReader`] and [`PipeWriter`]: the stream adapters handed out by the store
//! - [`MemoryBucket`] and [`ObjectStoreBackend`]: the two backend implementations
//!
//! The `object_store` API is async; calls are bridged through one shared
//! Tokio runtime, so none of this may be used from inside an async context.

#![warn(missing_debug_implementations)]

mod adapter;
mod backend;
mod buffer;
mod bucket;
mod error;
mod reader;
mod register;
mod runtime;
mod store;
mod writer;

pub use adapter::{ObjectStoreBackend, MARKER_NAME};
pub use backend::{ListPage, ListQuery, ListedObject, ObjectBackend};
pub use bucket::{MemoryBucket, DEFAULT_PAGE_SIZE};
pub use error::CloudError;
pub use reader::ObjectReader;
pub use register::register_backends;
pub use store::ObjectStreamStore;
pub use writer::PipeWriter;

// Re-export commonly used types from object_store
pub use object_store::{ObjectStore, path::Path as ObjectPath};
