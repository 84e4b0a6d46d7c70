//! Parcelio Core - object catalog and lifecycle coordination for chunked
//! transport backends
//!
//! Objects are pushed to an external channel as ordered chunks. This crate
//! keeps the in-memory catalog of what was stored:
//! - one record per object name, with its chunk handles, size and count
//! - running totals of bytes and chunks across the catalog
//! - per-name lock sets that keep upload, download and delete from racing
//!
//! The `Coordinator` is the only entry point that mutates that state.

pub mod catalog;
pub mod coordinator;
pub mod error;
pub mod locks;
pub mod operations;
pub mod state;
pub mod storage;

pub use catalog::{AggregateMeta, Catalog, ChunkRef, ObjectRecord};
pub use coordinator::{CatalogSnapshot, ChunkDescriptor, Coordinator};
pub use error::{ParcelError, Result};
pub use locks::{LockCounts, LockKind, LockRegistry};
pub use operations::{
    DeleteObjectOperationOutcome, DeleteObjectOperationResult, DownloadObjectOperationOutcome,
    ObjectDownload, UploadObjectOperationOutcome, UploadObjectOperationResult, normalize_name,
};
pub use state::{GatewayState, LockGuard, StateInner};
pub use storage::{
    BackendBuilder, ByteStream, ChunkBackend, ChunkSink, ChunkSplitter, DEFAULT_CHUNK_SIZE,
    FsChunkBackend, MemoryChunkBackend, StorageChannel, UploadedObject, compute_hash, verify_hash,
};
