//! Storage backends for Parcelio
//!
//! A backend moves object bytes to and from an external chunk transport.
//! The coordinator only sees the `ChunkBackend` trait; concrete adapters
//! live in the submodules.

pub mod factory;
pub mod fs_store;
pub mod memory_store;
pub mod splitter;

pub use factory::BackendBuilder;
pub use fs_store::FsChunkBackend;
pub use memory_store::MemoryChunkBackend;
pub use splitter::ChunkSplitter;

use crate::catalog::ChunkRef;
use crate::error::{ParcelError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use sha2::{Digest, Sha256};

/// Incoming object body.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Outgoing object body. An `Err` item aborts the receiving transport.
pub type ChunkSink = tokio::sync::mpsc::Sender<std::io::Result<Bytes>>;

/// Default chunk size for backends that split bodies themselves.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Handle to the transport channel a backend writes into.
///
/// Owned by the application for the life of the process and passed through
/// the coordinator untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChannel {
    id: String,
}

impl StorageChannel {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// What a backend reports after pushing an object.
#[derive(Debug, Clone)]
pub struct UploadedObject {
    pub chunk_refs: Vec<ChunkRef>,
    /// The name the backend actually stored the object under.
    pub name: String,
    pub size: u64,
}

#[async_trait]
pub trait ChunkBackend: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Split `stream` into chunks and push them to `channel`.
    async fn upload(
        &self,
        stream: ByteStream,
        name: &str,
        channel: &StorageChannel,
    ) -> Result<UploadedObject>;

    /// Send the chunk payloads, in order, into `sink`.
    ///
    /// Once any bytes have been sent the response is committed, so a failure
    /// must also push an error item into the sink before returning.
    async fn download(&self, sink: ChunkSink, chunk_refs: &[ChunkRef], name: &str) -> Result<()>;

    /// Discard every chunk stored for `name`.
    async fn remove(&self, name: &str, channel: &StorageChannel) -> Result<()>;
}

/// Compute SHA256 hash of data
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Verify that data matches the expected hash
pub fn verify_hash(data: &[u8], expected_hash: &str) -> Result<()> {
    let actual_hash = compute_hash(data);
    if actual_hash != expected_hash {
        return Err(ParcelError::HashMismatch {
            expected: expected_hash.to_string(),
            actual: actual_hash,
        });
    }
    Ok(())
}

/// Forward a backend fault to the receiving transport, then hand the error
/// back to the caller.
pub(crate) async fn abort_sink(sink: &ChunkSink, error: ParcelError) -> ParcelError {
    let _ = sink
        .send(Err(std::io::Error::other(error.to_string())))
        .await;
    error
}

/// Send one chunk, treating a closed receiver as a client disconnect.
pub(crate) async fn send_chunk(sink: &ChunkSink, data: Bytes) -> Result<()> {
    sink.send(Ok(data))
        .await
        .map_err(|_| ParcelError::Backend("download receiver closed".to_string()))
}
