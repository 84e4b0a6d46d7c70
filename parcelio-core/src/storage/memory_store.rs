use super::{
    ByteStream, ChunkBackend, ChunkSink, ChunkSplitter, StorageChannel, UploadedObject,
    abort_sink, send_chunk,
};
use crate::catalog::ChunkRef;
use crate::error::{ParcelError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

#[derive(Debug, Default)]
struct MemoryInner {
    /// channel id -> object name -> chunk refs in order
    objects: HashMap<String, HashMap<String, Vec<ChunkRef>>>,
    chunks: HashMap<ChunkRef, Bytes>,
}

/// Keeps chunks in process memory. Useful for tests and throwaway setups.
#[derive(Debug)]
pub struct MemoryChunkBackend {
    chunk_size: usize,
    inner: RwLock<MemoryInner>,
}

impl MemoryChunkBackend {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            inner: RwLock::new(MemoryInner::default()),
        }
    }

    /// Number of chunks currently held across all channels.
    pub async fn chunk_count(&self) -> usize {
        self.inner.read().await.chunks.len()
    }
}

#[async_trait]
impl ChunkBackend for MemoryChunkBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn upload(
        &self,
        stream: ByteStream,
        name: &str,
        channel: &StorageChannel,
    ) -> Result<UploadedObject> {
        let mut splitter = ChunkSplitter::new(stream, self.chunk_size)?;
        let mut staged = Vec::new();
        while let Some(chunk) = splitter.next_chunk().await? {
            let chunk_ref = ChunkRef::new(format!("mem:{}:{}", channel.id(), Ulid::new()));
            staged.push((chunk_ref, chunk));
        }

        let chunk_refs: Vec<ChunkRef> = staged.iter().map(|(r, _)| r.clone()).collect();

        let mut inner = self.inner.write().await;
        let previous = inner
            .objects
            .entry(channel.id().to_string())
            .or_default()
            .insert(name.to_string(), chunk_refs.clone());
        if let Some(previous) = previous {
            for chunk_ref in previous {
                inner.chunks.remove(&chunk_ref);
            }
        }
        inner.chunks.extend(staged);

        Ok(UploadedObject {
            chunk_refs,
            name: name.to_string(),
            size: splitter.total_bytes(),
        })
    }

    async fn download(&self, sink: ChunkSink, chunk_refs: &[ChunkRef], name: &str) -> Result<()> {
        for chunk_ref in chunk_refs {
            let data = self.inner.read().await.chunks.get(chunk_ref).cloned();
            let Some(data) = data else {
                let error = ParcelError::Backend(format!(
                    "chunk {} of {} is missing",
                    chunk_ref, name
                ));
                return Err(abort_sink(&sink, error).await);
            };
            send_chunk(&sink, data).await?;
        }
        Ok(())
    }

    async fn remove(&self, name: &str, channel: &StorageChannel) -> Result<()> {
        let mut inner = self.inner.write().await;
        let removed = inner
            .objects
            .get_mut(channel.id())
            .and_then(|objects| objects.remove(name))
            .ok_or_else(|| ParcelError::NotFound(name.to_string()))?;

        for chunk_ref in removed {
            inner.chunks.remove(&chunk_ref);
        }
        Ok(())
    }
}
