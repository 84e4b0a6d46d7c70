use super::{
    ByteStream, ChunkBackend, ChunkSink, ChunkSplitter, StorageChannel, UploadedObject,
    abort_sink, compute_hash, send_chunk, verify_hash,
};
use crate::catalog::ChunkRef;
use crate::error::{ParcelError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use ulid::Ulid;

/// Stores chunks as files under a root directory.
///
/// Layout: `{root}/{channel}/objects/{sha256(name)}/{index:08}.{sha256(chunk)}`.
/// The chunk ref is the path relative to `root`, so downloads need no
/// channel handle.
pub struct FsChunkBackend {
    root: PathBuf,
    chunk_size: usize,
}

impl FsChunkBackend {
    pub fn new(root: PathBuf, chunk_size: usize) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, chunk_size })
    }

    fn object_key(name: &str) -> String {
        compute_hash(name.as_bytes())
    }

    fn object_dir(&self, channel: &StorageChannel, name: &str) -> Result<PathBuf> {
        let channel_dir = Self::relative_path(channel.id())?;
        Ok(self
            .root
            .join(channel_dir)
            .join("objects")
            .join(Self::object_key(name)))
    }

    /// Reject anything that could escape the root directory.
    fn relative_path(value: &str) -> Result<PathBuf> {
        let path = Path::new(value);
        if value.is_empty() || !path.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(ParcelError::InvalidRequest(format!(
                "invalid storage path: {}",
                value
            )));
        }
        Ok(path.to_path_buf())
    }

    fn chunk_path(&self, chunk_ref: &ChunkRef) -> Result<PathBuf> {
        Ok(self.root.join(Self::relative_path(chunk_ref.as_str())?))
    }

    /// The content hash is the suffix after the index.
    fn expected_hash(chunk_ref: &ChunkRef) -> Option<&str> {
        chunk_ref
            .as_str()
            .rsplit('/')
            .next()
            .and_then(|file| file.split_once('.'))
            .map(|(_, hash)| hash)
    }

    async fn write_chunk(&self, dir: &Path, index: usize, data: &Bytes) -> Result<String> {
        let chunk_id = compute_hash(data);
        let file_name = format!("{:08}.{}", index, chunk_id);
        let chunk_path = dir.join(&file_name);

        // Write to temporary file first, then rename for atomicity
        let temp_path = dir.join(format!("{}.tmp", Ulid::new()));
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &chunk_path).await?;

        tracing::debug!(chunk = %chunk_id, index, dir = ?dir, "stored chunk");
        Ok(file_name)
    }
}

#[async_trait]
impl ChunkBackend for FsChunkBackend {
    fn kind(&self) -> &'static str {
        "fs"
    }

    async fn upload(
        &self,
        stream: ByteStream,
        name: &str,
        channel: &StorageChannel,
    ) -> Result<UploadedObject> {
        let object_dir = self.object_dir(channel, name)?;
        if fs::try_exists(&object_dir).await? {
            fs::remove_dir_all(&object_dir).await?;
        }
        fs::create_dir_all(&object_dir).await?;

        let prefix = format!("{}/objects/{}", channel.id(), Self::object_key(name));
        let mut splitter = ChunkSplitter::new(stream, self.chunk_size)?;
        let mut chunk_refs = Vec::new();
        let mut index = 0usize;

        loop {
            let chunk = match splitter.next_chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(error) => {
                    let _ = fs::remove_dir_all(&object_dir).await;
                    return Err(error);
                }
            };

            match self.write_chunk(&object_dir, index, &chunk).await {
                Ok(file_name) => {
                    chunk_refs.push(ChunkRef::new(format!("{}/{}", prefix, file_name)));
                }
                Err(error) => {
                    let _ = fs::remove_dir_all(&object_dir).await;
                    return Err(error);
                }
            }
            index += 1;
        }

        Ok(UploadedObject {
            chunk_refs,
            name: name.to_string(),
            size: splitter.total_bytes(),
        })
    }

    async fn download(&self, sink: ChunkSink, chunk_refs: &[ChunkRef], name: &str) -> Result<()> {
        for chunk_ref in chunk_refs {
            let data = match self.read_chunk(chunk_ref).await {
                Ok(data) => data,
                Err(error) => {
                    tracing::warn!(name, chunk = %chunk_ref, error = %error, "failed to read chunk");
                    return Err(abort_sink(&sink, error).await);
                }
            };
            send_chunk(&sink, data).await?;
        }
        Ok(())
    }

    async fn remove(&self, name: &str, channel: &StorageChannel) -> Result<()> {
        let object_dir = self.object_dir(channel, name)?;
        if !fs::try_exists(&object_dir).await? {
            return Err(ParcelError::NotFound(name.to_string()));
        }
        fs::remove_dir_all(&object_dir).await?;
        Ok(())
    }
}

impl FsChunkBackend {
    async fn read_chunk(&self, chunk_ref: &ChunkRef) -> Result<Bytes> {
        let path = self.chunk_path(chunk_ref)?;
        let data = fs::read(&path).await?;
        if let Some(expected) = Self::expected_hash(chunk_ref) {
            verify_hash(&data, expected)?;
        }
        Ok(Bytes::from(data))
    }
}
