use super::{ChunkBackend, DEFAULT_CHUNK_SIZE, FsChunkBackend, MemoryChunkBackend};
use crate::{ParcelError, Result};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct BackendBuilder {
    kind: Option<String>,
    root: Option<PathBuf>,
    chunk_size: Option<usize>,
}

impl BackendBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    fn resolve_kind(&self) -> Result<String> {
        let kind = self
            .kind
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if kind.is_empty() {
            return Err(ParcelError::Config(
                "storage backend kind cannot be empty".to_string(),
            ));
        }

        Ok(kind)
    }

    fn resolve_chunk_size(&self) -> Result<usize> {
        let chunk_size = self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(ParcelError::Config(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        Ok(chunk_size)
    }

    pub fn build(&self) -> Result<Arc<dyn ChunkBackend>> {
        let kind = self.resolve_kind()?;
        let chunk_size = self.resolve_chunk_size()?;

        match kind.as_str() {
            "memory" => Ok(Arc::new(MemoryChunkBackend::new(chunk_size))),
            "fs" => {
                let root = self.root.clone().ok_or_else(|| {
                    ParcelError::Config("root is required for fs backend".to_string())
                })?;

                if root.as_os_str().is_empty() {
                    return Err(ParcelError::Config(
                        "root cannot be empty for fs backend".to_string(),
                    ));
                }

                Ok(Arc::new(FsChunkBackend::new(root, chunk_size)?))
            }
            other => Err(ParcelError::Config(format!(
                "unsupported storage backend: {}",
                other
            ))),
        }
    }
}
