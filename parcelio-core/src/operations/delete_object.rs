use crate::{ChunkBackend, GatewayState, LockGuard, LockKind, Result, StorageChannel};
use std::sync::Arc;

#[derive(Clone)]
pub struct DeleteObjectOperation {
    state: Arc<GatewayState>,
    backend: Arc<dyn ChunkBackend>,
}

#[derive(Debug, Clone)]
pub struct DeleteObjectOperationRequest {
    pub name: String,
    pub channel: StorageChannel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteObjectOperationResult {
    pub name: String,
    pub size: u64,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteObjectOperationOutcome {
    Deleted(DeleteObjectOperationResult),
    NotFound,
    /// Another upload, download or delete holds the name.
    Conflict,
}

impl DeleteObjectOperation {
    pub fn new(state: Arc<GatewayState>, backend: Arc<dyn ChunkBackend>) -> Self {
        Self { state, backend }
    }

    pub async fn run(
        &self,
        request: DeleteObjectOperationRequest,
    ) -> Result<DeleteObjectOperationOutcome> {
        let DeleteObjectOperationRequest { name, channel } = request;

        let accepted = self.state.with(|inner| {
            // Lock sets first: a name mid-upload has no record yet but must
            // still report a conflict.
            if inner.locks.is_busy(&name) {
                return Err(DeleteObjectOperationOutcome::Conflict);
            }
            let Some(record) = inner.catalog.lookup(&name) else {
                return Err(DeleteObjectOperationOutcome::NotFound);
            };
            let record = record.clone();
            let guard = LockGuard::acquire(&self.state, inner, LockKind::Delete, name.clone());
            Ok((record, guard))
        });

        let (record, _guard) = match accepted {
            Ok(accepted) => accepted,
            Err(rejected) => {
                tracing::warn!(name = %name, outcome = ?rejected, "delete rejected");
                return Ok(rejected);
            }
        };

        if let Err(error) = self.backend.remove(&name, &channel).await {
            tracing::error!(
                name = %name,
                backend = self.backend.kind(),
                error = %error,
                "delete failed"
            );
            return Err(error);
        }

        // The remote chunks are gone from here on. A crash before this
        // block runs leaves the record and totals stale until restart.
        self.state.with(|inner| {
            inner
                .catalog
                .subtract_from_meta(record.size, record.chunk_count);
            inner.catalog.remove(&name);
        });

        tracing::info!(
            name = %name,
            size = record.size,
            chunks = record.chunk_count,
            "delete committed"
        );

        Ok(DeleteObjectOperationOutcome::Deleted(
            DeleteObjectOperationResult {
                name,
                size: record.size,
                chunk_count: record.chunk_count,
            },
        ))
    }
}
