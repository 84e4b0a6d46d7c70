use crate::{
    ByteStream, ChunkBackend, GatewayState, LockGuard, LockKind, ObjectRecord, Result,
    StorageChannel,
};
use std::sync::Arc;

/// Replace every whitespace character with `_`.
pub fn normalize_name(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

#[derive(Clone)]
pub struct UploadObjectOperation {
    state: Arc<GatewayState>,
    backend: Arc<dyn ChunkBackend>,
}

pub struct UploadObjectOperationRequest {
    /// Name as requested, before normalization.
    pub name: String,
    pub body: ByteStream,
    pub channel: StorageChannel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadObjectOperationResult {
    /// Name the record was committed under, as resolved by the backend.
    pub name: String,
    pub size: u64,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadObjectOperationOutcome {
    Committed(UploadObjectOperationResult),
    /// The normalized name is already stored or already being uploaded.
    Conflict { name: String },
}

impl UploadObjectOperation {
    pub fn new(state: Arc<GatewayState>, backend: Arc<dyn ChunkBackend>) -> Self {
        Self { state, backend }
    }

    pub async fn run(
        &self,
        request: UploadObjectOperationRequest,
    ) -> Result<UploadObjectOperationOutcome> {
        let UploadObjectOperationRequest {
            name,
            body,
            channel,
        } = request;

        let name = normalize_name(&name);

        let guard = self.state.with(|inner| {
            if inner.catalog.contains(&name) || inner.locks.contains(LockKind::Upload, &name) {
                return None;
            }
            Some(LockGuard::acquire(&self.state, inner, LockKind::Upload, name.clone()))
        });

        let Some(_guard) = guard else {
            tracing::warn!(name = %name, "upload rejected: name exists or is being uploaded");
            return Ok(UploadObjectOperationOutcome::Conflict { name });
        };

        let uploaded = match self.backend.upload(body, &name, &channel).await {
            Ok(uploaded) => uploaded,
            Err(error) => {
                tracing::error!(
                    name = %name,
                    backend = self.backend.kind(),
                    error = %error,
                    "upload failed"
                );
                return Err(error);
            }
        };

        let record = ObjectRecord::new(uploaded.chunk_refs, uploaded.size);
        let result = UploadObjectOperationResult {
            name: uploaded.name,
            size: record.size,
            chunk_count: record.chunk_count,
        };

        self.state.with(|inner| {
            let replaced = inner.catalog.insert(result.name.clone(), record);
            // Only reachable when the backend resolves to a different name
            // that is already stored; keep the totals equal to the sums.
            if let Some(replaced) = replaced {
                tracing::warn!(name = %result.name, "upload replaced an existing record");
                inner
                    .catalog
                    .subtract_from_meta(replaced.size, replaced.chunk_count);
            }
            inner.catalog.add_to_meta(result.size, result.chunk_count);
        });

        tracing::info!(
            name = %result.name,
            size = result.size,
            chunks = result.chunk_count,
            "upload committed"
        );

        Ok(UploadObjectOperationOutcome::Committed(result))
    }
}
