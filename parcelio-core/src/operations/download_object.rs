use crate::{ChunkBackend, ChunkSink, GatewayState, LockGuard, LockKind, ObjectRecord, Result};
use std::sync::Arc;

#[derive(Clone)]
pub struct DownloadObjectOperation {
    state: Arc<GatewayState>,
    backend: Arc<dyn ChunkBackend>,
}

#[derive(Debug, Clone)]
pub struct DownloadObjectOperationRequest {
    pub name: String,
}

pub enum DownloadObjectOperationOutcome {
    Ready(ObjectDownload),
    NotFound,
}

/// An accepted download holding its `downloading` membership.
///
/// The membership is released when `stream_to` finishes or when the value
/// is dropped without being run.
pub struct ObjectDownload {
    name: String,
    record: ObjectRecord,
    backend: Arc<dyn ChunkBackend>,
    _guard: LockGuard,
}

impl ObjectDownload {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record(&self) -> &ObjectRecord {
        &self.record
    }

    pub fn content_length(&self) -> u64 {
        self.record.size
    }

    /// Stream the chunks, in catalog order, into `sink`.
    pub async fn stream_to(self, sink: ChunkSink) -> Result<()> {
        let result = self
            .backend
            .download(sink, &self.record.chunk_refs, &self.name)
            .await;

        match &result {
            Ok(()) => tracing::info!(name = %self.name, size = self.record.size, "download finished"),
            Err(error) => tracing::error!(
                name = %self.name,
                backend = self.backend.kind(),
                error = %error,
                "download failed mid-stream"
            ),
        }

        result
    }
}

impl DownloadObjectOperation {
    pub fn new(state: Arc<GatewayState>, backend: Arc<dyn ChunkBackend>) -> Self {
        Self { state, backend }
    }

    /// Look up the record and register the download. Other operations'
    /// lock sets are not consulted.
    pub fn run(&self, request: DownloadObjectOperationRequest) -> DownloadObjectOperationOutcome {
        let DownloadObjectOperationRequest { name } = request;

        let accepted = self.state.with(|inner| {
            let record = inner.catalog.lookup(&name)?.clone();
            let guard = LockGuard::acquire(&self.state, inner, LockKind::Download, name.clone());
            Some((record, guard))
        });

        match accepted {
            Some((record, guard)) => DownloadObjectOperationOutcome::Ready(ObjectDownload {
                name,
                record,
                backend: self.backend.clone(),
                _guard: guard,
            }),
            None => {
                tracing::debug!(name = %name, "download rejected: not found");
                DownloadObjectOperationOutcome::NotFound
            }
        }
    }
}
