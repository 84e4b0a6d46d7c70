use crate::operations::{
    DeleteObjectOperation, DeleteObjectOperationOutcome, DeleteObjectOperationRequest,
    DownloadObjectOperation, DownloadObjectOperationOutcome, DownloadObjectOperationRequest,
    UploadObjectOperation, UploadObjectOperationOutcome, UploadObjectOperationRequest,
};
use crate::{
    AggregateMeta, ByteStream, ChunkBackend, ChunkRef, ChunkSink, GatewayState, LockCounts,
    ObjectRecord, Result, StorageChannel,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Point-in-time copy of the whole catalog.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogSnapshot {
    pub data: BTreeMap<String, ObjectRecord>,
    pub meta: AggregateMeta,
}

/// What a client needs to fetch an object's chunks directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDescriptor {
    pub file_name: String,
    pub files: Vec<ChunkRef>,
}

/// Entry point for every object lifecycle operation.
///
/// Each coordinator owns its own catalog and lock sets, so independent
/// instances never observe each other.
#[derive(Clone)]
pub struct Coordinator {
    state: Arc<GatewayState>,
    backend: Arc<dyn ChunkBackend>,
    upload: UploadObjectOperation,
    download: DownloadObjectOperation,
    delete: DeleteObjectOperation,
}

impl Coordinator {
    pub fn new(backend: Arc<dyn ChunkBackend>) -> Self {
        Self::with_state(GatewayState::new(), backend)
    }

    pub fn with_state(state: Arc<GatewayState>, backend: Arc<dyn ChunkBackend>) -> Self {
        Self {
            upload: UploadObjectOperation::new(state.clone(), backend.clone()),
            download: DownloadObjectOperation::new(state.clone(), backend.clone()),
            delete: DeleteObjectOperation::new(state.clone(), backend.clone()),
            state,
            backend,
        }
    }

    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    pub async fn upload(
        &self,
        name: &str,
        body: ByteStream,
        channel: &StorageChannel,
    ) -> Result<UploadObjectOperationOutcome> {
        self.upload
            .run(UploadObjectOperationRequest {
                name: name.to_string(),
                body,
                channel: channel.clone(),
            })
            .await
    }

    /// Accept a download without streaming it yet, so the caller can commit
    /// response headers first.
    pub fn begin_download(&self, name: &str) -> DownloadObjectOperationOutcome {
        self.download.run(DownloadObjectOperationRequest {
            name: name.to_string(),
        })
    }

    /// Accept and stream in one step. Returns `None` if the name is absent.
    pub async fn download(&self, name: &str, sink: ChunkSink) -> Result<Option<ObjectRecord>> {
        match self.begin_download(name) {
            DownloadObjectOperationOutcome::Ready(download) => {
                let record = download.record().clone();
                download.stream_to(sink).await?;
                Ok(Some(record))
            }
            DownloadObjectOperationOutcome::NotFound => Ok(None),
        }
    }

    pub async fn delete(
        &self,
        name: &str,
        channel: &StorageChannel,
    ) -> Result<DeleteObjectOperationOutcome> {
        self.delete
            .run(DeleteObjectOperationRequest {
                name: name.to_string(),
                channel: channel.clone(),
            })
            .await
    }

    pub fn lookup(&self, name: &str) -> Option<ObjectRecord> {
        self.state
            .with(|inner| inner.catalog.lookup(name).cloned())
    }

    pub fn meta(&self) -> AggregateMeta {
        self.state.with(|inner| inner.catalog.meta())
    }

    pub fn len(&self) -> usize {
        self.state.with(|inner| inner.catalog.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> CatalogSnapshot {
        self.state.with(|inner| CatalogSnapshot {
            data: inner
                .catalog
                .entries()
                .map(|(name, record)| (name.clone(), record.clone()))
                .collect(),
            meta: inner.catalog.meta(),
        })
    }

    pub fn chunk_descriptor(&self, name: &str) -> Option<ChunkDescriptor> {
        self.lookup(name).map(|record| ChunkDescriptor {
            file_name: name.to_string(),
            files: record.chunk_refs,
        })
    }

    pub fn lock_counts(&self) -> LockCounts {
        self.state.with(|inner| inner.locks.counts())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::UploadObjectOperationResult;
    use crate::{MemoryChunkBackend, ParcelError};
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::StreamExt;
    use futures_util::stream;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::{Notify, Semaphore};

    /// Memory backend whose calls can be held open and made to fail.
    struct GatedBackend {
        inner: MemoryChunkBackend,
        gate: Semaphore,
        entered: Notify,
        upload_calls: AtomicUsize,
        fail_uploads: AtomicBool,
        fail_removes: AtomicBool,
    }

    impl GatedBackend {
        fn open(chunk_size: usize) -> Arc<Self> {
            Self::build(chunk_size, Semaphore::MAX_PERMITS)
        }

        fn closed(chunk_size: usize) -> Arc<Self> {
            Self::build(chunk_size, 0)
        }

        fn build(chunk_size: usize, permits: usize) -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryChunkBackend::new(chunk_size),
                gate: Semaphore::new(permits),
                entered: Notify::new(),
                upload_calls: AtomicUsize::new(0),
                fail_uploads: AtomicBool::new(false),
                fail_removes: AtomicBool::new(false),
            })
        }

        async fn pass(&self) {
            self.entered.notify_one();
            let permit = self.gate.acquire().await.unwrap();
            permit.forget();
        }

        fn release(&self, calls: usize) {
            self.gate.add_permits(calls);
        }
    }

    #[async_trait]
    impl ChunkBackend for GatedBackend {
        fn kind(&self) -> &'static str {
            "gated"
        }

        async fn upload(
            &self,
            stream: ByteStream,
            name: &str,
            channel: &StorageChannel,
        ) -> Result<crate::UploadedObject> {
            self.upload_calls.fetch_add(1, Ordering::SeqCst);
            self.pass().await;
            if self.fail_uploads.load(Ordering::SeqCst) {
                return Err(ParcelError::Backend("channel rejected upload".to_string()));
            }
            self.inner.upload(stream, name, channel).await
        }

        async fn download(
            &self,
            sink: ChunkSink,
            chunk_refs: &[ChunkRef],
            name: &str,
        ) -> Result<()> {
            self.pass().await;
            self.inner.download(sink, chunk_refs, name).await
        }

        async fn remove(&self, name: &str, channel: &StorageChannel) -> Result<()> {
            self.pass().await;
            if self.fail_removes.load(Ordering::SeqCst) {
                return Err(ParcelError::Backend("channel rejected delete".to_string()));
            }
            self.inner.remove(name, channel).await
        }
    }

    fn channel() -> StorageChannel {
        StorageChannel::new("test")
    }

    fn body(len: usize) -> ByteStream {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        stream::iter(vec![Ok(Bytes::from(data))]).boxed()
    }

    fn committed(outcome: UploadObjectOperationOutcome) -> UploadObjectOperationResult {
        match outcome {
            UploadObjectOperationOutcome::Committed(result) => result,
            other => panic!("expected commit, got {:?}", other),
        }
    }

    fn assert_meta_matches_records(coordinator: &Coordinator) {
        let snapshot = coordinator.snapshot();
        let size: u64 = snapshot.data.values().map(|r| r.size).sum();
        let chunks: u64 = snapshot.data.values().map(|r| r.chunk_count as u64).sum();
        assert_eq!(snapshot.meta.total_size, size);
        assert_eq!(snapshot.meta.total_chunks, chunks);
    }

    async fn collect(coordinator: &Coordinator, name: &str) -> Option<Vec<u8>> {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<std::io::Result<Bytes>>(4);
        let reader = async {
            let mut out = Vec::new();
            while let Some(item) = rx.recv().await {
                out.extend_from_slice(&item.unwrap());
            }
            out
        };
        let (found, out) = tokio::join!(coordinator.download(name, tx), reader);
        found.unwrap().map(|_| out)
    }

    #[tokio::test]
    async fn test_upload_normalizes_and_accounts() {
        let coordinator = Coordinator::new(Arc::new(MemoryChunkBackend::new(410)));

        let result = committed(
            coordinator
                .upload("report 1.pdf", body(4096), &channel())
                .await
                .unwrap(),
        );
        assert_eq!(result.name, "report_1.pdf");
        assert_eq!(result.size, 4096);
        assert_eq!(result.chunk_count, 10);

        let record = coordinator.lookup("report_1.pdf").unwrap();
        assert_eq!(record.size, 4096);
        assert_eq!(record.chunk_count, 10);
        assert!(coordinator.lookup("report 1.pdf").is_none());
        assert_eq!(
            coordinator.meta(),
            AggregateMeta {
                total_size: 4096,
                total_chunks: 10
            }
        );
        assert_eq!(coordinator.lock_counts(), LockCounts::default());
    }

    #[tokio::test]
    async fn test_delete_reverts_totals() {
        let coordinator = Coordinator::new(Arc::new(MemoryChunkBackend::new(410)));
        committed(coordinator.upload("keep", body(100), &channel()).await.unwrap());
        let before = coordinator.meta();

        committed(
            coordinator
                .upload("report 1.pdf", body(4096), &channel())
                .await
                .unwrap(),
        );
        let outcome = coordinator
            .delete("report_1.pdf", &channel())
            .await
            .unwrap();
        assert!(matches!(outcome, DeleteObjectOperationOutcome::Deleted(ref r) if r.size == 4096 && r.chunk_count == 10));

        assert!(coordinator.lookup("report_1.pdf").is_none());
        assert_eq!(coordinator.meta(), before);
        assert_meta_matches_records(&coordinator);
    }

    #[tokio::test]
    async fn test_download_returns_uploaded_bytes() {
        let coordinator = Coordinator::new(Arc::new(MemoryChunkBackend::new(64)));
        committed(coordinator.upload("blob", body(1000), &channel()).await.unwrap());

        let out = collect(&coordinator, "blob").await.unwrap();
        let expected: Vec<u8> = (0..1000).map(|i| (i % 251) as u8).collect();
        assert_eq!(out, expected);

        let DownloadObjectOperationOutcome::Ready(download) = coordinator.begin_download("blob")
        else {
            panic!("blob should be downloadable");
        };
        assert_eq!(download.content_length(), 1000);
        assert_eq!(download.record(), &coordinator.lookup("blob").unwrap());
        drop(download);
        assert_eq!(coordinator.lock_counts(), LockCounts::default());
    }

    #[tokio::test]
    async fn test_upload_conflicts_with_existing_record() {
        let backend = GatedBackend::open(16);
        let coordinator = Coordinator::new(backend.clone());
        committed(coordinator.upload("dup", body(10), &channel()).await.unwrap());

        let outcome = coordinator.upload("dup", body(20), &channel()).await.unwrap();
        assert_eq!(
            outcome,
            UploadObjectOperationOutcome::Conflict {
                name: "dup".to_string()
            }
        );
        assert_eq!(backend.upload_calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.lookup("dup").unwrap().size, 10);
        assert_eq!(coordinator.meta().total_size, 10);
    }

    #[tokio::test]
    async fn test_concurrent_uploads_of_same_name() {
        let backend = GatedBackend::closed(16);
        let coordinator = Coordinator::new(backend.clone());

        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.upload("a b", body(32), &channel()).await })
        };
        backend.entered.notified().await;

        let second = coordinator.upload("a_b", body(64), &channel()).await.unwrap();
        assert_eq!(
            second,
            UploadObjectOperationOutcome::Conflict {
                name: "a_b".to_string()
            }
        );
        assert_eq!(backend.upload_calls.load(Ordering::SeqCst), 1);
        assert!(coordinator.lookup("a_b").is_none());

        backend.release(1);
        let first = committed(first.await.unwrap().unwrap());
        assert_eq!(first.name, "a_b");
        assert_eq!(first.size, 32);

        assert_eq!(coordinator.len(), 1);
        assert_eq!(coordinator.meta().total_size, 32);
        assert_eq!(coordinator.lock_counts(), LockCounts::default());
    }

    #[tokio::test]
    async fn test_delete_conflicts_with_inflight_upload() {
        let backend = GatedBackend::closed(16);
        let coordinator = Coordinator::new(backend.clone());

        let upload = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.upload("pending", body(40), &channel()).await })
        };
        backend.entered.notified().await;
        assert_eq!(coordinator.lock_counts().uploading, 1);

        let outcome = coordinator.delete("pending", &channel()).await.unwrap();
        assert_eq!(outcome, DeleteObjectOperationOutcome::Conflict);
        assert_eq!(coordinator.lock_counts().deleting, 0);

        backend.release(1);
        committed(upload.await.unwrap().unwrap());

        backend.release(1);
        let outcome = coordinator.delete("pending", &channel()).await.unwrap();
        assert!(matches!(outcome, DeleteObjectOperationOutcome::Deleted(_)));
        assert!(coordinator.is_empty());
        assert_eq!(coordinator.meta(), AggregateMeta::default());
    }

    #[tokio::test]
    async fn test_delete_conflicts_with_inflight_download() {
        let backend = GatedBackend::open(16);
        let coordinator = Coordinator::new(backend.clone());
        committed(coordinator.upload("movie", body(48), &channel()).await.unwrap());
        let before = coordinator.meta();

        let DownloadObjectOperationOutcome::Ready(download) = coordinator.begin_download("movie")
        else {
            panic!("movie should be downloadable");
        };

        let outcome = coordinator.delete("movie", &channel()).await.unwrap();
        assert_eq!(outcome, DeleteObjectOperationOutcome::Conflict);
        assert!(coordinator.lookup("movie").is_some());
        assert_eq!(coordinator.meta(), before);

        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        download.stream_to(tx).await.unwrap();
        let mut received = 0;
        while let Some(item) = rx.recv().await {
            received += item.unwrap().len();
        }
        assert_eq!(received, 48);

        let outcome = coordinator.delete("movie", &channel()).await.unwrap();
        assert!(matches!(outcome, DeleteObjectOperationOutcome::Deleted(_)));
    }

    #[tokio::test]
    async fn test_overlapping_downloads_keep_name_locked() {
        let coordinator = Coordinator::new(Arc::new(MemoryChunkBackend::new(16)));
        committed(coordinator.upload("shared", body(8), &channel()).await.unwrap());

        let first = coordinator.begin_download("shared");
        let second = coordinator.begin_download("shared");
        drop(first);

        let outcome = coordinator.delete("shared", &channel()).await.unwrap();
        assert_eq!(outcome, DeleteObjectOperationOutcome::Conflict);

        drop(second);
        let outcome = coordinator.delete("shared", &channel()).await.unwrap();
        assert!(matches!(outcome, DeleteObjectOperationOutcome::Deleted(_)));
    }

    #[tokio::test]
    async fn test_delete_conflicts_with_inflight_delete() {
        let backend = GatedBackend::closed(16);
        let coordinator = Coordinator::new(backend.clone());
        backend.release(1);
        committed(coordinator.upload("twice", body(16), &channel()).await.unwrap());
        backend.entered.notified().await;

        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.delete("twice", &channel()).await })
        };
        backend.entered.notified().await;

        let second = coordinator.delete("twice", &channel()).await.unwrap();
        assert_eq!(second, DeleteObjectOperationOutcome::Conflict);
        assert!(coordinator.lookup("twice").is_some());

        backend.release(1);
        let first = first.await.unwrap().unwrap();
        assert!(matches!(first, DeleteObjectOperationOutcome::Deleted(_)));
        assert_eq!(coordinator.lock_counts(), LockCounts::default());
    }

    #[tokio::test]
    async fn test_delete_and_download_of_missing_name() {
        let coordinator = Coordinator::new(Arc::new(MemoryChunkBackend::new(16)));
        committed(coordinator.upload("present", body(5), &channel()).await.unwrap());
        let before = coordinator.meta();

        let outcome = coordinator.delete("missing.bin", &channel()).await.unwrap();
        assert_eq!(outcome, DeleteObjectOperationOutcome::NotFound);

        assert!(matches!(
            coordinator.begin_download("missing.bin"),
            DownloadObjectOperationOutcome::NotFound
        ));
        assert!(collect(&coordinator, "missing.bin").await.is_none());

        assert_eq!(coordinator.meta(), before);
        assert_eq!(coordinator.len(), 1);
        assert_eq!(coordinator.lock_counts(), LockCounts::default());
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_no_trace() {
        let backend = GatedBackend::open(16);
        let coordinator = Coordinator::new(backend.clone());

        backend.fail_uploads.store(true, Ordering::SeqCst);
        let result = coordinator.upload("flaky", body(10), &channel()).await;
        assert!(matches!(result, Err(ParcelError::Backend(_))));
        assert!(coordinator.lookup("flaky").is_none());
        assert_eq!(coordinator.meta(), AggregateMeta::default());
        assert_eq!(coordinator.lock_counts(), LockCounts::default());

        backend.fail_uploads.store(false, Ordering::SeqCst);
        committed(coordinator.upload("flaky", body(10), &channel()).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_record() {
        let backend = GatedBackend::open(16);
        let coordinator = Coordinator::new(backend.clone());
        committed(coordinator.upload("sticky", body(33), &channel()).await.unwrap());
        let before = coordinator.meta();

        backend.fail_removes.store(true, Ordering::SeqCst);
        let result = coordinator.delete("sticky", &channel()).await;
        assert!(result.is_err());
        assert!(coordinator.lookup("sticky").is_some());
        assert_eq!(coordinator.meta(), before);
        assert_eq!(coordinator.lock_counts(), LockCounts::default());

        backend.fail_removes.store(false, Ordering::SeqCst);
        let outcome = coordinator.delete("sticky", &channel()).await.unwrap();
        assert!(matches!(outcome, DeleteObjectOperationOutcome::Deleted(_)));
    }

    #[tokio::test]
    async fn test_cancelled_upload_releases_lock() {
        let backend = GatedBackend::closed(16);
        let coordinator = Coordinator::new(backend.clone());

        let upload = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.upload("abandoned", body(8), &channel()).await })
        };
        backend.entered.notified().await;
        assert_eq!(coordinator.lock_counts().uploading, 1);

        upload.abort();
        assert!(upload.await.unwrap_err().is_cancelled());
        assert_eq!(coordinator.lock_counts(), LockCounts::default());
        assert!(coordinator.lookup("abandoned").is_none());
    }

    #[tokio::test]
    async fn test_totals_match_records_after_mixed_operations() {
        let coordinator = Coordinator::new(Arc::new(MemoryChunkBackend::new(7)));
        for (i, len) in [3usize, 70, 0, 15, 128].iter().enumerate() {
            committed(
                coordinator
                    .upload(&format!("obj {}", i), body(*len), &channel())
                    .await
                    .unwrap(),
            );
        }
        coordinator.delete("obj_1", &channel()).await.unwrap();
        coordinator.delete("obj_3", &channel()).await.unwrap();
        coordinator.delete("obj_9", &channel()).await.unwrap();

        assert_eq!(coordinator.len(), 3);
        assert_meta_matches_records(&coordinator);
        assert_eq!(coordinator.meta().total_size, 3 + 128);
    }

    #[tokio::test]
    async fn test_snapshot_and_descriptor() {
        let coordinator = Coordinator::new(Arc::new(MemoryChunkBackend::new(4)));
        committed(coordinator.upload("b", body(9), &channel()).await.unwrap());
        committed(coordinator.upload("a", body(2), &channel()).await.unwrap());

        let snapshot = coordinator.snapshot();
        let names: Vec<&String> = snapshot.data.keys().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(snapshot.meta, coordinator.meta());

        let descriptor = coordinator.chunk_descriptor("b").unwrap();
        assert_eq!(descriptor.file_name, "b");
        assert_eq!(descriptor.files, coordinator.lookup("b").unwrap().chunk_refs);
        assert_eq!(descriptor.files.len(), 3);
        assert!(coordinator.chunk_descriptor("zzz").is_none());

        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["fileName"], "b");
        assert_eq!(json["files"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_instances_are_isolated() {
        let one = Coordinator::new(Arc::new(MemoryChunkBackend::new(4)));
        let two = Coordinator::new(Arc::new(MemoryChunkBackend::new(4)));
        committed(one.upload("x", body(4), &channel()).await.unwrap());
        assert!(two.lookup("x").is_none());
        assert_eq!(two.meta(), AggregateMeta::default());
    }
}
