use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque handle to one chunk held by a storage backend.
///
/// Only the backend that issued a handle knows how to interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkRef(String);

impl ChunkRef {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata for one stored object.
///
/// Records are immutable once inserted; replacing an object means deleting
/// the record and inserting a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRecord {
    /// Chunk handles in reassembly order.
    pub chunk_refs: Vec<ChunkRef>,
    pub size: u64,
    pub chunk_count: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl ObjectRecord {
    pub fn new(chunk_refs: Vec<ChunkRef>, size: u64) -> Self {
        let chunk_count = chunk_refs.len();
        Self {
            chunk_refs,
            size,
            chunk_count,
            created_at: chrono::Utc::now(),
        }
    }
}

/// Running totals across every record in the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateMeta {
    pub total_size: u64,
    pub total_chunks: u64,
}

/// Name to record mapping plus aggregate accounting.
///
/// The catalog performs no compare-and-set of its own. Callers exclude
/// racing inserts and removals through the lock registry.
#[derive(Debug, Default)]
pub struct Catalog {
    records: BTreeMap<String, ObjectRecord>,
    meta: AggregateMeta,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<&ObjectRecord> {
        self.records.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// Returns the record previously stored under the name, if any.
    pub fn insert(&mut self, name: impl Into<String>, record: ObjectRecord) -> Option<ObjectRecord> {
        self.records.insert(name.into(), record)
    }

    pub fn remove(&mut self, name: &str) -> Option<ObjectRecord> {
        self.records.remove(name)
    }

    pub fn meta(&self) -> AggregateMeta {
        self.meta
    }

    pub fn add_to_meta(&mut self, size: u64, chunks: usize) {
        self.meta.total_size = self.meta.total_size.saturating_add(size);
        self.meta.total_chunks = self.meta.total_chunks.saturating_add(chunks as u64);
    }

    /// Totals never go negative, even if an earlier partial failure left
    /// them below the sum of the remaining records.
    pub fn subtract_from_meta(&mut self, size: u64, chunks: usize) {
        self.meta.total_size = self.meta.total_size.saturating_sub(size);
        self.meta.total_chunks = self.meta.total_chunks.saturating_sub(chunks as u64);
    }

    /// Entries in name order.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &ObjectRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
