use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKind {
    Upload,
    Download,
    Delete,
}

impl LockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Delete => "delete",
        }
    }
}

/// Names currently mid-flight, one set per operation kind.
///
/// Membership is transient and carries no timeout. A name leaves a set only
/// through the owning operation's release path (see `LockGuard`). Each set
/// counts holders, so overlapping downloads of one name keep it registered
/// until the last of them finishes.
#[derive(Debug, Default)]
pub struct LockRegistry {
    uploading: HashMap<String, usize>,
    downloading: HashMap<String, usize>,
    deleting: HashMap<String, usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LockCounts {
    pub uploading: usize,
    pub downloading: usize,
    pub deleting: usize,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, kind: LockKind) -> &HashMap<String, usize> {
        match kind {
            LockKind::Upload => &self.uploading,
            LockKind::Download => &self.downloading,
            LockKind::Delete => &self.deleting,
        }
    }

    fn set_mut(&mut self, kind: LockKind) -> &mut HashMap<String, usize> {
        match kind {
            LockKind::Upload => &mut self.uploading,
            LockKind::Download => &mut self.downloading,
            LockKind::Delete => &mut self.deleting,
        }
    }

    pub fn contains(&self, kind: LockKind, name: &str) -> bool {
        self.set(kind).contains_key(name)
    }

    /// Returns false if the name was already present.
    pub fn insert(&mut self, kind: LockKind, name: impl Into<String>) -> bool {
        let holders = self.set_mut(kind).entry(name.into()).or_insert(0);
        *holders += 1;
        *holders == 1
    }

    /// Drops one holder. Returns true once the name has left the set.
    pub fn remove(&mut self, kind: LockKind, name: &str) -> bool {
        let set = self.set_mut(kind);
        let Some(holders) = set.get_mut(name) else {
            return false;
        };
        if *holders > 1 {
            *holders -= 1;
            return false;
        }
        set.remove(name);
        true
    }

    /// True if any operation of any kind holds the name.
    pub fn is_busy(&self, name: &str) -> bool {
        self.uploading.contains_key(name)
            || self.downloading.contains_key(name)
            || self.deleting.contains_key(name)
    }

    pub fn counts(&self) -> LockCounts {
        LockCounts {
            uploading: self.uploading.len(),
            downloading: self.downloading.len(),
            deleting: self.deleting.len(),
        }
    }
}
