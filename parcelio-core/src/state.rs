use crate::catalog::Catalog;
use crate::locks::{LockKind, LockRegistry};
use std::sync::{Arc, Mutex, MutexGuard};

/// Catalog and lock sets behind one mutex.
///
/// Every check-then-mutate step runs inside a single `with` call. The mutex
/// must never be held across an `.await`.
#[derive(Debug, Default)]
pub struct GatewayState {
    inner: Mutex<StateInner>,
}

#[derive(Debug, Default)]
pub struct StateInner {
    pub catalog: Catalog,
    pub locks: LockRegistry,
}

impl GatewayState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, StateInner> {
        // A panic inside a critical section leaves no half-applied step
        // behind, since each step is a plain map/set mutation.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut StateInner) -> R) -> R {
        let mut inner = self.lock();
        f(&mut inner)
    }
}

/// Scoped membership in one lock set.
///
/// Dropping the guard removes the name, on success, on error, on panic
/// unwind and when the owning future is dropped mid-flight.
#[derive(Debug)]
pub struct LockGuard {
    state: Arc<GatewayState>,
    kind: LockKind,
    name: String,
}

impl LockGuard {
    /// Inserts `name` into the `kind` set. The caller must already hold the
    /// state mutex via `inner` so the check and the insert are one step.
    pub fn acquire(
        state: &Arc<GatewayState>,
        inner: &mut StateInner,
        kind: LockKind,
        name: impl Into<String>,
    ) -> Self {
        let name = name.into();
        inner.locks.insert(kind, name.clone());
        tracing::debug!(name = %name, kind = kind.as_str(), "lock acquired");
        Self {
            state: state.clone(),
            kind,
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> LockKind {
        self.kind
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.state.with(|inner| inner.locks.remove(self.kind, &self.name));
        tracing::debug!(name = %self.name, kind = self.kind.as_str(), "lock released");
    }
}
