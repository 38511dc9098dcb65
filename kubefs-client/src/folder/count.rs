use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

use super::deps::Deps;
use super::lifecycle::Lifecycle;
use crate::error::Result;
use crate::kind::ResourceKind;

const FRESH_FOR: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct CountState {
    value: Option<usize>,
    refreshed: Option<Instant>,
    pending: bool,
}

/// Number of objects of a kind, computed in the background.
///
/// Reading never blocks: [`LazyCount::peek`] returns the last known value and
/// schedules a refresh when it is missing or stale. Whenever a refresh
/// changes the value the owning folder is marked dirty, so its next read
/// shows (or hides) the row accordingly.
pub struct LazyCount {
    deps: Arc<Deps>,
    kind: ResourceKind,
    namespace: Option<String>,
    parent: Weak<Lifecycle>,
    fresh_for: Duration,
    state: Mutex<CountState>,
}

impl LazyCount {
    pub fn new(
        deps: Arc<Deps>,
        kind: ResourceKind,
        namespace: Option<String>,
        parent: Weak<Lifecycle>,
    ) -> Arc<Self> {
        Arc::new(Self {
            deps,
            kind,
            namespace,
            parent,
            fresh_for: FRESH_FOR,
            state: Mutex::new(CountState::default()),
        })
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    /// Last known count; schedules a refresh when there is none or it aged out.
    pub fn peek(self: &Arc<Self>) -> Option<usize> {
        let (value, stale) = {
            let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let stale = !state.pending
                && state
                    .refreshed
                    .map_or(true, |at| at.elapsed() >= self.fresh_for);
            (state.value, stale)
        };
        if stale {
            self.spawn_refresh();
        }
        value
    }

    /// Known to be zero. Unknown counts are not empty.
    pub fn is_known_empty(self: &Arc<Self>) -> bool {
        self.peek() == Some(0)
    }

    /// Existence check first; only non-empty kinds get a full count.
    pub async fn compute(&self) -> Result<usize> {
        let ns = self.namespace.as_deref();
        if !self.deps.guard(self.deps.cluster.has_any(&self.kind, ns)).await? {
            return Ok(0);
        }
        self.deps.guard(self.deps.cluster.count(&self.kind, ns)).await
    }

    /// Computes now and records the result.
    pub async fn refresh(&self) -> Result<usize> {
        let result = self.compute().await;
        self.record(&result);
        result
    }

    fn spawn_refresh(self: &Arc<Self>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.pending {
                return;
            }
            state.pending = true;
        }
        let this = Arc::clone(self);
        handle.spawn(async move {
            // errors are recorded in the state
            let _ = this.refresh().await;
        });
    }

    fn record(&self, result: &Result<usize>) {
        let changed = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.pending = false;
            state.refreshed = Some(Instant::now());
            match result {
                Ok(n) => state.value.replace(*n) != Some(*n),
                Err(e) => {
                    tracing::debug!(kind = %self.kind.key(), error = %e, "count failed");
                    false
                }
            }
        };
        if changed {
            if let Some(parent) = self.parent.upgrade() {
                parent.mark_dirty();
            }
        }
    }
}

impl std::fmt::Debug for LazyCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("LazyCount")
            .field("kind", &self.kind.key())
            .field("namespace", &self.namespace)
            .field("value", &state.value)
            .finish()
    }
}
