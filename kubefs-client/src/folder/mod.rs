//! The navigable tree.
//!
//! Every node is a [`Folder`]: a listing with a stable path that fills itself
//! on first read and refills on the next read after it was marked dirty.
//! Variants only differ in how they populate; the caching, locking and change
//! subscription live in [`LiveFolder`].

mod back;
mod containers;
mod count;
mod datakeys;
mod deps;
mod item;
mod kinds;
mod lifecycle;
mod objects;

pub use back::WithBack;
pub use containers::containers;
pub use count::LazyCount;
pub use datakeys::{config_map_keys, secret_keys};
pub use deps::{Deps, ViewFn};
pub use item::{Enter, Item, ObjectRef, Trailing, View};
pub use kinds::{namespace_kinds, root};
pub use lifecycle::{Lifecycle, Phase, Populating};
pub use objects::{objects, objects_named};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::cluster::Change;
use crate::error::Result;
use crate::kind::ResourceKind;
use crate::listview::{FlatList, ListView};
use crate::row::Column;

/// A complete, immutable listing. Folders swap whole snapshots.
#[derive(Debug, Default)]
pub struct Listing {
    pub columns: Vec<Column>,
    pub items: FlatList<Arc<Item>>,
}

impl Listing {
    pub fn new(columns: Vec<Column>, items: Vec<Arc<Item>>) -> Self {
        Self {
            columns,
            items: FlatList::new(items),
        }
    }

    pub fn empty(columns: Vec<Column>) -> Self {
        Self::new(columns, Vec::new())
    }

    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|i| i.id.clone()).collect()
    }
}

impl ListView<Arc<Item>> for Listing {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn lines(&self, offset: usize, count: usize) -> Vec<Arc<Item>> {
        self.items.lines(offset, count)
    }

    fn above(&self, id: &str, count: usize) -> Vec<Arc<Item>> {
        self.items.above(id, count)
    }

    fn below(&self, id: &str, count: usize) -> Vec<Arc<Item>> {
        self.items.below(id, count)
    }

    fn find(&self, id: &str) -> Option<Arc<Item>> {
        self.items.find(id)
    }
}

/// Where an object listing points: a kind and, optionally, one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coords {
    pub kind: String,
    pub namespace: Option<String>,
}

#[async_trait]
pub trait Folder: Send + Sync {
    fn path(&self) -> &str;

    fn context(&self) -> &str;

    /// Stable identity across sessions.
    fn key(&self) -> String {
        format!("{}:{}", self.context(), self.path())
    }

    fn coords(&self) -> Option<Coords> {
        None
    }

    fn phase(&self) -> Phase;

    fn mark_dirty(&self);

    /// Current snapshot, populating first when needed.
    async fn listing(&self) -> Arc<Listing>;

    async fn columns(&self) -> Vec<Column> {
        self.listing().await.columns.clone()
    }

    async fn len(&self) -> usize {
        self.listing().await.len()
    }

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn lines(&self, offset: usize, count: usize) -> Vec<Arc<Item>> {
        self.listing().await.lines(offset, count)
    }

    async fn above(&self, id: &str, count: usize) -> Vec<Arc<Item>> {
        self.listing().await.above(id, count)
    }

    async fn below(&self, id: &str, count: usize) -> Vec<Arc<Item>> {
        self.listing().await.below(id, count)
    }

    async fn item_by_id(&self, id: &str) -> Option<Arc<Item>> {
        self.listing().await.find(id)
    }
}

/// What a population can reach besides the folder's own source.
pub struct PopulateCtx<'a> {
    pub deps: &'a Arc<Deps>,
    pub path: &'a str,
    lifecycle: &'a Arc<Lifecycle>,
    subscription: &'a OnceLock<JoinHandle<()>>,
}

impl PopulateCtx<'_> {
    /// Handle for background work that must invalidate this folder.
    pub fn dirty_handle(&self) -> Weak<Lifecycle> {
        Arc::downgrade(self.lifecycle)
    }

    /// Marks the folder dirty on every change of `kind` (limited to
    /// `namespace` when given). Only the first call per folder subscribes.
    pub async fn subscribe(&self, kind: &ResourceKind, namespace: Option<&str>) {
        if self.subscription.get().is_some() {
            return;
        }
        let rx = self.deps.cluster.subscribe(kind).await;
        let task = tokio::spawn(follow_changes(
            rx,
            self.dirty_handle(),
            kind.key(),
            namespace.map(str::to_string),
            self.deps.cancel.clone(),
        ));
        if let Err(task) = self.subscription.set(task) {
            task.abort();
        }
    }
}

/// Only flips the phase; the next read does the work.
async fn follow_changes(
    mut rx: broadcast::Receiver<Change>,
    lifecycle: Weak<Lifecycle>,
    kind: String,
    namespace: Option<String>,
    cancel: tokio_util::sync::CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => return,
            received = rx.recv() => received,
        };
        match received {
            Ok(change) => {
                if change.kind != kind {
                    continue;
                }
                if !change.resync && namespace.is_some() && change.namespace != namespace {
                    continue;
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => return,
        }
        let Some(lifecycle) = lifecycle.upgrade() else {
            return;
        };
        lifecycle.mark_dirty();
    }
}

#[async_trait]
pub trait Populate: Send + Sync {
    async fn populate(&self, ctx: &PopulateCtx<'_>) -> Result<Listing>;
}

/// The cached folder every variant is built on.
pub struct LiveFolder {
    deps: Arc<Deps>,
    path: String,
    coords: Option<Coords>,
    source: Box<dyn Populate>,
    lifecycle: Arc<Lifecycle>,
    current: Mutex<Arc<Listing>>,
    subscription: OnceLock<JoinHandle<()>>,
    populations: AtomicUsize,
}

impl LiveFolder {
    /// Cheap: nothing is fetched until the first read.
    pub fn new(deps: Arc<Deps>, path: impl Into<String>, source: Box<dyn Populate>) -> Self {
        Self {
            deps,
            path: path.into(),
            coords: None,
            source,
            lifecycle: Arc::new(Lifecycle::new()),
            current: Mutex::new(Arc::new(Listing::default())),
            subscription: OnceLock::new(),
            populations: AtomicUsize::new(0),
        }
    }

    pub fn with_coords(mut self, coords: Coords) -> Self {
        self.coords = Some(coords);
        self
    }

    pub fn deps(&self) -> &Arc<Deps> {
        &self.deps
    }

    /// How many populations ran.
    pub fn populations(&self) -> usize {
        self.populations.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Folder for LiveFolder {
    fn path(&self) -> &str {
        &self.path
    }

    fn context(&self) -> &str {
        &self.deps.context
    }

    fn coords(&self) -> Option<Coords> {
        self.coords.clone()
    }

    fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    fn mark_dirty(&self) {
        self.lifecycle.mark_dirty();
    }

    #[tracing::instrument(skip(self), fields(path = %self.path))]
    async fn listing(&self) -> Arc<Listing> {
        let mut current = self.current.lock().await;
        if let Some(populating) = self.lifecycle.begin_populate() {
            self.populations.fetch_add(1, Ordering::Relaxed);
            let ctx = PopulateCtx {
                deps: &self.deps,
                path: &self.path,
                lifecycle: &self.lifecycle,
                subscription: &self.subscription,
            };
            // dropping `populating` without a commit puts the phase back
            match self.deps.guard(self.source.populate(&ctx)).await {
                Ok(listing) => {
                    *current = Arc::new(listing);
                    populating.commit();
                }
                Err(e) if e.is_cancelled() => tracing::debug!("populate cancelled"),
                Err(e) => tracing::warn!(error = %e, "populate failed, keeping previous listing"),
            }
        }
        current.clone()
    }
}

impl Drop for LiveFolder {
    fn drop(&mut self) {
        if let Some(task) = self.subscription.get() {
            task.abort();
        }
    }
}

/// `base/name`, without doubling the root slash.
pub fn join_path(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name)
}
