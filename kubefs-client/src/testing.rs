//! In-memory doubles shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::serde_json::{self, json, Value};
use kube::api::DynamicObject;
use tokio::sync::broadcast;

use crate::cluster::{Change, Cluster, ContextSource};
use crate::error::{Error, Result};
use crate::folder::{self, Deps, Folder, Item, Listing, LiveFolder, Populate, PopulateCtx};
use crate::kind::ResourceKind;
use crate::row::{Column, RowList};
use crate::structs::ViewOptions;
use crate::table::{rows_from_table, Table, TableColumnDefinition, TableOptions, TableRow};
use crate::utils::Cell;

/// A cluster held in memory. Every trait call is counted by name:
/// `resolve`, `kinds`, `list`, `get`, `list_table`, `has_any`, `count`,
/// `subscribe`.
pub struct FakeCluster {
    kinds: Vec<ResourceKind>,
    objects: Mutex<HashMap<String, Vec<DynamicObject>>>,
    tables: AtomicBool,
    calls: Mutex<HashMap<String, usize>>,
    failing: Mutex<HashSet<String>>,
    changes: broadcast::Sender<Change>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        let (changes, _) = broadcast::channel(64);
        Arc::new(Self {
            kinds: vec![
                ResourceKind::from_parts("", "v1", "Pod", true),
                ResourceKind::from_parts("", "v1", "ConfigMap", true),
                ResourceKind::from_parts("", "v1", "Secret", true),
                ResourceKind::from_parts("apps", "v1", "Deployment", true),
                ResourceKind::from_parts("", "v1", "Namespace", false),
                ResourceKind::from_parts("", "v1", "Node", false),
            ],
            objects: Mutex::new(HashMap::new()),
            tables: AtomicBool::new(true),
            calls: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            changes,
        })
    }

    /// Appends to what is already stored for `kind`.
    pub fn add_objects(&self, kind: &str, objects: Vec<DynamicObject>) {
        self.objects
            .lock()
            .unwrap()
            .entry(kind.to_lowercase())
            .or_default()
            .extend(objects);
    }

    /// Off makes `list_table_by_kind` answer `Ok(None)`.
    pub fn set_tables(&self, on: bool) {
        self.tables.store(on, Ordering::SeqCst);
    }

    pub fn calls(&self, call: &str) -> usize {
        self.calls.lock().unwrap().get(call).copied().unwrap_or(0)
    }

    /// The next `call` fails with a request error.
    pub fn fail_next(&self, call: &str) {
        self.failing.lock().unwrap().insert(call.to_string());
    }

    pub fn publish(&self, change: Change) {
        let _ = self.changes.send(change);
    }

    fn record(&self, call: &str) -> Result<()> {
        *self.calls.lock().unwrap().entry(call.to_string()).or_default() += 1;
        if self.failing.lock().unwrap().remove(call) {
            return Err(Error::Request(format!("{call} failed")));
        }
        Ok(())
    }

    fn stored(&self, kind: &ResourceKind, namespace: Option<&str>) -> Vec<DynamicObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&kind.kind().to_lowercase())
            .into_iter()
            .flatten()
            .filter(|o| namespace.is_none() || o.metadata.namespace.as_deref() == namespace)
            .cloned()
            .collect()
    }
}

fn definition(name: &str, priority: i32) -> TableColumnDefinition {
    TableColumnDefinition {
        name: name.to_string(),
        type_: "string".to_string(),
        priority,
        ..Default::default()
    }
}

/// What the server renders for every kind here: `Name`, `Status`, `Node`
/// (wide only) and `Age`.
fn render_table(objects: Vec<DynamicObject>) -> Table {
    let rows = objects
        .into_iter()
        .map(|obj| {
            let status = obj
                .data
                .pointer("/status/phase")
                .cloned()
                .unwrap_or_else(|| json!("Active"));
            TableRow {
                cells: vec![
                    json!(obj.metadata.name.clone().unwrap_or_default()),
                    status,
                    json!("node-1"),
                    json!("5m"),
                ],
                object: serde_json::to_value(&obj).ok(),
            }
        })
        .collect();
    Table {
        metadata: Default::default(),
        column_definitions: vec![
            definition("Name", 0),
            definition("Status", 0),
            definition("Node", 1),
            definition("Age", 0),
        ],
        rows,
    }
}

#[async_trait]
impl Cluster for FakeCluster {
    async fn resolve(&self, name: &str) -> Result<ResourceKind> {
        self.record("resolve")?;
        self.kinds
            .iter()
            .find(|k| k.matches(name))
            .cloned()
            .ok_or_else(|| Error::UnknownKind(name.to_string()))
    }

    async fn kinds(&self) -> Result<Vec<ResourceKind>> {
        self.record("kinds")?;
        Ok(self.kinds.clone())
    }

    async fn list_by_kind(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        self.record("list")?;
        Ok(self.stored(kind, namespace))
    }

    async fn get_by_kind(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject> {
        self.record("get")?;
        self.stored(kind, namespace)
            .into_iter()
            .find(|o| o.metadata.name.as_deref() == Some(name))
            .ok_or_else(|| Error::NotFound {
                kind: kind.kind().to_string(),
                name: name.to_string(),
            })
    }

    async fn list_table_by_kind(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        _opts: &TableOptions,
    ) -> Result<Option<RowList>> {
        self.record("list_table")?;
        if !self.tables.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let table = render_table(self.stored(kind, namespace));
        rows_from_table(kind.kind(), table).map(Some)
    }

    async fn has_any(&self, kind: &ResourceKind, namespace: Option<&str>) -> Result<bool> {
        self.record("has_any")?;
        Ok(!self.stored(kind, namespace).is_empty())
    }

    async fn count(&self, kind: &ResourceKind, namespace: Option<&str>) -> Result<usize> {
        self.record("count")?;
        Ok(self.stored(kind, namespace).len())
    }

    async fn subscribe(&self, _kind: &ResourceKind) -> broadcast::Receiver<Change> {
        let _ = self.record("subscribe");
        self.changes.subscribe()
    }
}

pub fn fake_deps() -> (Arc<Deps>, Arc<FakeCluster>) {
    let cluster = FakeCluster::new();
    (Arc::new(Deps::new(cluster.clone(), "test")), cluster)
}

/// Like [`fake_deps`] with view options adjusted by `tweak`.
pub fn fake_deps_with<F>(tweak: F) -> (Arc<Deps>, Arc<FakeCluster>)
where
    F: Fn(&mut ViewOptions) + Send + Sync + 'static,
{
    let cluster = FakeCluster::new();
    let deps = Deps::new(cluster.clone(), "test").with_view(move || {
        let mut view = ViewOptions::default();
        tweak(&mut view);
        view
    });
    (Arc::new(deps), cluster)
}

fn object(value: Value) -> DynamicObject {
    serde_json::from_value(value).unwrap()
}

/// A running pod labelled `app=web`, created `minute` minutes into 2024.
pub fn pod(namespace: &str, name: &str, minute: u32) -> DynamicObject {
    object(json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "resourceVersion": "100",
            "labels": {"app": "web"},
            "creationTimestamp": format!("2024-01-01T00:{minute:02}:00Z"),
        },
        "status": {"phase": "Running"}
    }))
}

pub fn namespace(name: &str) -> DynamicObject {
    object(json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {"name": name, "creationTimestamp": "2024-01-01T00:00:00Z"},
        "status": {"phase": "Active"}
    }))
}

fn plain_items(path: &str, ids: &[String]) -> Listing {
    let items = ids
        .iter()
        .map(|id| {
            Arc::new(
                Item::new(id.clone(), id.clone(), folder::join_path(path, id))
                    .with_cells(vec![Cell::new(id.clone())]),
            )
        })
        .collect();
    Listing::new(vec![Column::named("NAME")], items)
}

/// Populates with the same names every time and counts how often it ran.
pub struct CountingSource {
    ids: Vec<String>,
    calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl CountingSource {
    pub fn new(ids: &[&str]) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = Self {
            ids: ids.iter().map(|s| s.to_string()).collect(),
            calls: calls.clone(),
            delay: None,
        };
        (source, calls)
    }

    /// Every populate sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Populate for CountingSource {
    async fn populate(&self, ctx: &PopulateCtx<'_>) -> Result<Listing> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.delay {
            Some(delay) => tokio::time::sleep(delay).await,
            // leaves room for concurrent readers to pile up
            None => tokio::task::yield_now().await,
        }
        Ok(plain_items(ctx.path, &self.ids))
    }
}

/// A folder that always lists `ids`.
pub fn fixed_folder(deps: Arc<Deps>, path: impl Into<String>, ids: &[&str]) -> Arc<LiveFolder> {
    let (source, _) = CountingSource::new(ids);
    Arc::new(LiveFolder::new(deps, path, Box::new(source)))
}

/// Named contexts, each backed by its own empty [`FakeCluster`].
pub struct FakeContexts {
    current: String,
    names: Vec<String>,
}

impl FakeContexts {
    pub fn new(current: &str, names: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            current: current.to_string(),
            names: names.iter().map(|s| s.to_string()).collect(),
        })
    }
}

#[async_trait]
impl ContextSource for FakeContexts {
    fn contexts(&self) -> Vec<String> {
        self.names.clone()
    }

    fn current(&self) -> String {
        self.current.clone()
    }

    async fn enter(&self, name: &str) -> Option<Arc<dyn Folder>> {
        if !self.names.iter().any(|n| n == name) {
            return None;
        }
        let deps = Deps::new(FakeCluster::new(), name);
        Some(folder::root(Arc::new(deps)))
    }
}
