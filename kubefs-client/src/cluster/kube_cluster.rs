use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use kube::api::{Api, DynamicObject, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::{verbs, Discovery};
use kube::{Client, Config};
use tokio::sync::{broadcast, OnceCell};
use tokio_util::sync::CancellationToken;

use super::hub::WatchOpener;
use super::{Change, ChangeHub, Cluster, ContextSource};
use crate::error::{Error, Result};
use crate::folder::{self, Deps, Folder};
use crate::kind::ResourceKind;
use crate::row::RowList;
use crate::table::{RowWatch, TableAdapter, TableOptions};

/// Kinds discovery reports that cannot be listed in practice.
const SKIPPED_PLURALS: &[&str] = &["componentstatuses"];

/// [`Cluster`] backed by a live API server.
pub struct KubeCluster {
    client: Client,
    context: String,
    discovery: OnceCell<Vec<ResourceKind>>,
    tables: TableAdapter,
    hub: ChangeHub,
}

impl KubeCluster {
    /// Connects with the named kubeconfig context, or the current one.
    #[tracing::instrument(skip(cancel))]
    pub async fn connect(context: Option<&str>, cancel: CancellationToken) -> Result<Self> {
        let options = KubeConfigOptions {
            context: context.map(str::to_string),
            cluster: None,
            user: None,
        };
        let config = Config::from_kubeconfig(&options).await?;
        let client = Client::try_from(config)?;

        let name = match context {
            Some(name) => name.to_string(),
            None => Kubeconfig::read()
                .ok()
                .and_then(|k| k.current_context)
                .unwrap_or_default(),
        };
        tracing::info!(context = %name, "connected");
        Ok(Self::new(client, name, cancel))
    }

    pub fn new(client: Client, context: impl Into<String>, cancel: CancellationToken) -> Self {
        let watch_client = client.clone();
        let opener: WatchOpener = Arc::new(move |kind: ResourceKind| {
            let client = watch_client.clone();
            async move { open_watch(client, kind).await }.boxed()
        });

        Self {
            tables: TableAdapter::new(client.clone()),
            hub: ChangeHub::new(opener, cancel),
            discovery: OnceCell::new(),
            context: context.into(),
            client,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn hub(&self) -> &ChangeHub {
        &self.hub
    }

    /// Stops every change watch; intended for context switches and exit.
    pub async fn shutdown(&self) {
        self.hub.shutdown().await;
    }

    fn api(&self, kind: &ResourceKind, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) if kind.namespaced => Api::namespaced_with(self.client.clone(), ns, &kind.ar),
            _ => Api::all_with(self.client.clone(), &kind.ar),
        }
    }
}

/// Starts a change watch at the current resource version, so no synthetic
/// `ADDED` burst is replayed for objects that already exist.
async fn open_watch(client: Client, kind: ResourceKind) -> Result<RowWatch> {
    let api: Api<DynamicObject> = Api::all_with(client.clone(), &kind.ar);
    let head = api.list_metadata(&ListParams::default().limit(1)).await?;
    let version = head.metadata.resource_version.unwrap_or_default();
    TableAdapter::new(client).watch(&kind, None, &TableOptions::default(), &version)
}

/// The server rejected the table media type itself.
pub(crate) fn table_refused(err: &Error) -> bool {
    matches!(err, Error::Kube(kube::Error::Api(resp)) if resp.code == 406 || resp.code == 415)
}

#[async_trait]
impl Cluster for KubeCluster {
    async fn resolve(&self, name: &str) -> Result<ResourceKind> {
        self.kinds()
            .await?
            .into_iter()
            .find(|k| k.matches(name))
            .ok_or_else(|| Error::UnknownKind(name.to_string()))
    }

    async fn kinds(&self) -> Result<Vec<ResourceKind>> {
        let kinds = self
            .discovery
            .get_or_try_init(|| async {
                let discovery = Discovery::new(self.client.clone()).run().await?;
                let kinds: Vec<ResourceKind> = discovery
                    .groups()
                    .flat_map(|g| g.recommended_resources())
                    .filter(|(ar, caps)| {
                        caps.supports_operation(verbs::LIST)
                            && !SKIPPED_PLURALS.contains(&ar.plural.as_str())
                    })
                    .map(|(ar, caps)| ResourceKind::from_discovery(ar, &caps))
                    .collect();
                tracing::debug!(count = kinds.len(), "discovered kinds");
                Ok::<_, Error>(kinds)
            })
            .await?;
        Ok(kinds.clone())
    }

    #[tracing::instrument(skip(self, kind), fields(kind = %kind.key()))]
    async fn list_by_kind(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        let mut list = self.api(kind, namespace).list(&ListParams::default()).await?;
        for obj in &mut list.items {
            obj.metadata.managed_fields = None;
        }
        Ok(list.items)
    }

    #[tracing::instrument(skip(self, kind), fields(kind = %kind.key()))]
    async fn get_by_kind(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject> {
        self.api(kind, namespace)
            .get(name)
            .await
            .map_err(|e| match e {
                kube::Error::Api(resp) if resp.code == 404 => Error::NotFound {
                    kind: kind.kind().to_string(),
                    name: name.to_string(),
                },
                e => e.into(),
            })
    }

    async fn list_table_by_kind(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        opts: &TableOptions,
    ) -> Result<Option<RowList>> {
        match self.tables.list(kind, namespace, opts).await {
            Ok(rows) => Ok(Some(rows)),
            Err(e) if table_refused(&e) => {
                tracing::debug!(kind = %kind.key(), "table rendering refused");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn has_any(&self, kind: &ResourceKind, namespace: Option<&str>) -> Result<bool> {
        let head = self
            .api(kind, namespace)
            .list_metadata(&ListParams::default().limit(1))
            .await?;
        Ok(!head.items.is_empty())
    }

    async fn count(&self, kind: &ResourceKind, namespace: Option<&str>) -> Result<usize> {
        let all = self
            .api(kind, namespace)
            .list_metadata(&ListParams::default())
            .await?;
        Ok(all.items.len())
    }

    async fn subscribe(&self, kind: &ResourceKind) -> broadcast::Receiver<Change> {
        self.hub.subscribe(kind).await
    }
}

/// Contexts from the local kubeconfig. Entering one connects a fresh
/// [`KubeCluster`] sharing the registry, view options and cancellation of
/// `base`.
pub struct KubeContexts {
    names: Vec<String>,
    current: String,
    base: Arc<Deps>,
}

impl KubeContexts {
    pub fn from_kubeconfig(base: Arc<Deps>) -> Result<Self> {
        let config = Kubeconfig::read()?;
        let names = config.contexts.iter().map(|c| c.name.clone()).collect();
        let current = config
            .current_context
            .unwrap_or_else(|| base.context.clone());
        Ok(Self::new(names, current, base))
    }

    pub fn new(names: Vec<String>, current: impl Into<String>, base: Arc<Deps>) -> Self {
        Self {
            names,
            current: current.into(),
            base,
        }
    }
}

#[async_trait]
impl ContextSource for KubeContexts {
    fn contexts(&self) -> Vec<String> {
        self.names.clone()
    }

    fn current(&self) -> String {
        self.current.clone()
    }

    #[tracing::instrument(skip(self))]
    async fn enter(&self, name: &str) -> Option<Arc<dyn Folder>> {
        let connect = KubeCluster::connect(Some(name), self.base.cancel.child_token());
        match self.base.guard(connect).await {
            Ok(cluster) => {
                let deps = self.base.for_cluster(Arc::new(cluster), name);
                Some(folder::root(Arc::new(deps)))
            }
            Err(e) => {
                tracing::warn!(context = name, error = %e, "cannot enter context");
                None
            }
        }
    }
}
