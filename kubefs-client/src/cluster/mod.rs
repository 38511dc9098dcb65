//! What the folder tree needs from a cluster connection.

mod hub;
mod kube_cluster;

pub use hub::ChangeHub;
pub use kube_cluster::{KubeCluster, KubeContexts};

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::DynamicObject;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::folder::Folder;
use crate::kind::ResourceKind;
use crate::row::RowList;
use crate::table::{EventType, TableOptions};

/// One object of a watched kind changed, or with `resync` set, any object of
/// that kind may have changed while its watch was down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// [`ResourceKind::key`] of the changed object.
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
    pub event: EventType,
    pub resync: bool,
}

impl Change {
    /// Kind-wide invalidation sent after a watch had to be reopened.
    pub fn resync(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: None,
            name: String::new(),
            event: EventType::Bookmark,
            resync: true,
        }
    }
}

#[async_trait]
pub trait Cluster: Send + Sync {
    /// Resolves a kind by name, plural, or `plural.group`.
    async fn resolve(&self, name: &str) -> Result<ResourceKind>;

    /// Every listable kind the server advertises.
    async fn kinds(&self) -> Result<Vec<ResourceKind>>;

    async fn list_by_kind(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>>;

    async fn get_by_kind(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject>;

    /// `Ok(None)` when the server refuses table rendering for this kind.
    async fn list_table_by_kind(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        opts: &TableOptions,
    ) -> Result<Option<RowList>>;

    async fn has_any(&self, kind: &ResourceKind, namespace: Option<&str>) -> Result<bool>;

    async fn count(&self, kind: &ResourceKind, namespace: Option<&str>) -> Result<usize> {
        Ok(self.list_by_kind(kind, namespace).await?.len())
    }

    /// Change notifications for every object of `kind`, in any namespace.
    async fn subscribe(&self, kind: &ResourceKind) -> broadcast::Receiver<Change>;
}

/// Alternate contexts offered at the root.
#[async_trait]
pub trait ContextSource: Send + Sync {
    fn contexts(&self) -> Vec<String>;

    fn current(&self) -> String;

    /// Root folder of another context, `None` when it cannot be reached.
    async fn enter(&self, name: &str) -> Option<Arc<dyn Folder>>;
}
