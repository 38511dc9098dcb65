use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::{join_path, objects, Deps, Enter, Folder, Item, LazyCount, Listing, LiveFolder};
use super::{Populate, PopulateCtx, WithBack};
use crate::cluster::ContextSource;
use crate::error::Result;
use crate::kind::ResourceKind;
use crate::row::Column;
use crate::sort::sort_kinds;
use crate::utils::{Cell, PATH_GLYPH};

/// Top of a context: other contexts, then the cluster-scoped kinds.
pub fn root(deps: Arc<Deps>) -> Arc<dyn Folder> {
    Arc::new(LiveFolder::new(deps, "/", Box::new(Kinds::new(None))))
}

/// Namespaced kinds, each counted and listed within `namespace`.
pub fn namespace_kinds(deps: Arc<Deps>, namespace: String, base_path: String) -> Arc<dyn Folder> {
    let path = join_path(&base_path, &namespace);
    Arc::new(LiveFolder::new(deps, path, Box::new(Kinds::new(Some(namespace)))))
}

fn columns() -> Vec<Column> {
    ["NAME", "GROUP", "VERSION", "COUNT"]
        .into_iter()
        .map(Column::named)
        .collect()
}

struct Kinds {
    namespace: Option<String>,
    /// Kept across populations so a known count survives a refresh.
    counts: Mutex<HashMap<String, Arc<LazyCount>>>,
}

impl Kinds {
    fn new(namespace: Option<String>) -> Self {
        Self {
            namespace,
            counts: Mutex::new(HashMap::new()),
        }
    }

    fn count_for(&self, ctx: &PopulateCtx<'_>, kind: &ResourceKind) -> Arc<LazyCount> {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        counts
            .entry(kind.key())
            .or_insert_with(|| {
                LazyCount::new(
                    ctx.deps.clone(),
                    kind.clone(),
                    self.namespace.clone(),
                    ctx.dirty_handle(),
                )
            })
            .clone()
    }

    fn context_items(&self, ctx: &PopulateCtx<'_>) -> Vec<Arc<Item>> {
        let Some(source) = ctx.deps.contexts.as_ref().filter(|_| self.namespace.is_none()) else {
            return Vec::new();
        };
        let current = source.current();
        source
            .contexts()
            .into_iter()
            .filter(|name| *name != current)
            .map(|name| {
                let entry = ContextEntry {
                    source: source.clone(),
                    name: name.clone(),
                    parent: ctx.path.to_string(),
                };
                Arc::new(
                    Item::new(format!("context:{name}"), name.clone(), ctx.path)
                        .with_cells(vec![
                            Cell::new(format!("{PATH_GLYPH}{name}")),
                            Cell::new("context"),
                            Cell::new(""),
                        ])
                        .with_details(format!("context {name}"))
                        .with_count(None)
                        .with_enter(Arc::new(entry)),
                )
            })
            .collect()
    }
}

#[async_trait]
impl Populate for Kinds {
    #[tracing::instrument(skip(self, ctx), fields(path = %ctx.path))]
    async fn populate(&self, ctx: &PopulateCtx<'_>) -> Result<Listing> {
        let view = ctx.deps.view_options();
        let scoped = self.namespace.is_some();

        let mut kinds: Vec<ResourceKind> = ctx
            .deps
            .cluster
            .kinds()
            .await?
            .into_iter()
            .filter(|k| k.namespaced == scoped)
            .collect();
        sort_kinds(&mut kinds, view.kind_order, &view.favorites);

        let mut items = self.context_items(ctx);
        for kind in kinds {
            let count = self.count_for(ctx, &kind);
            if view.hide_empty && count.is_known_empty() {
                continue;
            }
            let key = kind.key();
            let scope = match &self.namespace {
                Some(ns) => format!("in {ns}"),
                None => "cluster-wide".to_string(),
            };
            let entry = KindEntry {
                deps: ctx.deps.clone(),
                kind: kind.clone(),
                namespace: self.namespace.clone(),
                parent: ctx.path.to_string(),
            };
            let item = Item::new(key.clone(), key.clone(), join_path(ctx.path, &key))
                .with_cells(vec![
                    Cell::new(format!("{PATH_GLYPH}{key}")),
                    Cell::new(kind.group()),
                    Cell::new(kind.ar.version.clone()),
                ])
                .with_details(format!("{} {}/{} {scope}", kind.kind(), kind.ar.api_version, kind.plural()))
                .with_count(Some(count))
                .with_enter(Arc::new(entry));
            items.push(Arc::new(item));
        }

        Ok(Listing::new(columns(), items))
    }
}

struct KindEntry {
    deps: Arc<Deps>,
    kind: ResourceKind,
    namespace: Option<String>,
    parent: String,
}

#[async_trait]
impl Enter for KindEntry {
    async fn enter(&self) -> Option<Arc<dyn Folder>> {
        let listing = objects(
            self.deps.clone(),
            self.kind.clone(),
            self.namespace.clone(),
            self.parent.clone(),
        );
        Some(Arc::new(WithBack::new(listing, self.parent.clone())))
    }
}

struct ContextEntry {
    source: Arc<dyn ContextSource>,
    name: String,
    parent: String,
}

#[async_trait]
impl Enter for ContextEntry {
    async fn enter(&self) -> Option<Arc<dyn Folder>> {
        let root = self.source.enter(&self.name).await?;
        Some(Arc::new(WithBack::new(root, self.parent.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listview::ListView;
    use crate::structs::KindOrder;
    use crate::testing::{fake_deps, fake_deps_with, namespace, pod, FakeContexts};
    use std::time::Duration;

    #[tokio::test]
    async fn test_root_lists_cluster_scoped_kinds() {
        let (deps, _) = fake_deps();
        let folder = root(deps);
        assert_eq!(folder.path(), "/");
        assert_eq!(folder.key(), "test:/");

        let listing = folder.listing().await;
        assert_eq!(listing.ids(), vec!["namespaces", "nodes"]);
        let names: Vec<_> = listing.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["NAME", "GROUP", "VERSION", "COUNT"]);

        let nodes = listing.find("nodes").unwrap();
        assert_eq!(nodes.cells[0].value, format!("{PATH_GLYPH}nodes"));
        assert_eq!(nodes.display_cells(chrono::Utc::now()).len(), 4);
        assert!(nodes.count().is_some());
    }

    #[tokio::test]
    async fn test_root_offers_other_contexts_first() {
        let (deps, _) = fake_deps();
        let contexts = FakeContexts::new("test", &["test", "staging", "prod"]);
        let deps = Arc::new(Deps::clone(&deps).with_contexts(contexts));
        let folder = root(deps);

        let listing = folder.listing().await;
        assert_eq!(
            listing.ids(),
            vec!["context:staging", "context:prod", "namespaces", "nodes"]
        );

        let staging = listing.find("context:staging").unwrap();
        let other = staging.enter().await.unwrap();
        assert_eq!(other.context(), "staging");
        assert_eq!(other.key(), "staging:/");
        let first = other.lines(0, 1).await;
        assert!(first[0].is_back);
    }

    #[tokio::test]
    async fn test_namespace_kinds_follow_kind_order() {
        let (deps, _) = fake_deps_with(|v| v.kind_order = KindOrder::Grouped);
        let folder = namespace_kinds(deps, "prod".into(), "/namespaces".into());
        assert_eq!(folder.path(), "/namespaces/prod");
        assert_eq!(
            folder.listing().await.ids(),
            vec!["configmaps", "pods", "secrets", "deployments.apps"]
        );

        let (deps, _) = fake_deps_with(|v| {
            v.kind_order = KindOrder::FavoritesFirst;
            v.favorites = vec!["secrets".into()];
        });
        let folder = namespace_kinds(deps, "prod".into(), "/namespaces".into());
        assert_eq!(folder.listing().await.ids()[0], "secrets");
    }

    #[tokio::test]
    async fn test_entering_a_kind_opens_its_objects() {
        let (deps, cluster) = fake_deps();
        cluster.add_objects("Pod", vec![pod("prod", "web-0", 1), pod("dev", "api-0", 1)]);
        let folder = namespace_kinds(deps, "prod".into(), "/namespaces".into());

        let pods = folder.item_by_id("pods").await.unwrap();
        let count = pods.count().unwrap().refresh().await.unwrap();
        assert_eq!(count, 1);

        let listing = pods.enter().await.unwrap();
        assert_eq!(listing.path(), "/namespaces/prod/pods");
        assert_eq!(listing.listing().await.ids(), vec!["..", "prod/web-0"]);
    }

    #[tokio::test]
    async fn test_entering_a_namespace_row_scopes_kinds() {
        let (deps, cluster) = fake_deps();
        cluster.add_objects("Namespace", vec![namespace("prod")]);
        let namespaces = root(deps).item_by_id("namespaces").await.unwrap();

        let listing = namespaces.enter().await.unwrap();
        let prod = listing.item_by_id("prod").await.unwrap();
        assert!(prod.cells[0].value.starts_with(PATH_GLYPH));

        let kinds = prod.enter().await.unwrap();
        assert_eq!(kinds.path(), "/namespaces/prod");
        assert!(kinds.item_by_id("pods").await.is_some());
    }

    #[tokio::test]
    async fn test_hide_empty_drops_kinds_once_counted() {
        let (deps, cluster) = fake_deps_with(|v| v.hide_empty = true);
        cluster.add_objects("Pod", vec![pod("prod", "web-0", 1)]);
        let folder = namespace_kinds(deps, "prod".into(), "/namespaces".into());

        // unknown counts are shown
        assert_eq!(folder.len().await, 4);

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if folder.listing().await.ids() == vec!["pods"] {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(cluster.calls("has_any") >= 4);
    }
}
