use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::serde_json;
use kube::api::DynamicObject;

use super::{join_path, Coords, Deps, Folder, Item, Listing, LiveFolder, ObjectRef};
use super::{Populate, PopulateCtx, View};
use crate::error::Result;
use crate::kind::ResourceKind;
use crate::row::Column;
use crate::utils::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    ConfigMap,
    Secret,
}

impl Source {
    fn kind(self) -> ResourceKind {
        match self {
            Source::ConfigMap => ResourceKind::from_parts("", "v1", "ConfigMap", true),
            Source::Secret => ResourceKind::from_parts("", "v1", "Secret", true),
        }
    }
}

pub fn config_map_keys(
    deps: Arc<Deps>,
    namespace: Option<String>,
    name: String,
    base_path: String,
) -> Arc<dyn Folder> {
    data_keys(Source::ConfigMap, deps, namespace, name, base_path)
}

pub fn secret_keys(
    deps: Arc<Deps>,
    namespace: Option<String>,
    name: String,
    base_path: String,
) -> Arc<dyn Folder> {
    data_keys(Source::Secret, deps, namespace, name, base_path)
}

fn data_keys(
    source: Source,
    deps: Arc<Deps>,
    namespace: Option<String>,
    name: String,
    base_path: String,
) -> Arc<dyn Folder> {
    let path = join_path(&base_path, &name);
    let kind = source.kind();
    let coords = Coords {
        kind: kind.kind().to_string(),
        namespace: namespace.clone(),
    };
    let keys = DataKeys {
        source,
        kind,
        namespace,
        name,
    };
    Arc::new(LiveFolder::new(deps, path, Box::new(keys)).with_coords(coords))
}

struct DataKeys {
    source: Source,
    kind: ResourceKind,
    namespace: Option<String>,
    name: String,
}

/// Key and decoded value, in key order.
fn entries(source: Source, obj: &DynamicObject) -> Result<Vec<(String, String)>> {
    let value = serde_json::to_value(obj)?;
    let entries = match source {
        Source::ConfigMap => {
            let cm: ConfigMap = serde_json::from_value(value)?;
            let text = cm.data.unwrap_or_default().into_iter();
            let binary = cm
                .binary_data
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| (k, String::from_utf8_lossy(&v.0).into_owned()));
            let mut all: Vec<_> = text.chain(binary).collect();
            all.sort_by(|a, b| a.0.cmp(&b.0));
            all
        }
        Source::Secret => {
            let secret: Secret = serde_json::from_value(value)?;
            secret
                .data
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| (k, String::from_utf8_lossy(&v.0).into_owned()))
                .collect()
        }
    };
    Ok(entries)
}

#[async_trait]
impl Populate for DataKeys {
    #[tracing::instrument(skip(self, ctx), fields(kind = %self.kind.kind(), name = %self.name))]
    async fn populate(&self, ctx: &PopulateCtx<'_>) -> Result<Listing> {
        ctx.subscribe(&self.kind, self.namespace.as_deref()).await;
        let obj = ctx
            .deps
            .cluster
            .get_by_kind(&self.kind, self.namespace.as_deref(), &self.name)
            .await?;

        let items = entries(self.source, &obj)?
            .into_iter()
            .map(|(key, value)| {
                let size = value.len();
                Arc::new(
                    Item::new(key.clone(), key.clone(), join_path(ctx.path, &key))
                        .with_cells(vec![Cell::new(key.clone()), Cell::new(size.to_string())])
                        .with_details(format!("{} {}: {size} bytes", self.kind.kind(), self.name))
                        .with_object(ObjectRef {
                            kind: self.kind.kind().to_string(),
                            namespace: self.namespace.clone(),
                            name: self.name.clone(),
                        })
                        .with_view(Arc::new(Decoded(value))),
                )
            })
            .collect();

        Ok(Listing::new(
            vec![Column::named("KEY"), Column::named("SIZE")],
            items,
        ))
    }
}

struct Decoded(String);

#[async_trait]
impl View for Decoded {
    async fn view(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}
