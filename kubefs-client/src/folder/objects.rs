use std::sync::Arc;

use async_trait::async_trait;

use super::{join_path, Coords, Deps, Enter, Folder, Item, Listing, LiveFolder, ObjectRef};
use super::{Populate, PopulateCtx, View, WithBack};
use crate::error::{Error, Result};
use crate::filter::{LabelFilter, TextFilter};
use crate::kind::ResourceKind;
use crate::registry::ChildCtor;
use crate::row::{Column, Row, RowList};
use crate::sort::sort_rows;
use crate::structs::{ColumnSet, ViewOptions};
use crate::table::{rows_from_objects, TableOptions};
use crate::utils::{cell_text, Cell, PATH_GLYPH};

/// Objects of one kind, in one namespace or across all of them.
pub fn objects(
    deps: Arc<Deps>,
    kind: ResourceKind,
    namespace: Option<String>,
    base_path: String,
) -> Arc<dyn Folder> {
    let namespace = namespace.filter(|_| kind.namespaced);
    let path = join_path(&base_path, &kind.key());
    let coords = Coords {
        kind: kind.kind().to_string(),
        namespace: namespace.clone(),
    };
    let source = Objects {
        target: Target::Kind(kind),
        namespace,
    };
    Arc::new(LiveFolder::new(deps, path, Box::new(source)).with_coords(coords))
}

/// Like [`objects`], resolving `kind` on every populate. An unknown kind
/// yields an empty listing.
pub fn objects_named(
    deps: Arc<Deps>,
    kind: String,
    namespace: Option<String>,
    base_path: String,
) -> Arc<dyn Folder> {
    let path = join_path(&base_path, &kind.to_lowercase());
    let coords = Coords {
        kind: kind.clone(),
        namespace: namespace.clone(),
    };
    let source = Objects {
        target: Target::Named(kind),
        namespace,
    };
    Arc::new(LiveFolder::new(deps, path, Box::new(source)).with_coords(coords))
}

enum Target {
    Kind(ResourceKind),
    Named(String),
}

struct Objects {
    target: Target,
    namespace: Option<String>,
}

#[async_trait]
impl Populate for Objects {
    #[tracing::instrument(skip(self, ctx), fields(path = %ctx.path))]
    async fn populate(&self, ctx: &PopulateCtx<'_>) -> Result<Listing> {
        let kind = match &self.target {
            Target::Kind(kind) => kind.clone(),
            Target::Named(name) => match ctx.deps.cluster.resolve(name).await {
                Ok(kind) => kind,
                Err(Error::UnknownKind(name)) => {
                    tracing::debug!(kind = %name, "unknown kind, listing nothing");
                    return Ok(Listing::empty(vec![Column::named("NAME")]));
                }
                Err(e) => return Err(e),
            },
        };
        let namespace = self.namespace.as_deref().filter(|_| kind.namespaced);

        ctx.subscribe(&kind, namespace).await;
        let rows = fetch_rows(ctx.deps, &kind, namespace).await?;
        let view = ctx.deps.view_options();
        Ok(build_listing(ctx.deps, ctx.path, &kind, namespace, rows, &view))
    }
}

/// Server-rendered table when available, name-only rows otherwise. The table
/// path is tried again on every call.
async fn fetch_rows(
    deps: &Arc<Deps>,
    kind: &ResourceKind,
    namespace: Option<&str>,
) -> Result<RowList> {
    let table = deps
        .cluster
        .list_table_by_kind(kind, namespace, &TableOptions::default())
        .await?;
    match table {
        Some(rows) => Ok(rows),
        None => {
            tracing::debug!(kind = %kind.key(), "no table, listing objects");
            let objects = deps.cluster.list_by_kind(kind, namespace).await?;
            Ok(rows_from_objects(kind.kind(), objects))
        }
    }
}

/// Indices of the server columns shown under `set`. The server's own `Age`
/// is replaced by the one computed at display time.
fn projection(columns: &[Column], set: ColumnSet) -> Vec<usize> {
    columns
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_age())
        .filter(|(_, c)| set == ColumnSet::Wide || c.default_visible())
        .map(|(i, _)| i)
        .collect()
}

fn details(kind: &ResourceKind, row: &Row, id: &str) -> String {
    let mut details = format!("{} {id}", kind.kind());
    if let Some(rv) = &row.meta.resource_version {
        details.push_str(&format!(" rv={rv}"));
    }
    if let Some(labels) = row.meta.labels.as_ref().filter(|l| !l.is_empty()) {
        let labels: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
        details.push_str(&format!(" labels={}", labels.join(",")));
    }
    details
}

pub(crate) fn build_listing(
    deps: &Arc<Deps>,
    path: &str,
    kind: &ResourceKind,
    namespace: Option<&str>,
    mut list: RowList,
    view: &ViewOptions,
) -> Listing {
    let visible = projection(&list.columns, view.columns);
    let all_namespaces = kind.namespaced && namespace.is_none();
    let name_col = list.columns.iter().position(Column::is_name);
    let glyph_at = name_col
        .and_then(|n| visible.iter().position(|&i| i == n))
        .unwrap_or(0);

    let mut columns = Vec::with_capacity(visible.len() + 2);
    if all_namespaces {
        columns.push(Column::named("NAMESPACE"));
    }
    columns.extend(visible.iter().map(|&i| {
        let mut column = list.columns[i].clone();
        column.name = column.name.to_uppercase();
        column
    }));
    columns.push(Column::named("AGE"));

    let text = TextFilter::parse(view.filter.as_deref().unwrap_or_default());
    let labels = LabelFilter::parse(&view.filter_label);
    let child = deps.registry.get(kind.kind());

    sort_rows(&mut list.rows, &list.columns, view.sort);

    let items = list
        .rows
        .iter()
        .filter(|row| labels.matches(&row.meta))
        .filter_map(|row| {
            let texts: Vec<String> = visible
                .iter()
                .map(|&i| row.cells.get(i).map(cell_text).unwrap_or_default())
                .collect();
            let name = row.name(&list.columns);
            let ns = row.namespace().map(str::to_string);
            if !text.is_empty() {
                let mut fields = texts.clone();
                fields.push(name.clone());
                fields.extend(ns.clone());
                if !text.matches(&fields) {
                    return None;
                }
            }

            let mut cells = Vec::with_capacity(texts.len() + 1);
            if all_namespaces {
                cells.push(Cell::new(ns.clone().unwrap_or_default()));
            }
            for (pos, value) in texts.into_iter().enumerate() {
                if pos == glyph_at && child.is_some() {
                    cells.push(Cell::new(format!("{PATH_GLYPH}{value}")));
                } else if pos == glyph_at {
                    cells.push(Cell::new(value));
                } else {
                    cells.push(Cell::status(value));
                }
            }

            // across namespaces the namespace joins the path so that
            // same-named objects keep distinct folder keys
            let base_path = match ns.as_deref() {
                Some(ns) if all_namespaces => join_path(path, ns),
                _ => path.to_string(),
            };
            let id = row.id(&list.columns);
            let mut item = Item::new(id.clone(), name.clone(), join_path(&base_path, &name))
                .with_cells(cells)
                .with_age(row.created())
                .with_details(details(kind, row, &id))
                .with_object(ObjectRef {
                    kind: kind.kind().to_string(),
                    namespace: ns.clone(),
                    name: name.clone(),
                })
                .with_view(Arc::new(ObjectView {
                    deps: deps.clone(),
                    kind: kind.clone(),
                    namespace: ns.clone(),
                    name: name.clone(),
                }));
            if let Some(ctor) = &child {
                item = item.with_enter(Arc::new(ChildEntry {
                    ctor: ctor.clone(),
                    deps: deps.clone(),
                    namespace: ns,
                    name,
                    base_path,
                    back_path: path.to_string(),
                }));
            }
            Some(Arc::new(item))
        })
        .collect();

    Listing::new(columns, items)
}

/// Opens the registered child listing of an object row.
struct ChildEntry {
    ctor: ChildCtor,
    deps: Arc<Deps>,
    namespace: Option<String>,
    name: String,
    base_path: String,
    back_path: String,
}

#[async_trait]
impl Enter for ChildEntry {
    async fn enter(&self) -> Option<Arc<dyn Folder>> {
        let child = (self.ctor)(
            self.deps.clone(),
            self.namespace.clone(),
            self.name.clone(),
            self.base_path.clone(),
        );
        Some(Arc::new(WithBack::new(child, self.back_path.clone())))
    }
}

/// The full object, fetched on demand.
struct ObjectView {
    deps: Arc<Deps>,
    kind: ResourceKind,
    namespace: Option<String>,
    name: String,
}

#[async_trait]
impl View for ObjectView {
    async fn view(&self) -> Result<String> {
        let get = self
            .deps
            .cluster
            .get_by_kind(&self.kind, self.namespace.as_deref(), &self.name);
        let obj = self.deps.guard(get).await?;
        Ok(self.deps.view_options().output.format_object(obj))
    }
}
