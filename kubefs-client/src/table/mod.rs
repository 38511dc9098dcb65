//! Server-side table negotiation.
//!
//! Lists and watches are requested as `meta.k8s.io/v1` tables with the object
//! embedded, so the server computes the columns and we still recover the
//! object identity. Servers (or aggregated APIs) that ignore the table media
//! type answer with a plain list; that payload is decoded the conventional way
//! and the caller never learns the difference.

mod types;
mod watch;

pub use types::{RawWatchEvent, Table, TableColumnDefinition, TableRow, WatchStatus};
pub use watch::{demux_line, demux_lines, EventType, RowEvent, RowSink, RowWatch};

use futures::AsyncBufReadExt;
use http::header::{HeaderValue, ACCEPT};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ListMeta, ObjectMeta};
use k8s_openapi::serde_json::{self, Value};
use kube::api::{DynamicObject, ListParams, WatchParams};
use kube::{Client, Resource};
use rayon::prelude::*;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::kind::ResourceKind;
use crate::row::{Column, Row, RowList};

pub const TABLE_ACCEPT: &str = "application/json;as=Table;v=v1;g=meta.k8s.io,\
application/json;as=Table;v=v1beta1;g=meta.k8s.io,application/json";

const WATCH_TIMEOUT_SECS: u32 = 290;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableOptions {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    pub limit: Option<u32>,
    pub continue_token: Option<String>,
}

impl TableOptions {
    pub fn list_params(&self) -> ListParams {
        let mut lp = ListParams::default();
        if let Some(labels) = &self.label_selector {
            lp = lp.labels(labels);
        }
        if let Some(fields) = &self.field_selector {
            lp = lp.fields(fields);
        }
        if let Some(limit) = self.limit {
            lp = lp.limit(limit);
        }
        if let Some(token) = &self.continue_token {
            lp = lp.continue_token(token);
        }
        lp
    }

    pub fn watch_params(&self) -> WatchParams {
        let mut wp = WatchParams::default().timeout(WATCH_TIMEOUT_SECS);
        if let Some(labels) = &self.label_selector {
            wp = wp.labels(labels);
        }
        if let Some(fields) = &self.field_selector {
            wp = wp.fields(fields);
        }
        wp
    }
}

#[derive(Clone)]
pub struct TableAdapter {
    client: Client,
}

impl TableAdapter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    #[tracing::instrument(skip(self, kind), fields(kind = %kind.key()))]
    pub async fn list(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        opts: &TableOptions,
    ) -> Result<RowList> {
        let req = list_request(kind, namespace, opts)?;
        let body = self.client.request_text(req).await?;
        decode_list(kind, &body)
    }

    /// Starts a watch whose events arrive one row at a time.
    #[tracing::instrument(skip(self, kind), fields(kind = %kind.key()))]
    pub fn watch(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        opts: &TableOptions,
        resource_version: &str,
    ) -> Result<RowWatch> {
        let req = watch_request(kind, namespace, opts, resource_version)?;
        let client = self.client.clone();

        Ok(RowWatch::start(kind.kind(), move |sink| async move {
            match client.request_stream(req).await {
                Ok(reader) => sink.forward(reader.lines()).await,
                Err(e) => {
                    sink.emit(RowEvent::Error(WatchStatus::transport_failure(e.to_string())))
                        .await;
                }
            }
        }))
    }
}

fn scoped<'a>(kind: &ResourceKind, namespace: Option<&'a str>) -> Option<&'a str> {
    namespace.filter(|_| kind.namespaced)
}

pub fn list_request(
    kind: &ResourceKind,
    namespace: Option<&str>,
    opts: &TableOptions,
) -> Result<http::Request<Vec<u8>>> {
    let url = DynamicObject::url_path(&kind.ar, scoped(kind, namespace));
    let req = kube::core::Request::new(url).list(&opts.list_params())?;
    negotiate(req)
}

pub fn watch_request(
    kind: &ResourceKind,
    namespace: Option<&str>,
    opts: &TableOptions,
    resource_version: &str,
) -> Result<http::Request<Vec<u8>>> {
    let url = DynamicObject::url_path(&kind.ar, scoped(kind, namespace));
    let req = kube::core::Request::new(url).watch(&opts.watch_params(), resource_version)?;
    negotiate(req)
}

/// Asks for the table rendering with the full object embedded in every row.
fn negotiate(mut req: http::Request<Vec<u8>>) -> Result<http::Request<Vec<u8>>> {
    let uri = req.uri().to_string();
    let sep = if uri.ends_with('?') || uri.ends_with('&') {
        ""
    } else if uri.contains('?') {
        "&"
    } else {
        "?"
    };
    *req.uri_mut() = format!("{uri}{sep}includeObject=Object")
        .parse()
        .map_err(|e: http::uri::InvalidUri| Error::Request(e.to_string()))?;
    req.headers_mut()
        .insert(ACCEPT, HeaderValue::from_static(TABLE_ACCEPT));
    Ok(req)
}

pub fn is_table(value: &Value) -> bool {
    value.get("kind").and_then(Value::as_str) == Some("Table")
}

#[derive(Debug, Default, Deserialize)]
struct PlainList {
    #[serde(default)]
    metadata: ListMeta,
    #[serde(default)]
    items: Vec<DynamicObject>,
}

/// Decodes a list response, whichever representation the server chose.
pub fn decode_list(kind: &ResourceKind, body: &str) -> Result<RowList> {
    let value: Value = serde_json::from_str(body)?;
    if is_table(&value) {
        let table: Table = serde_json::from_value(value)?;
        return rows_from_table(kind.kind(), table);
    }

    tracing::debug!(kind = kind.kind(), "server answered without a table, decoding objects");
    let list: PlainList = serde_json::from_value(value)?;
    let mut rows = rows_from_objects(kind.kind(), list.items);
    rows.continue_token = list.metadata.continue_.filter(|t| !t.is_empty());
    rows.resource_version = list.metadata.resource_version;
    Ok(rows)
}

#[tracing::instrument(skip(table), fields(rows = table.rows.len()))]
pub fn rows_from_table(kind: &str, table: Table) -> Result<RowList> {
    let columns: Vec<Column> = table.column_definitions.iter().map(Column::from).collect();
    let width = columns.len();

    let rows = table
        .rows
        .into_par_iter()
        .map(|row| row_from_table_row(kind, row, width))
        .collect::<Result<Vec<_>>>()?;

    Ok(RowList {
        columns,
        rows,
        continue_token: table.metadata.continue_.filter(|t| !t.is_empty()),
        resource_version: table.metadata.resource_version,
    })
}

fn row_from_table_row(kind: &str, row: TableRow, width: usize) -> Result<Row> {
    let meta = match row.object.as_ref().and_then(|o| o.get("metadata")) {
        Some(metadata) => serde_json::from_value::<ObjectMeta>(metadata.clone())
            .map_err(|e| Error::Decode(format!("row metadata: {e}")))?,
        None => ObjectMeta::default(),
    };

    let mut cells = row.cells;
    cells.resize(width, Value::Null);

    Ok(Row {
        meta,
        cells,
        kind: kind.to_string(),
    })
}

/// Name-only rows for the conventional decode path.
pub fn rows_from_objects(kind: &str, objects: Vec<DynamicObject>) -> RowList {
    let rows = objects
        .into_par_iter()
        .map(|obj| row_from_object(kind, obj))
        .collect();

    RowList {
        columns: vec![Column::named("Name")],
        rows,
        continue_token: None,
        resource_version: None,
    }
}

pub fn row_from_object(kind: &str, obj: DynamicObject) -> Row {
    let mut meta = obj.metadata;
    meta.managed_fields = None;
    let name = meta.name.clone().unwrap_or_default();
    Row {
        meta,
        cells: vec![Value::String(name)],
        kind: kind.to_string(),
    }
}
