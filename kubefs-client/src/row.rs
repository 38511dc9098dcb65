//! Adapter-level row model: what the table protocol (or its fallback) yields
//! before any view options are applied.

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::serde_json::Value;

use crate::utils::cell_text;

/// One server-side column definition, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub type_: String,
    pub format: String,
    pub description: String,
    pub priority: i32,
}

impl Column {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_: "string".to_string(),
            format: String::new(),
            description: String::new(),
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Shown in the `normal` column set.
    pub fn default_visible(&self) -> bool {
        self.priority == 0
    }

    pub fn is_name(&self) -> bool {
        self.name.eq_ignore_ascii_case("name")
    }

    pub fn is_age(&self) -> bool {
        self.name.eq_ignore_ascii_case("age")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub meta: ObjectMeta,
    /// Aligned with the owning [`RowList::columns`].
    pub cells: Vec<Value>,
    /// Kind name of the object, e.g. `Pod`.
    pub kind: String,
}

impl Row {
    /// Object name, falling back to the `Name` cell when no object was embedded.
    pub fn name(&self, columns: &[Column]) -> String {
        if let Some(name) = self.meta.name.as_deref() {
            return name.to_string();
        }
        columns
            .iter()
            .position(Column::is_name)
            .and_then(|i| self.cells.get(i))
            .map(cell_text)
            .unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.meta.namespace.as_deref()
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.meta.creation_timestamp.as_ref().map(|t| t.0)
    }

    /// Identity within a listing: `namespace/name`, or `name` when cluster scoped.
    pub fn id(&self, columns: &[Column]) -> String {
        row_id(self.namespace(), &self.name(columns))
    }
}

pub fn row_id(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}/{name}"),
        _ => name.to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowList {
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
    pub continue_token: Option<String>,
    pub resource_version: Option<String>,
}

impl RowList {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.id(&self.columns)).collect()
    }
}
