//! Wire shapes of `meta.k8s.io/v1` tables and watch events.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ListMeta;
use k8s_openapi::serde_json::Value;
use serde::{Deserialize, Serialize};

use crate::row::Column;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default)]
    pub column_definitions: Vec<TableColumnDefinition>,
    #[serde(default)]
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableColumnDefinition {
    pub name: String,
    #[serde(rename = "type", default)]
    pub type_: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: i32,
}

impl From<&TableColumnDefinition> for Column {
    fn from(def: &TableColumnDefinition) -> Self {
        Column {
            name: def.name.clone(),
            type_: def.type_.clone(),
            format: def.format.clone(),
            description: def.description.clone(),
            priority: def.priority,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableRow {
    #[serde(default)]
    pub cells: Vec<Value>,
    /// `PartialObjectMetadata` or the full object, depending on `includeObject`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Value>,
}

/// One line of a watch response before it is split into rows.
#[derive(Debug, Clone, Deserialize)]
pub struct RawWatchEvent {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub object: Value,
}

/// Status shaped payload carried by `ERROR` watch events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchStatus {
    pub status: String,
    pub message: String,
    pub reason: String,
    pub code: u16,
    /// The event object as the server sent it, `details` and all. Null for
    /// failures raised locally.
    #[serde(skip)]
    pub raw: Value,
}

impl WatchStatus {
    pub fn decode_failure(message: impl Into<String>) -> Self {
        Self {
            status: "Failure".to_string(),
            message: message.into(),
            reason: "DecodeError".to_string(),
            code: 500,
            raw: Value::Null,
        }
    }

    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self {
            status: "Failure".to_string(),
            message: message.into(),
            reason: "StreamError".to_string(),
            code: 503,
            raw: Value::Null,
        }
    }
}
