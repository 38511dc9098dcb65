use chrono::{DateTime, Duration, Utc};
use k8s_openapi::serde_json::Value;
use serde::Serialize;

/// Leading marker on the first cell of rows that can be entered.
pub const PATH_GLYPH: &str = "▸ ";

/// Rendering hint attached to a cell; the renderer maps it to a color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Hint {
    Header,
    Success,
    Pending,
    Warning,
    Error,
    Dim,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<Hint>,
}

impl Cell {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            hint: None,
        }
    }

    pub fn hinted(value: impl Into<String>, hint: Option<Hint>) -> Self {
        Self {
            value: value.into(),
            hint,
        }
    }

    /// A cell whose hint is derived from well-known status words.
    pub fn status(value: impl Into<String>) -> Self {
        let value = value.into();
        let hint = semantic_hint(&value);
        Self { value, hint }
    }
}

pub fn semantic_hint(value: &str) -> Option<Hint> {
    match value {
        "Running" | "Ready" | "Active" | "Bound" | "Available" | "Completed" | "Succeeded"
        | "True" | "true" => Some(Hint::Success),
        "Pending" | "ContainerCreating" | "PodInitializing" | "Init" | "Waiting" => {
            Some(Hint::Pending)
        }
        "Terminating" | "Released" | "Unknown" | "NotReady" => Some(Hint::Warning),
        "Failed" | "Error" | "CrashLoopBackOff" | "ImagePullBackOff" | "ErrImagePull"
        | "OOMKilled" | "Evicted" | "Lost" | "False" | "false" => Some(Hint::Error),
        _ if value.starts_with("Init:") => Some(Hint::Pending),
        _ => None,
    }
}

/// Human readable span between `ts` and `now`, kubectl style.
pub fn time_since(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let total_secs = now.signed_duration_since(ts).num_seconds();
    if total_secs < 0 {
        return "0s".to_string();
    }

    let days = total_secs / 86400;
    let hours = (total_secs % 86400) / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if days > 365 {
        format!("{}y{}d", days / 365, days % 365)
    } else if days > 7 {
        format!("{}d", days)
    } else if days > 0 {
        format!("{}d{}h", days, hours)
    } else if hours > 0 {
        format!("{}h{}m", hours, mins)
    } else if mins > 0 {
        format!("{}m{}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

pub fn age_cell(ts: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Cell {
    match ts {
        Some(ts) => {
            let fresh = now.signed_duration_since(ts) < Duration::minutes(10);
            Cell::hinted(time_since(ts, now), fresh.then_some(Hint::Success))
        }
        None => Cell::default(),
    }
}

/// Flattens a table cell into display text.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

pub fn strip_glyph(value: &str) -> &str {
    value.strip_prefix(PATH_GLYPH).unwrap_or(value)
}
