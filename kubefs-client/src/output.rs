use k8s_openapi::serde_json;
use kube::api::DynamicObject;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    #[default]
    Yaml,
    Json,
    Pretty,
}

impl OutputMode {
    pub fn format<T: Serialize>(&self, value: &T) -> String {
        match self {
            OutputMode::Yaml => serde_yaml::to_string(value)
                .unwrap_or_else(|e| format!("YAML formatting error: {}", e)),
            OutputMode::Pretty => serde_json::to_string_pretty(value)
                .unwrap_or_else(|e| format!("Pretty formatting error: {}", e)),
            OutputMode::Json => serde_json::to_string(value)
                .unwrap_or_else(|e| format!("JSON formatting error: {}", e)),
        }
    }

    /// Renders an object for the content pane, without managed fields.
    pub fn format_object(&self, mut obj: DynamicObject) -> String {
        obj.metadata.managed_fields = None;
        self.format(&obj)
    }
}
