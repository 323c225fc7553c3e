use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error envelope the backend returns alongside non-2xx statuses.
///
/// The REST layer answers with `{"detail": "..."}` for most failures and a
/// field -> messages map for validation errors; both are kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

impl ApiErrorBody {
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    /// Best human-readable summary of the body.
    pub fn message(&self) -> Option<String> {
        if let Some(detail) = self.detail.as_ref().filter(|d| !d.trim().is_empty()) {
            return Some(detail.clone());
        }
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|(field, value)| match value {
                Value::Array(items) => {
                    let joined = items
                        .iter()
                        .map(|item| match item {
                            Value::String(text) => text.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(" ");
                    format!("{field}: {joined}")
                }
                Value::String(text) => format!("{field}: {text}"),
                other => format!("{field}: {other}"),
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }
}
