use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::{Document, Message, ResponseMode, Role};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for HistoryEntry {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub mode: ResponseMode,
    pub history: Vec<HistoryEntry>,
}

/// Body of a successful `POST /chat/`.
///
/// Every field is optional on the wire and a field of the wrong type reads as
/// absent. `used_documents` is kept as raw JSON because some backends send
/// `null` or a scalar instead of a list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default, deserialize_with = "string_or_none")]
    pub response: Option<String>,
    #[serde(default)]
    pub used_documents: Option<Value>,
    #[serde(default, deserialize_with = "string_or_none")]
    pub intent: Option<String>,
}

impl ChatResponse {
    /// Reads a successful chat body. Anything that is not an object yields
    /// an empty response.
    pub fn from_body(body: Value) -> Self {
        serde_json::from_value(body).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Text(String),
    Number(i64),
}

impl RecordId {
    pub fn into_string(self) -> String {
        match self {
            Self::Text(value) => value,
            Self::Number(value) => value.to_string(),
        }
    }
}

/// A document as the backend serializes it.
///
/// Decoding never fails on an object: fields of an unexpected type read as
/// absent and normalization fills in defaults. `name` and `path` are accepted
/// so a serialized [`Document`] decodes to the same record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocRecord {
    #[serde(
        default,
        deserialize_with = "lenient_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<RecordId>,
    #[serde(
        default,
        alias = "name",
        deserialize_with = "string_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub original_name: Option<String>,
    #[serde(
        default,
        alias = "path",
        deserialize_with = "string_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub file: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_size",
        skip_serializing_if = "Option::is_none"
    )]
    pub size: Option<u64>,
    #[serde(
        rename = "type",
        default,
        deserialize_with = "string_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub doc_type: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl From<&Document> for DocRecord {
    fn from(document: &Document) -> Self {
        Self {
            id: Some(RecordId::Text(document.id.0.clone())),
            original_name: Some(document.name.clone()),
            file: document.path.clone(),
            size: Some(document.size),
            doc_type: Some(document.doc_type.clone()),
            uploaded_at: Some(document.uploaded_at),
        }
    }
}

/// `GET /documents/` answers either with a paginated envelope or a bare list.
/// Records stay raw so a single bad entry can be dropped without failing the
/// whole body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentListing {
    Enveloped { results: Vec<Value> },
    Bare(Vec<Value>),
}

impl DocumentListing {
    pub fn into_records(self) -> Vec<Value> {
        match self {
            Self::Enveloped { results } => results,
            Self::Bare(records) => records,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    #[serde(default)]
    pub ingested_sources: Vec<String>,
}

fn string_or_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Some(text),
        _ => None,
    })
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<RecordId>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Some(RecordId::Text(text)),
        Some(Value::Number(number)) => Some(match number.as_i64() {
            Some(value) => RecordId::Number(value),
            None => RecordId::Text(number.to_string()),
        }),
        _ => None,
    })
}

/// Byte counts arrive as integers, integral floats (`100.0`) or numeric
/// strings.
fn lenient_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(number)) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|value| value.is_finite() && *value >= 0.0 && value.fract() == 0.0)
                .map(|value| value as u64)
        }),
        Some(Value::String(text)) => text.trim().parse().ok(),
        _ => None,
    })
}

/// RFC 3339 timestamps, or naive ones (no offset) read as UTC.
fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => parse_timestamp(text.trim()),
        _ => None,
    })
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = text.parse::<DateTime<Utc>>() {
        return Some(parsed);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
