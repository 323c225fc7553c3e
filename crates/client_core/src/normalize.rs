//! Turns backend document records into registry entries.

use chrono::Utc;
use serde_json::Value;
use shared::{
    domain::{Document, DocumentId},
    protocol::{DocRecord, DocumentListing},
};
use tracing::warn;

use crate::error::ClientError;

const UNKNOWN_TYPE: &str = "application/octet-stream";

/// Only a non-object is malformed; fields of the wrong type take defaults.
pub fn normalize_record(raw: Value) -> Result<Document, ClientError> {
    if !raw.is_object() {
        return Err(ClientError::MalformedRecord(format!(
            "expected an object, got {}",
            json_kind(&raw)
        )));
    }
    let record: DocRecord =
        serde_json::from_value(raw).map_err(|err| ClientError::MalformedRecord(err.to_string()))?;
    Ok(normalize_doc_record(record))
}

pub fn normalize_doc_record(record: DocRecord) -> Document {
    let id = record
        .id
        .map(|id| id.into_string())
        .filter(|id| !id.trim().is_empty())
        .map(DocumentId)
        .unwrap_or_else(DocumentId::generate);

    let path = non_blank(record.file);
    let name = non_blank(record.original_name)
        .or_else(|| path.as_deref().and_then(storage_name))
        .unwrap_or_else(|| id.0.clone());

    let doc_type = non_blank(record.doc_type).unwrap_or_else(|| infer_type(&name));

    Document {
        id,
        name,
        size: record.size.unwrap_or(0),
        doc_type,
        uploaded_at: record.uploaded_at.unwrap_or_else(Utc::now),
        path,
    }
}

/// Normalizes a whole listing: malformed records are dropped, duplicate ids
/// keep their newest entry, and the result is sorted newest first.
pub fn normalize_listing(listing: DocumentListing) -> Vec<Document> {
    let mut documents: Vec<Document> = listing
        .into_records()
        .into_iter()
        .filter_map(|raw| match normalize_record(raw) {
            Ok(document) => Some(document),
            Err(err) => {
                warn!("dropping document record: {err}");
                None
            }
        })
        .collect();

    sort_newest_first(&mut documents);
    let mut seen = std::collections::HashSet::new();
    documents.retain(|document| seen.insert(document.id.clone()));
    documents
}

fn sort_newest_first(documents: &mut [Document]) {
    documents.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
}

fn infer_type(name: &str) -> String {
    mime_guess::from_path(name)
        .first_raw()
        .unwrap_or(UNKNOWN_TYPE)
        .to_string()
}

/// Last path segment of a storage locator, which may be a URL or a
/// filesystem path.
fn storage_name(locator: &str) -> Option<String> {
    let without_query = locator.split(['?', '#']).next().unwrap_or_default();
    without_query
        .rsplit(['/', '\\'])
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
#[path = "tests/normalize_tests.rs"]
mod tests;
