use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use shared::{
    domain::DocumentId,
    protocol::{ChatRequest, ChatResponse, DocumentListing, IngestResponse},
};
use tokio::sync::Notify;

use crate::{backend::ChatBackend, backend::UploadFile, error::ClientError};

/// Pauses a fake call until the test releases it.
#[derive(Default)]
pub(crate) struct Gate {
    pub(crate) entered: Notify,
    pub(crate) release: Notify,
}

impl Gate {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

/// In-memory stand-in for the chat/document service.
#[derive(Default)]
pub(crate) struct FakeBackend {
    records: Mutex<Vec<Value>>,
    next_id: AtomicU64,
    enveloped: Mutex<bool>,
    list_failure: Mutex<Option<u16>>,
    list_override: Mutex<Option<DocumentListing>>,
    list_gate: Mutex<Option<Arc<Gate>>>,
    list_calls: AtomicU64,
    rejected_uploads: Mutex<HashSet<String>>,
    upload_calls: Mutex<Vec<String>>,
    naive_upload_records: Mutex<bool>,
    delete_failure: Mutex<Option<u16>>,
    delete_calls: Mutex<Vec<DocumentId>>,
    chat_failure: Mutex<Option<u16>>,
    chat_reply: Mutex<Option<ChatResponse>>,
    chat_gate: Mutex<Option<Arc<Gate>>>,
    chat_requests: Mutex<Vec<ChatRequest>>,
    ingest_failure: Mutex<Option<u16>>,
    ingest_sources: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_records(records: Vec<Value>) -> Arc<Self> {
        let backend = Self::default();
        *backend.records.lock().unwrap() = records;
        Arc::new(backend)
    }

    pub(crate) fn set_enveloped(&self, enveloped: bool) {
        *self.enveloped.lock().unwrap() = enveloped;
    }

    pub(crate) fn fail_list(&self, status: u16) {
        *self.list_failure.lock().unwrap() = Some(status);
    }

    pub(crate) fn set_listing(&self, listing: DocumentListing) {
        *self.list_override.lock().unwrap() = Some(listing);
    }

    pub(crate) fn gate_list(&self, gate: Arc<Gate>) {
        *self.list_gate.lock().unwrap() = Some(gate);
    }

    pub(crate) fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn reject_upload(&self, file_name: &str) {
        self.rejected_uploads
            .lock()
            .unwrap()
            .insert(file_name.to_string());
    }

    /// Created records carry an offset-less timestamp and a float size.
    pub(crate) fn answer_uploads_naively(&self) {
        *self.naive_upload_records.lock().unwrap() = true;
    }

    pub(crate) fn upload_calls(&self) -> Vec<String> {
        self.upload_calls.lock().unwrap().clone()
    }

    pub(crate) fn fail_delete(&self, status: u16) {
        *self.delete_failure.lock().unwrap() = Some(status);
    }

    pub(crate) fn delete_calls(&self) -> Vec<DocumentId> {
        self.delete_calls.lock().unwrap().clone()
    }

    pub(crate) fn fail_chat(&self, status: u16) {
        *self.chat_failure.lock().unwrap() = Some(status);
    }

    pub(crate) fn reply_with(&self, reply: ChatResponse) {
        *self.chat_reply.lock().unwrap() = Some(reply);
    }

    pub(crate) fn gate_chat(&self, gate: Arc<Gate>) {
        *self.chat_gate.lock().unwrap() = Some(gate);
    }

    pub(crate) fn chat_requests(&self) -> Vec<ChatRequest> {
        self.chat_requests.lock().unwrap().clone()
    }

    pub(crate) fn fail_ingest(&self, status: u16) {
        *self.ingest_failure.lock().unwrap() = Some(status);
    }

    pub(crate) fn set_ingest_sources(&self, sources: Vec<String>) {
        *self.ingest_sources.lock().unwrap() = sources;
    }
}

pub(crate) fn record(id: &str, name: &str, uploaded_at: &str) -> Value {
    json!({
        "id": id,
        "original_name": name,
        "file": format!("/media/uploads/2024/01/01/{name}"),
        "size": 10,
        "uploaded_at": uploaded_at,
    })
}

pub(crate) fn upload(name: &str) -> UploadFile {
    UploadFile::new(name, format!("contents of {name}").into_bytes())
}

fn bad_response(status: u16) -> ClientError {
    ClientError::BadResponse {
        status,
        detail: Some("scripted failure".to_string()),
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn list_documents(&self) -> Result<DocumentListing, ClientError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.list_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        if let Some(status) = *self.list_failure.lock().unwrap() {
            return Err(bad_response(status));
        }
        if let Some(listing) = self.list_override.lock().unwrap().clone() {
            return Ok(listing);
        }
        let records = self.records.lock().unwrap().clone();
        if *self.enveloped.lock().unwrap() {
            Ok(DocumentListing::Enveloped { results: records })
        } else {
            Ok(DocumentListing::Bare(records))
        }
    }

    async fn upload_document(&self, file: &UploadFile) -> Result<Value, ClientError> {
        self.upload_calls
            .lock()
            .unwrap()
            .push(file.file_name.clone());
        if self.rejected_uploads.lock().unwrap().contains(&file.file_name) {
            return Err(bad_response(400));
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let uploaded_at = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
            + Duration::minutes(n as i64);
        let created = if *self.naive_upload_records.lock().unwrap() {
            json!({
                "id": 100 + n,
                "original_name": file.file_name,
                "file": format!("/media/uploads/2024/06/01/{}", file.file_name),
                "size": file.bytes.len() as f64,
                "uploaded_at": uploaded_at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            })
        } else {
            json!({
                "id": 100 + n,
                "original_name": file.file_name,
                "file": format!("/media/uploads/2024/06/01/{}", file.file_name),
                "size": file.bytes.len(),
                "uploaded_at": uploaded_at.to_rfc3339(),
            })
        };
        self.records.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn delete_document(&self, id: &DocumentId) -> Result<(), ClientError> {
        self.delete_calls.lock().unwrap().push(id.clone());
        if let Some(status) = *self.delete_failure.lock().unwrap() {
            return Err(bad_response(status));
        }
        self.records.lock().unwrap().retain(|record| {
            let record_id = match &record["id"] {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            record_id != id.0
        });
        Ok(())
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        self.chat_requests.lock().unwrap().push(request.clone());
        let gate = self.chat_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        if let Some(status) = *self.chat_failure.lock().unwrap() {
            return Err(bad_response(status));
        }
        let reply = self.chat_reply.lock().unwrap().clone();
        Ok(reply.unwrap_or_else(|| ChatResponse {
            response: Some(format!("echo: {}", request.message)),
            used_documents: None,
            intent: Some("Direct".to_string()),
        }))
    }

    async fn ingest_existing(&self) -> Result<IngestResponse, ClientError> {
        if let Some(status) = *self.ingest_failure.lock().unwrap() {
            return Err(bad_response(status));
        }
        Ok(IngestResponse {
            ingested_sources: self.ingest_sources.lock().unwrap().clone(),
        })
    }
}
