use shared::domain::{Document, DocumentId};
use tracing::{debug, info, warn};

use crate::{
    backend::UploadFile,
    error::ClientError,
    normalize::{normalize_listing, normalize_record},
    session::{ChatSession, SessionEvent},
};

pub const UPLOAD_SUCCESS_STATUS: &str = "Documents uploaded successfully.";
pub const UPLOAD_FAILURE_STATUS: &str = "Document upload failed.";
pub const DELETE_SUCCESS_STATUS: &str = "Document deleted.";
pub const DELETE_FAILURE_STATUS: &str = "Failed to delete the document.";
pub const INGEST_FAILURE_STATUS: &str = "Failed to ingest the server's document folder.";

#[derive(Debug)]
pub struct UploadFailure {
    pub file_name: String,
    pub error: ClientError,
}

/// Result of one upload batch.
#[derive(Debug, Default)]
pub struct UploadReport {
    /// Documents the backend accepted, in upload order.
    pub uploaded: Vec<Document>,
    /// The file that stopped the batch; later files were not attempted.
    pub failure: Option<UploadFailure>,
    /// Files never sent because the batch stopped early.
    pub skipped: usize,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && self.skipped == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LoadTicket {
    epoch: u64,
    seq: u64,
}

impl ChatSession {
    /// Replaces the registry with the backend's current collection.
    ///
    /// A failed load empties the registry. Results of a load superseded by a
    /// newer load, an epoch change, or dispose are dropped.
    pub async fn load_documents(&self) {
        if self.is_disposed() {
            return;
        }
        let ticket = {
            let mut state = self.state();
            state.load_seq += 1;
            LoadTicket {
                epoch: state.epoch,
                seq: state.load_seq,
            }
        };

        let result = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return,
            result = self.backend.list_documents() => result,
        };

        let count = {
            let mut state = self.state();
            if self.is_disposed() || state.epoch != ticket.epoch || state.load_seq != ticket.seq {
                debug!(
                    epoch = ticket.epoch,
                    seq = ticket.seq,
                    "discarding stale document list"
                );
                return;
            }
            match result {
                Ok(listing) => {
                    state.documents = normalize_listing(listing);
                    info!(count = state.documents.len(), "documents loaded");
                }
                Err(err) => {
                    warn!("failed to load documents: {err}");
                    state.documents.clear();
                }
            }
            state.documents.len()
        };
        debug!(count, "registry replaced");
        self.emit(SessionEvent::DocumentsChanged);
    }

    /// Uploads files one at a time, stopping at the first failure.
    ///
    /// Accepted documents are prepended to the registry, then a new epoch
    /// starts and the registry is reloaded from the backend.
    pub async fn upload_documents(&self, files: Vec<UploadFile>) -> UploadReport {
        if files.is_empty() || self.is_disposed() {
            return UploadReport::default();
        }

        let report = self.upload_sequentially(files).await;
        if self.is_disposed() {
            return report;
        }

        let status = match &report.failure {
            Some(failure) => {
                warn!(
                    file = %failure.file_name,
                    skipped = report.skipped,
                    "upload batch stopped: {}",
                    failure.error
                );
                format!(
                    "{UPLOAD_FAILURE_STATUS} ({}: {})",
                    failure.file_name, failure.error
                )
            }
            None => UPLOAD_SUCCESS_STATUS.to_string(),
        };

        if report.uploaded.is_empty() {
            self.set_status(status);
            return report;
        }

        info!(count = report.uploaded.len(), "documents uploaded");
        self.prepend_documents(&report.uploaded);
        self.advance_epoch();
        self.set_status(status);
        self.load_documents().await;
        report
    }

    async fn upload_sequentially(&self, files: Vec<UploadFile>) -> UploadReport {
        let total = files.len();
        let mut report = UploadReport::default();
        for (index, file) in files.into_iter().enumerate() {
            if self.is_disposed() {
                report.skipped = total - index;
                break;
            }
            debug!(file = %file.file_name, size = file.bytes.len(), "uploading document");
            let result = match self.backend.upload_document(&file).await {
                Ok(raw) => normalize_record(raw),
                Err(err) => Err(err),
            };
            match result {
                Ok(document) => report.uploaded.push(document),
                Err(error) => {
                    report.failure = Some(UploadFailure {
                        file_name: file.file_name,
                        error,
                    });
                    report.skipped = total - index - 1;
                    break;
                }
            }
        }
        report
    }

    fn prepend_documents(&self, uploaded: &[Document]) {
        {
            let mut state = self.state();
            state
                .documents
                .retain(|existing| !uploaded.iter().any(|doc| doc.id == existing.id));
            let mut merged: Vec<Document> = uploaded.iter().rev().cloned().collect();
            merged.append(&mut state.documents);
            state.documents = merged;
        }
        self.emit(SessionEvent::DocumentsChanged);
    }

    /// Deletes a document remotely and, on success, locally. A failure leaves
    /// the registry untouched until the next full reload.
    pub async fn delete_document(&self, id: &DocumentId) -> bool {
        if id.is_empty() || self.is_disposed() {
            return false;
        }

        match self.backend.delete_document(id).await {
            Ok(()) => {
                let removed = {
                    let mut state = self.state();
                    let before = state.documents.len();
                    state.documents.retain(|document| &document.id != id);
                    before - state.documents.len()
                };
                info!(document_id = %id, removed, "document deleted");
                self.emit(SessionEvent::DocumentsChanged);
                self.set_status(DELETE_SUCCESS_STATUS);
                true
            }
            Err(err) => {
                warn!(document_id = %id, "failed to delete document: {err}");
                self.set_status(format!("{DELETE_FAILURE_STATUS} ({err})"));
                false
            }
        }
    }

    /// Asks the backend to ingest the files already sitting in its document
    /// folder, then reloads the registry.
    pub async fn ingest_existing(&self) -> Vec<String> {
        if self.is_disposed() {
            return Vec::new();
        }

        match self.backend.ingest_existing().await {
            Ok(response) => {
                let sources = response.ingested_sources;
                info!(count = sources.len(), "server-side documents ingested");
                self.set_status(format!("{} document(s) ingested.", sources.len()));
                self.load_documents().await;
                sources
            }
            Err(err) => {
                warn!("ingest request failed: {err}");
                self.set_status(format!("{INGEST_FAILURE_STATUS} ({err})"));
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
