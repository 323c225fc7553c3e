use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use shared::domain::{Document, Message};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::ChatBackend;

pub const WELCOME_MESSAGE: &str =
    "Hello! Ask me anything, or upload documents and switch on RAG mode to get answers grounded in them.";

const EVENT_CAPACITY: usize = 256;

/// Change notifications for whatever renders the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    TranscriptChanged,
    DocumentsChanged,
    StatusChanged(String),
    LoadingChanged(bool),
    ModeChanged(bool),
    Reset { epoch: u64 },
}

/// Read-only copy of the session state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub messages: Vec<Message>,
    pub documents: Vec<Document>,
    pub rag_enabled: bool,
    pub is_loading: bool,
    pub status_message: String,
    pub epoch: u64,
}

pub(crate) struct SessionState {
    pub(crate) messages: Vec<Message>,
    pub(crate) documents: Vec<Document>,
    pub(crate) rag_enabled: bool,
    pub(crate) is_loading: bool,
    pub(crate) status_message: String,
    pub(crate) epoch: u64,
    pub(crate) load_seq: u64,
}

impl SessionState {
    fn fresh(welcome_message: &str, epoch: u64, load_seq: u64) -> Self {
        Self {
            messages: vec![Message::welcome(welcome_message)],
            documents: Vec::new(),
            rag_enabled: false,
            is_loading: false,
            status_message: String::new(),
            epoch,
            load_seq,
        }
    }
}

/// Conversation and document controller for one mounted client.
///
/// All state lives behind a synchronous lock that is never held across an
/// await point; network calls run unlocked, so intents can interleave the way
/// they would on a single cooperative UI thread. Results are applied only if
/// the epoch they were issued under is still current.
pub struct ChatSession {
    pub(crate) backend: Arc<dyn ChatBackend>,
    inner: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    pub(crate) shutdown: CancellationToken,
    welcome_message: String,
}

impl ChatSession {
    /// Builds a session without touching the network.
    pub fn new(backend: Arc<dyn ChatBackend>) -> Arc<Self> {
        Self::with_welcome_message(backend, WELCOME_MESSAGE)
    }

    pub fn with_welcome_message(
        backend: Arc<dyn ChatBackend>,
        welcome_message: impl Into<String>,
    ) -> Arc<Self> {
        let welcome_message = welcome_message.into();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            backend,
            inner: Mutex::new(SessionState::fresh(&welcome_message, 0, 0)),
            events,
            shutdown: CancellationToken::new(),
            welcome_message,
        })
    }

    /// Builds a session and performs the initial document load.
    pub async fn create(backend: Arc<dyn ChatBackend>) -> Arc<Self> {
        let session = Self::new(backend);
        session.load_documents().await;
        session
    }

    /// Tears the session down. In-flight results are discarded and later
    /// intents are ignored.
    pub fn dispose(&self) {
        if !self.shutdown.is_cancelled() {
            info!("disposing chat session");
            self.shutdown.cancel();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state();
        SessionSnapshot {
            messages: state.messages.clone(),
            documents: state.documents.clone(),
            rag_enabled: state.rag_enabled,
            is_loading: state.is_loading,
            status_message: state.status_message.clone(),
            epoch: state.epoch,
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state().messages.clone()
    }

    pub fn documents(&self) -> Vec<Document> {
        self.state().documents.clone()
    }

    pub fn document_count(&self) -> usize {
        self.state().documents.len()
    }

    pub fn has_documents(&self) -> bool {
        self.document_count() > 0
    }

    pub fn rag_enabled(&self) -> bool {
        self.state().rag_enabled
    }

    pub fn is_loading(&self) -> bool {
        self.state().is_loading
    }

    pub fn status_message(&self) -> String {
        self.state().status_message.clone()
    }

    pub fn epoch(&self) -> u64 {
        self.state().epoch
    }

    pub fn set_rag_enabled(&self, enabled: bool) {
        if self.is_disposed() {
            return;
        }
        let changed = {
            let mut state = self.state();
            let changed = state.rag_enabled != enabled;
            state.rag_enabled = enabled;
            changed
        };
        if changed {
            debug!(rag_enabled = enabled, "response mode changed");
            self.emit(SessionEvent::ModeChanged(enabled));
        }
    }

    /// Starts a new epoch and reloads documents for it.
    pub async fn refresh(&self) {
        self.advance_epoch();
        self.load_documents().await;
    }

    /// Replaces the transcript with a fresh welcome entry and resets the mode,
    /// loading and status fields. Documents are kept until the next load
    /// replaces them.
    pub(crate) fn advance_epoch(&self) -> u64 {
        let epoch = {
            let mut state = self.state();
            let documents = std::mem::take(&mut state.documents);
            let next = SessionState::fresh(&self.welcome_message, state.epoch + 1, state.load_seq);
            *state = SessionState { documents, ..next };
            state.epoch
        };
        info!(epoch, "session reset");
        self.emit(SessionEvent::Reset { epoch });
        self.emit(SessionEvent::TranscriptChanged);
        self.emit(SessionEvent::ModeChanged(false));
        self.emit(SessionEvent::LoadingChanged(false));
        epoch
    }

    pub(crate) fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        self.state().status_message = status.clone();
        self.emit(SessionEvent::StatusChanged(status));
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
