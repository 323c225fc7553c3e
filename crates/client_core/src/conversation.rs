use serde_json::Value;
use shared::{
    domain::{Intent, Message, MessageId, ResponseMode},
    protocol::{ChatRequest, ChatResponse, HistoryEntry},
};
use tracing::{debug, info, warn};

use crate::{
    error::ClientError,
    session::{ChatSession, SessionEvent},
};

pub const FALLBACK_RESPONSE: &str = "Sorry, I could not come up with an answer.";
pub const SEND_FAILURE_RESPONSE: &str =
    "Sorry, I could not reach the assistant. Please try again in a moment.";
pub const CONNECTION_ERROR_STATUS: &str =
    "Connection error: unable to reach the server. Check that the backend is running.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Empty text, a send already in flight, or a disposed session.
    Skipped,
    Answered,
    /// The request failed and a fallback assistant entry was appended.
    Failed,
    /// The session was reset or disposed before the answer arrived.
    Discarded,
}

/// Clears the busy flag when a turn ends, however it ends.
struct LoadingGuard<'a> {
    session: &'a ChatSession,
    epoch: u64,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let cleared = {
            let mut state = self.session.state();
            let cleared = state.epoch == self.epoch && state.is_loading;
            if cleared {
                state.is_loading = false;
            }
            cleared
        };
        if cleared {
            self.session.emit(SessionEvent::LoadingChanged(false));
        }
    }
}

impl ChatSession {
    /// Runs one user turn: optimistic user entry, chat request, then exactly
    /// one assistant entry (the answer or a fallback).
    pub async fn send_message(&self, text: &str) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() || self.is_disposed() {
            return SendOutcome::Skipped;
        }

        let Some((request, epoch)) = self.begin_turn(text) else {
            debug!("send ignored while a previous message is in flight");
            return SendOutcome::Skipped;
        };
        let _loading = LoadingGuard {
            session: self,
            epoch,
        };
        self.emit(SessionEvent::TranscriptChanged);
        self.emit(SessionEvent::LoadingChanged(true));
        self.emit(SessionEvent::StatusChanged(String::new()));

        info!(
            mode = request.mode.as_str(),
            history_len = request.history.len(),
            "sending chat message"
        );
        let result = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            result = self.backend.chat(&request) => Some(result),
        };
        match result {
            Some(result) => self.finish_turn(epoch, result),
            None => SendOutcome::Discarded,
        }
    }

    fn begin_turn(&self, text: &str) -> Option<(ChatRequest, u64)> {
        let mut state = self.state();
        if state.is_loading {
            return None;
        }
        state.messages.push(Message::user(text));
        state.is_loading = true;
        state.status_message.clear();

        let history = state.messages.iter().map(HistoryEntry::from).collect();
        let request = ChatRequest {
            message: text.to_string(),
            mode: ResponseMode::from_rag_enabled(state.rag_enabled),
            history,
        };
        Some((request, state.epoch))
    }

    fn finish_turn(&self, epoch: u64, result: Result<ChatResponse, ClientError>) -> SendOutcome {
        let (outcome, status) = {
            let mut state = self.state();
            if state.epoch != epoch || self.is_disposed() {
                debug!(epoch, "discarding chat response from a previous session epoch");
                return SendOutcome::Discarded;
            }
            match result {
                Ok(response) => {
                    let message = assistant_message(response);
                    info!(
                        intent = %message.intent,
                        used_documents = message.used_documents.len(),
                        "assistant answered"
                    );
                    state.messages.push(message);
                    (SendOutcome::Answered, None)
                }
                Err(err) => {
                    warn!("chat request failed: {err}");
                    state.messages.push(Message::assistant(
                        MessageId::generate(),
                        SEND_FAILURE_RESPONSE,
                        Intent::Error,
                        Vec::new(),
                    ));
                    state.status_message = CONNECTION_ERROR_STATUS.to_string();
                    (SendOutcome::Failed, Some(CONNECTION_ERROR_STATUS.to_string()))
                }
            }
        };
        self.emit(SessionEvent::TranscriptChanged);
        if let Some(status) = status {
            self.emit(SessionEvent::StatusChanged(status));
        }
        outcome
    }
}

fn assistant_message(response: ChatResponse) -> Message {
    let content = response
        .response
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_RESPONSE.to_string());
    let intent = response
        .intent
        .filter(|tag| !tag.trim().is_empty())
        .map(|tag| Intent::from_tag(&tag))
        .unwrap_or(Intent::Direct);
    let used_documents = match response.used_documents {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(source) => Some(source),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    Message::assistant(MessageId::generate(), content, intent, used_documents)
}

#[cfg(test)]
#[path = "tests/conversation_tests.rs"]
mod tests;
