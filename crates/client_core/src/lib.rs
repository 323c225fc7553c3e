//! Client-side controller for the RAG chat service: the conversation
//! transcript, the mirrored document registry and the response-mode flag.

pub mod backend;
pub mod config;
pub mod conversation;
pub mod error;
pub mod normalize;
pub mod registry;
pub mod session;

pub use backend::{ChatBackend, HttpBackend, UploadFile};
pub use config::{load_settings, normalize_base_url, ClientSettings};
pub use conversation::SendOutcome;
pub use error::ClientError;
pub use registry::{UploadFailure, UploadReport};
pub use session::{ChatSession, SessionEvent, SessionSnapshot};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
