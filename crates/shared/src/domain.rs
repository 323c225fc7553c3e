use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(MessageId);
id_newtype!(DocumentId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// How the backend should answer a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    Rag,
    #[default]
    Direct,
}

impl ResponseMode {
    pub fn from_rag_enabled(rag_enabled: bool) -> Self {
        if rag_enabled {
            Self::Rag
        } else {
            Self::Direct
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rag => "rag",
            Self::Direct => "direct",
        }
    }
}

/// Classification attached to a transcript entry.
///
/// Assistant entries carry the tag the backend returned; user and welcome
/// entries carry a local sentinel. Tags the client does not know are kept
/// verbatim in [`Intent::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Intent {
    Rag,
    Direct,
    NoDocuments,
    Error,
    Welcome,
    UserInput,
    Other(String),
}

impl Intent {
    pub fn from_tag(tag: &str) -> Self {
        let normalized = tag.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "rag" => Self::Rag,
            "direct" => Self::Direct,
            "no_documents" | "nodocuments" => Self::NoDocuments,
            "error" => Self::Error,
            "welcome" => Self::Welcome,
            "user" | "user_input" => Self::UserInput,
            _ => Self::Other(tag.trim().to_string()),
        }
    }

    pub fn as_tag(&self) -> &str {
        match self {
            Self::Rag => "rag",
            Self::Direct => "direct",
            Self::NoDocuments => "no_documents",
            Self::Error => "error",
            Self::Welcome => "welcome",
            Self::UserInput => "user_input",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl From<String> for Intent {
    fn from(value: String) -> Self {
        Self::from_tag(&value)
    }
}

impl From<Intent> for String {
    fn from(value: Intent) -> Self {
        value.as_tag().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub intent: Intent,
    #[serde(default)]
    pub used_documents: Vec<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            intent: Intent::UserInput,
            used_documents: Vec::new(),
        }
    }

    pub fn assistant(
        id: MessageId,
        content: impl Into<String>,
        intent: Intent,
        used_documents: Vec<String>,
    ) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            intent,
            used_documents,
        }
    }

    pub fn welcome(content: impl Into<String>) -> Self {
        Self::assistant(MessageId::generate(), content, Intent::Welcome, Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}
