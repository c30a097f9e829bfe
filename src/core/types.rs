// src/core/types.rs — Core domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util;

/// Maximum length of a conversation title derived from its first message.
pub const TITLE_SEED_LEN: usize = 30;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// A persisted conversation.
///
/// `id` is the persistence key; `thread_id` is the opaque handle that
/// correlates the conversation with remote run context. They are distinct
/// identifier spaces — never store one where the other is expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub thread_id: String,
    pub title: String,
    pub owner_email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(title_seed: &str, owner_email: &str, thread_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            thread_id,
            title: util::title_from_seed(title_seed, TITLE_SEED_LEN),
            owner_email: owner_email.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// An uploaded-file reference attached to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub bytes: u64,
}

/// A hosted CSV artifact attached to an assistant reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvRef {
    pub url: String,
    pub filename: String,
}

/// A persisted chat message. Immutable once written; ordered by
/// `created_at` within a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: Sender,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<FileRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv: Option<CsvRef>,
}

impl Message {
    pub fn user(conversation_id: Uuid, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            sender: Sender::User,
            text: text.into(),
            created_at: Utc::now(),
            attachments: Vec::new(),
            csv: None,
        }
    }

    pub fn assistant(conversation_id: Uuid, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            sender: Sender::Assistant,
            text: text.into(),
            created_at: Utc::now(),
            attachments: Vec::new(),
            csv: None,
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<FileRef>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_csv(mut self, csv: CsvRef) -> Self {
        self.csv = Some(csv);
        self
    }
}

/// Run lifecycle status reported by the assistant-execution collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    InProgress,
    Completed,
    Failed,
}

/// One execution of the remote assistant against a thread. Ephemeral —
/// exists only for the duration of a request/poll cycle and is never
/// persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    pub state: RunState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Tabular rows produced by a quick-action report, threaded through the
/// coordinator so the reply can carry an inline preview table.
pub type ProductRow = serde_json::Map<String, serde_json::Value>;

/// Structured payload a quick-action button hands to the coordinator
/// alongside the user's canned prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuickActionPayload {
    pub rows: Vec<ProductRow>,
    pub csv: Option<CsvRef>,
}
