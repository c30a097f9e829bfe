// src/assistant/mod.rs — Assistant-execution collaborator client

pub mod threads;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::UserIdentity;
use crate::core::system_prompt;
use crate::core::types::{FileRef, Run, RunState, Sender};
use crate::infra::config::{HistoryConfig, RunConfig};
use crate::infra::errors::VendoraError;
use threads::{ThreadMessage, ThreadStore};

/// Maximum attachment size accepted for upload.
pub const MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

/// Content types the workflow can ingest for retrieval.
const ALLOWED_ATTACHMENT_TYPES: [&str; 10] = [
    "image/jpeg",
    "image/png",
    "image/gif",
    "application/pdf",
    "text/plain",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "text/csv",
];

/// Validate an attachment before it is referenced from a message.
pub fn validate_attachment(content_type: &str, bytes: u64) -> Result<(), VendoraError> {
    if bytes > MAX_ATTACHMENT_BYTES {
        return Err(VendoraError::Config(
            "File size exceeds the 10MB attachment limit".into(),
        ));
    }
    if !ALLOWED_ATTACHMENT_TYPES.contains(&content_type) {
        return Err(VendoraError::Config(format!(
            "File type '{content_type}' is not supported"
        )));
    }
    Ok(())
}

/// Everything the run coordinator needs from the assistant-execution
/// collaborator: thread bookkeeping plus run start/poll.
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    /// Mint a fresh opaque thread handle.
    async fn create_thread(&self) -> Result<String, VendoraError>;

    /// Register a thread handle loaded from a persisted conversation.
    async fn adopt_thread(&self, thread_id: &str) -> Result<(), VendoraError>;

    /// Append the user's turn to the thread's in-process history.
    async fn add_user_message(
        &self,
        thread_id: &str,
        text: &str,
        attachments: Vec<FileRef>,
    ) -> Result<ThreadMessage, VendoraError>;

    /// Request a run over the thread's history plus its newest message.
    async fn start_run(&self, thread_id: &str, identity: &UserIdentity)
        -> Result<Run, VendoraError>;

    /// Poll target for the run lifecycle.
    async fn run_status(&self, thread_id: &str, run_id: &str) -> Result<Run, VendoraError>;

    /// Full thread history, oldest first.
    async fn thread_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, VendoraError>;

    /// Evict the oldest history entries per the configured tuning.
    /// Returns whether anything was evicted.
    async fn evict_oldest(&self, thread_id: &str) -> Result<bool, VendoraError>;

    /// Drop the most recent history entry (failed-send rollback).
    async fn rollback_last(&self, thread_id: &str) -> Result<(), VendoraError>;
}

#[derive(Debug, Deserialize)]
struct RunResponseWire {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Client for the n8n-hosted assistant workflow.
///
/// Thread history lives client-side (the workflow is stateless between
/// calls); a run is one webhook POST carrying the new message, the prior
/// history, the role-conditioned system prompt, and session identity.
pub struct WorkflowClient {
    client: reqwest::Client,
    assistant_url: String,
    bearer_token: Option<String>,
    history: HistoryConfig,
    threads: ThreadStore,
    runs: Mutex<HashMap<String, Run>>,
}

impl WorkflowClient {
    pub fn new(
        assistant_url: String,
        bearer_token: Option<String>,
        run_config: &RunConfig,
        history: HistoryConfig,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(run_config.request_timeout_secs))
            .build()
            .expect("reqwest client");
        Self {
            client,
            assistant_url,
            bearer_token,
            history,
            threads: ThreadStore::new(),
            runs: Mutex::new(HashMap::new()),
        }
    }

    fn record_run(&self, run: Run) -> Run {
        self.runs
            .lock()
            .expect("run map poisoned")
            .insert(run.id.clone(), run.clone());
        run
    }

    fn thread_or_err(&self, thread_id: &str) -> Result<(), VendoraError> {
        if self.threads.exists(thread_id) {
            Ok(())
        } else {
            Err(VendoraError::run_failure(format!(
                "Thread {thread_id} not found"
            )))
        }
    }
}

#[async_trait]
impl AssistantBackend for WorkflowClient {
    async fn create_thread(&self) -> Result<String, VendoraError> {
        Ok(self.threads.create())
    }

    async fn adopt_thread(&self, thread_id: &str) -> Result<(), VendoraError> {
        self.threads.adopt(thread_id);
        Ok(())
    }

    async fn add_user_message(
        &self,
        thread_id: &str,
        text: &str,
        attachments: Vec<FileRef>,
    ) -> Result<ThreadMessage, VendoraError> {
        self.threads
            .append(thread_id, Sender::User, text, attachments)
            .ok_or_else(|| VendoraError::run_failure(format!("Thread {thread_id} not found")))
    }

    async fn start_run(
        &self,
        thread_id: &str,
        identity: &UserIdentity,
    ) -> Result<Run, VendoraError> {
        self.thread_or_err(thread_id)?;

        let messages = self
            .threads
            .messages(thread_id)
            .unwrap_or_default();

        // The newest entry is the message being sent; everything before it
        // rides along as prior history.
        let Some(last) = messages.last() else {
            return Err(VendoraError::run_failure("No user message to process"));
        };
        if last.role != Sender::User {
            return Err(VendoraError::run_failure("No user message to process"));
        }

        let history: Vec<serde_json::Value> = messages[..messages.len() - 1]
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": match m.role {
                        Sender::User => "user",
                        Sender::Assistant => "assistant",
                    },
                    "content": m.content,
                })
            })
            .collect();

        let body = serde_json::json!({
            "message": last.content,
            "threadId": thread_id,
            "history": history,
            "systemPrompt": system_prompt::build_system_prompt(identity),
            "user": {
                "email": identity.email,
                "vendor_slug": identity.vendor_slug,
                "vendor_id": identity.vendor_id,
                "roles": identity.roles,
            },
        });

        let mut request = self.client.post(&self.assistant_url).json(&body);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let run_id = format!("run_{}", Uuid::new_v4().simple());

        let response = request.send().await.map_err(|e| {
            tracing::error!("assistant webhook transport failure: {e}");
            VendoraError::run_failure(e.to_string())
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(VendoraError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VendoraError::run_failure(format!("HTTP {status}: {body}")));
        }

        let wire: RunResponseWire = response
            .json()
            .await
            .map_err(|e| VendoraError::run_failure(format!("Malformed run response: {e}")))?;

        let run = if wire.success {
            let reply = wire.response.unwrap_or_default();
            self.threads
                .append(thread_id, Sender::Assistant, &reply, Vec::new());
            Run {
                id: run_id,
                thread_id: thread_id.to_string(),
                state: RunState::Completed,
                error: None,
            }
        } else {
            let detail = wire
                .error
                .or(wire.message)
                .unwrap_or_else(|| "workflow reported failure".into());
            Run {
                id: run_id,
                thread_id: thread_id.to_string(),
                state: RunState::Failed,
                error: Some(detail),
            }
        };

        Ok(self.record_run(run))
    }

    async fn run_status(&self, thread_id: &str, run_id: &str) -> Result<Run, VendoraError> {
        self.thread_or_err(thread_id)?;
        self.runs
            .lock()
            .expect("run map poisoned")
            .get(run_id)
            .cloned()
            .ok_or_else(|| {
                VendoraError::run_failure(format!("Run {run_id} not found in thread {thread_id}"))
            })
    }

    async fn thread_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, VendoraError> {
        self.threads
            .messages(thread_id)
            .ok_or_else(|| VendoraError::run_failure(format!("Thread {thread_id} not found")))
    }

    async fn evict_oldest(&self, thread_id: &str) -> Result<bool, VendoraError> {
        self.thread_or_err(thread_id)?;
        Ok(self.threads.evict_oldest(
            thread_id,
            self.history.evict_threshold,
            self.history.evict_count,
        ))
    }

    async fn rollback_last(&self, thread_id: &str) -> Result<(), VendoraError> {
        self.threads.pop_last(thread_id);
        Ok(())
    }
}
