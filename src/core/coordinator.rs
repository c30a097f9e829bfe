// src/core/coordinator.rs — Conversation/run lifecycle coordinator
//
// Sequences one send: resolve the conversation and thread handle, submit
// the user turn, start a remote run, poll it to completion, extract the
// reply, persist the exchange. States, in order:
//
//   IDLE -> THREAD_READY -> MESSAGE_SUBMITTED -> RUN_STARTED -> POLLING
//        -> COMPLETED | FAILED

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use crate::assistant::AssistantBackend;
use crate::auth::UserIdentity;
use crate::core::types::{
    Conversation, CsvRef, FileRef, Message, QuickActionPayload, Run, RunState,
};
use crate::infra::config::{HistoryConfig, RunConfig};
use crate::infra::errors::VendoraError;
use crate::render;
use crate::store::ConversationStore;

/// Explicit session context threaded through every send — nothing in the
/// coordinator reaches for ambient session state.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub identity: UserIdentity,
}

/// Coordinator tuning derived from config.
#[derive(Debug, Clone)]
pub struct CoordinatorTuning {
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub max_retries: u32,
}

impl CoordinatorTuning {
    pub fn from_config(run: &RunConfig, history: &HistoryConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(run.poll_interval_secs),
            poll_timeout: Duration::from_secs(run.poll_timeout_secs),
            max_retries: history.max_retries,
        }
    }
}

impl Default for CoordinatorTuning {
    fn default() -> Self {
        Self::from_config(&RunConfig::default(), &HistoryConfig::default())
    }
}

/// What one send produced. `reply` is `None` when the run completed but no
/// assistant entry newer than the submitted message existed ("no
/// response") — the user turn is persisted alone in that case.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub conversation: Conversation,
    pub user_message: Message,
    pub reply: Option<Message>,
    pub retried: bool,
}

pub struct Coordinator {
    assistant: Arc<dyn AssistantBackend>,
    store: Arc<dyn ConversationStore>,
    tuning: CoordinatorTuning,
    // Per-conversation mutual exclusion: one in-flight send per
    // conversation, enforced here rather than by a disabled input
    // affordance.
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl Coordinator {
    pub fn new(
        assistant: Arc<dyn AssistantBackend>,
        store: Arc<dyn ConversationStore>,
        tuning: CoordinatorTuning,
    ) -> Self {
        Self {
            assistant,
            store,
            tuning,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn conversation_lock(&self, id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .expect("lock map poisoned")
            .entry(id)
            .or_default()
            .clone()
    }

    /// Run the full send lifecycle. On a token-limit failure the two oldest
    /// history entries are evicted (when the history is long enough), the
    /// local user turn is rolled back, and the send restarts from the top —
    /// at most `max_retries` times; a repeat failure propagates as
    /// terminal.
    pub async fn send(
        &self,
        ctx: &SessionContext,
        active: Option<Conversation>,
        text: &str,
        attachments: Vec<FileRef>,
        quick_action: Option<QuickActionPayload>,
    ) -> Result<SendOutcome, VendoraError> {
        let text = text.trim();
        if text.is_empty() && attachments.is_empty() {
            return Err(VendoraError::Config("Nothing to send".into()));
        }

        // IDLE -> THREAD_READY
        let conversation = match active {
            Some(conversation) => {
                self.assistant.adopt_thread(&conversation.thread_id).await?;
                conversation
            }
            None => {
                let thread_id = self.assistant.create_thread().await?;
                let conversation = Conversation::new(text, &ctx.identity.email, thread_id);
                self.store.upsert_conversation(&conversation).await?;
                conversation
            }
        };

        let lock = self.conversation_lock(conversation.id);
        let _guard = lock.lock().await;

        let mut attempt: u32 = 0;
        loop {
            let allow_retry = attempt < self.tuning.max_retries;
            match self
                .try_send(
                    ctx,
                    &conversation,
                    text,
                    attachments.clone(),
                    &quick_action,
                    allow_retry,
                )
                .await
            {
                Ok((user_message, reply)) => {
                    let mut conversation = conversation;
                    if reply.is_some() {
                        conversation.touch();
                        self.store.upsert_conversation(&conversation).await?;
                    }
                    return Ok(SendOutcome {
                        conversation,
                        user_message,
                        reply,
                        retried: attempt > 0,
                    });
                }
                Err(e) if e.is_token_limited() && attempt < self.tuning.max_retries => {
                    attempt += 1;
                    let evicted = self.assistant.evict_oldest(&conversation.thread_id).await?;
                    tracing::warn!(
                        conversation = %conversation.id,
                        evicted,
                        "token limit hit, retrying send ({attempt}/{})",
                        self.tuning.max_retries
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One pass through MESSAGE_SUBMITTED -> RUN_STARTED -> POLLING ->
    /// COMPLETED/FAILED. Returns the user message and the extracted reply.
    /// `allow_retry` marks whether a token-limit failure will be resent by
    /// the caller (roll back the local turn) or is terminal (persist the
    /// user turn alone, like any other run failure).
    async fn try_send(
        &self,
        ctx: &SessionContext,
        conversation: &Conversation,
        text: &str,
        attachments: Vec<FileRef>,
        quick_action: &Option<QuickActionPayload>,
        allow_retry: bool,
    ) -> Result<(Message, Option<Message>), VendoraError> {
        // THREAD_READY -> MESSAGE_SUBMITTED
        let submitted = self
            .assistant
            .add_user_message(&conversation.thread_id, text, attachments.clone())
            .await?;

        let user_message = Message {
            id: Uuid::new_v4(),
            conversation_id: conversation.id,
            sender: crate::core::types::Sender::User,
            text: text.to_string(),
            created_at: submitted.created_at,
            attachments,
            csv: None,
        };

        // MESSAGE_SUBMITTED -> RUN_STARTED -> POLLING
        let run_result = async {
            let run = self
                .assistant
                .start_run(&conversation.thread_id, &ctx.identity)
                .await?;
            self.poll_run(&conversation.thread_id, run).await
        }
        .await;

        if let Err(e) = run_result {
            if e.is_token_limited() && allow_retry {
                // Roll the local turn back so the resend does not duplicate
                // it in the thread history.
                let _ = self.assistant.rollback_last(&conversation.thread_id).await;
                return Err(e);
            }
            if e.is_unauthorized() {
                return Err(e);
            }
            // Terminal run failure: the user's turn is still recorded, just
            // without a paired reply.
            self.store
                .append_messages(conversation.id, std::slice::from_ref(&user_message))
                .await?;
            return Err(e);
        }

        // COMPLETED: pick the newest assistant entry strictly after the
        // submitted message — scanning backwards guards against re-reading
        // a welcome message or an older turn.
        let history = self
            .assistant
            .thread_messages(&conversation.thread_id)
            .await?;
        let reply_entry = history
            .iter()
            .rev()
            .find(|m| {
                m.role == crate::core::types::Sender::Assistant
                    && m.created_at > submitted.created_at
            })
            .cloned();

        let Some(entry) = reply_entry else {
            tracing::error!(
                thread = %conversation.thread_id,
                history_len = history.len(),
                "run completed but no assistant entry newer than the submitted message"
            );
            self.store
                .append_messages(conversation.id, std::slice::from_ref(&user_message))
                .await?;
            return Ok((user_message, None));
        };

        let reply = self.build_reply(conversation, &entry, quick_action);

        self.store
            .append_messages(
                conversation.id,
                &[user_message.clone(), reply.clone()],
            )
            .await?;

        Ok((user_message, Some(reply)))
    }

    /// POLLING: query run status at the configured interval until the run
    /// leaves `InProgress`, or the poll budget runs out.
    async fn poll_run(&self, thread_id: &str, mut run: Run) -> Result<Run, VendoraError> {
        let started = Instant::now();
        loop {
            match run.state {
                RunState::Completed => return Ok(run),
                RunState::Failed => {
                    let detail = run.error.unwrap_or_else(|| "Unknown error".into());
                    return Err(VendoraError::run_failure(detail));
                }
                RunState::InProgress => {
                    if started.elapsed() >= self.tuning.poll_timeout {
                        return Err(VendoraError::RunTimeout {
                            waited_secs: self.tuning.poll_timeout.as_secs(),
                        });
                    }
                    tokio::time::sleep(self.tuning.poll_interval).await;
                    run = self.assistant.run_status(thread_id, &run.id).await?;
                }
            }
        }
    }

    fn build_reply(
        &self,
        conversation: &Conversation,
        entry: &crate::assistant::threads::ThreadMessage,
        quick_action: &Option<QuickActionPayload>,
    ) -> Message {
        let mut text = if entry.content.is_empty() {
            "I'm not sure how to respond to that.".to_string()
        } else {
            entry.content.clone()
        };

        let mut csv: Option<CsvRef> = None;
        if let Some(payload) = quick_action {
            // Quick-action rows get an inline preview regardless of what
            // the remote assistant returned.
            if !payload.rows.is_empty() {
                text.push_str(&render::products_table(&payload.rows));
            }
            csv = payload.csv.clone();
        }

        Message {
            id: Uuid::new_v4(),
            conversation_id: conversation.id,
            sender: crate::core::types::Sender::Assistant,
            text,
            created_at: entry.created_at,
            attachments: entry.attachments.clone(),
            csv,
        }
    }

    /// Load a persisted conversation's messages (ascending `created_at`)
    /// and re-register its thread handle for subsequent sends.
    pub async fn open_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<Vec<Message>, VendoraError> {
        self.assistant.adopt_thread(&conversation.thread_id).await?;
        self.store.conversation_messages(conversation.id).await
    }

    pub async fn list_conversations(
        &self,
        owner_email: &str,
    ) -> Result<Vec<Conversation>, VendoraError> {
        self.store.list_conversations(owner_email).await
    }

    pub async fn delete_conversation(&self, conversation_id: Uuid) -> Result<(), VendoraError> {
        self.store.delete_conversation(conversation_id).await
    }
}
