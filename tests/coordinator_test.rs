// tests/coordinator_test.rs — Integration test: run coordinator with mock collaborators

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use uuid::Uuid;

use vendora::assistant::threads::{ThreadMessage, ThreadStore};
use vendora::assistant::AssistantBackend;
use vendora::auth::UserIdentity;
use vendora::core::coordinator::{Coordinator, CoordinatorTuning, SessionContext};
use vendora::core::types::{
    Conversation, Message, QuickActionPayload, Run, RunState, Sender,
};
use vendora::infra::errors::VendoraError;
use vendora::store::ConversationStore;

/// What the next run should do.
#[derive(Clone)]
enum RunScript {
    /// Append a reply and complete immediately.
    Reply(&'static str),
    /// Stay in progress for N polls, then append a reply and complete.
    CompleteAfterPolls(u32, &'static str),
    /// Fail with the given error text.
    FailWith(&'static str),
    /// Complete without appending anything new.
    NoNewReply,
    /// Reject the session.
    Http401,
}

/// A mock assistant backend driven by a script of run behaviors.
struct MockAssistant {
    threads: ThreadStore,
    script: Mutex<VecDeque<RunScript>>,
    runs: Mutex<HashMap<String, Run>>,
    pending: Mutex<HashMap<String, (u32, &'static str)>>,
    runs_started: Mutex<u32>,
    evict_threshold: usize,
    evict_count: usize,
}

impl MockAssistant {
    fn new(script: Vec<RunScript>) -> Self {
        Self {
            threads: ThreadStore::new(),
            script: Mutex::new(script.into()),
            runs: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            runs_started: Mutex::new(0),
            evict_threshold: 10,
            evict_count: 2,
        }
    }

    fn runs_started(&self) -> u32 {
        *self.runs_started.lock().unwrap()
    }

    fn append_reply(&self, thread_id: &str, text: &str) {
        // Keep the reply timestamp strictly after the submitted message.
        std::thread::sleep(std::time::Duration::from_millis(2));
        self.threads
            .append(thread_id, Sender::Assistant, text, Vec::new());
    }

    fn record(&self, run: Run) -> Run {
        self.runs
            .lock()
            .unwrap()
            .insert(run.id.clone(), run.clone());
        run
    }
}

#[async_trait]
impl AssistantBackend for MockAssistant {
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
        attachments: Vec<vendora::core::types::FileRef>,
    ) -> Result<ThreadMessage, VendoraError> {
        self.threads
            .append(thread_id, Sender::User, text, attachments)
            .ok_or_else(|| VendoraError::run_failure("thread not found"))
    }

    async fn start_run(
        &self,
        thread_id: &str,
        _identity: &UserIdentity,
    ) -> Result<Run, VendoraError> {
        *self.runs_started.lock().unwrap() += 1;
        let action = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .expect("script exhausted");
        let run_id = format!("run_{}", Uuid::new_v4().simple());

        match action {
            RunScript::Reply(text) => {
                self.append_reply(thread_id, text);
                Ok(self.record(Run {
                    id: run_id,
                    thread_id: thread_id.into(),
                    state: RunState::Completed,
                    error: None,
                }))
            }
            RunScript::CompleteAfterPolls(polls, text) => {
                self.pending
                    .lock()
                    .unwrap()
                    .insert(run_id.clone(), (polls, text));
                Ok(self.record(Run {
                    id: run_id,
                    thread_id: thread_id.into(),
                    state: RunState::InProgress,
                    error: None,
                }))
            }
            RunScript::FailWith(text) => Ok(self.record(Run {
                id: run_id,
                thread_id: thread_id.into(),
                state: RunState::Failed,
                error: Some(text.into()),
            })),
            RunScript::NoNewReply => Ok(self.record(Run {
                id: run_id,
                thread_id: thread_id.into(),
                state: RunState::Completed,
                error: None,
            })),
            RunScript::Http401 => Err(VendoraError::Unauthorized),
        }
    }

    async fn run_status(&self, thread_id: &str, run_id: &str) -> Result<Run, VendoraError> {
        let mut pending = self.pending.lock().unwrap();
        if let Some((polls_left, text)) = pending.get_mut(run_id) {
            if *polls_left > 1 {
                *polls_left -= 1;
            } else {
                let text = *text;
                pending.remove(run_id);
                drop(pending);
                self.append_reply(thread_id, text);
                let mut runs = self.runs.lock().unwrap();
                let run = runs.get_mut(run_id).unwrap();
                run.state = RunState::Completed;
                return Ok(run.clone());
            }
        }
        Ok(self.runs.lock().unwrap().get(run_id).unwrap().clone())
    }

    async fn thread_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, VendoraError> {
        self.threads
            .messages(thread_id)
            .ok_or_else(|| VendoraError::run_failure("thread not found"))
    }

    async fn evict_oldest(&self, thread_id: &str) -> Result<bool, VendoraError> {
        Ok(self
            .threads
            .evict_oldest(thread_id, self.evict_threshold, self.evict_count))
    }

    async fn rollback_last(&self, thread_id: &str) -> Result<(), VendoraError> {
        self.threads.pop_last(thread_id);
        Ok(())
    }
}

/// In-memory conversation store double.
#[derive(Default)]
struct MemStore {
    conversations: Mutex<HashMap<Uuid, Conversation>>,
    messages: Mutex<Vec<Message>>,
}

impl MemStore {
    fn message_senders(&self) -> Vec<Sender> {
        self.messages.lock().unwrap().iter().map(|m| m.sender).collect()
    }
}

#[async_trait]
impl ConversationStore for MemStore {
    async fn list_conversations(
        &self,
        owner_email: &str,
    ) -> Result<Vec<Conversation>, VendoraError> {
        let mut conversations: Vec<Conversation> = self
            .conversations
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.owner_email == owner_email)
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn upsert_conversation(&self, conversation: &Conversation) -> Result<(), VendoraError> {
        self.conversations
            .lock()
            .unwrap()
            .insert(conversation.id, conversation.clone());
        Ok(())
    }

    async fn append_messages(
        &self,
        _conversation_id: Uuid,
        messages: &[Message],
    ) -> Result<(), VendoraError> {
        self.messages.lock().unwrap().extend_from_slice(messages);
        Ok(())
    }

    async fn conversation_messages(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<Message>, VendoraError> {
        let mut messages: Vec<Message> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    async fn delete_conversation(&self, conversation_id: Uuid) -> Result<(), VendoraError> {
        self.messages
            .lock()
            .unwrap()
            .retain(|m| m.conversation_id != conversation_id);
        self.conversations.lock().unwrap().remove(&conversation_id);
        Ok(())
    }

    async fn delete_oldest_messages(
        &self,
        conversation_id: Uuid,
        count: usize,
    ) -> Result<(), VendoraError> {
        let mut messages = self.messages.lock().unwrap();
        let mut removed = 0;
        messages.retain(|m| {
            if m.conversation_id == conversation_id && removed < count {
                removed += 1;
                false
            } else {
                true
            }
        });
        Ok(())
    }
}

fn vendor_ctx() -> SessionContext {
    SessionContext {
        identity: UserIdentity {
            email: "vendor@example.com".into(),
            vendor_slug: Some("vendor-co".into()),
            vendor_id: 7,
            roles: ["vendor".to_string()].into_iter().collect(),
        },
    }
}

fn fast_tuning() -> CoordinatorTuning {
    CoordinatorTuning {
        poll_interval: std::time::Duration::from_millis(5),
        ..CoordinatorTuning::default()
    }
}

fn harness(script: Vec<RunScript>) -> (Arc<MockAssistant>, Arc<MemStore>, Coordinator) {
    let assistant = Arc::new(MockAssistant::new(script));
    let store = Arc::new(MemStore::default());
    let coordinator = Coordinator::new(assistant.clone(), store.clone(), fast_tuning());
    (assistant, store, coordinator)
}

#[tokio::test]
async fn test_new_chat_creates_conversation_and_persists_exchange() {
    let (_assistant, store, coordinator) = harness(vec![RunScript::Reply("Here are your products.")]);
    let ctx = vendor_ctx();

    let outcome = coordinator
        .send(&ctx, None, "Show me all products", Vec::new(), None)
        .await
        .unwrap();

    let conversation = &outcome.conversation;
    assert_eq!(conversation.owner_email, "vendor@example.com");
    assert_eq!(conversation.title, "Show me all products");
    // Persistence id and remote thread handle live in distinct spaces.
    assert_ne!(conversation.id.to_string(), conversation.thread_id);

    let reply = outcome.reply.expect("reply");
    assert_eq!(reply.text, "Here are your products.");
    assert_eq!(reply.conversation_id, conversation.id);

    // Exactly one user and one assistant message, in that order.
    assert_eq!(store.message_senders(), vec![Sender::User, Sender::Assistant]);
    assert_eq!(store.conversations.lock().unwrap().len(), 1);

    let persisted = store.conversation_messages(conversation.id).await.unwrap();
    assert_eq!(persisted[0].text, "Show me all products");
    assert!(persisted[0].created_at < persisted[1].created_at);
}

#[tokio::test]
async fn test_followup_reuses_conversation_and_thread() {
    let (_assistant, store, coordinator) =
        harness(vec![RunScript::Reply("first"), RunScript::Reply("second")]);
    let ctx = vendor_ctx();

    let first = coordinator
        .send(&ctx, None, "hello", Vec::new(), None)
        .await
        .unwrap();
    let second = coordinator
        .send(
            &ctx,
            Some(first.conversation.clone()),
            "and again",
            Vec::new(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(first.conversation.id, second.conversation.id);
    assert_eq!(first.conversation.thread_id, second.conversation.thread_id);
    assert_eq!(store.conversations.lock().unwrap().len(), 1);
    assert_eq!(
        store.message_senders(),
        vec![Sender::User, Sender::Assistant, Sender::User, Sender::Assistant]
    );
    // The completed exchange bumped the conversation.
    assert!(second.conversation.updated_at >= first.conversation.updated_at);
}

#[tokio::test]
async fn test_conversations_listed_most_recent_first() {
    let (_assistant, _store, coordinator) =
        harness(vec![RunScript::Reply("one"), RunScript::Reply("two")]);
    let ctx = vendor_ctx();

    let first = coordinator
        .send(&ctx, None, "older chat", Vec::new(), None)
        .await
        .unwrap();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let second = coordinator
        .send(&ctx, None, "newer chat", Vec::new(), None)
        .await
        .unwrap();

    let listed = coordinator
        .list_conversations(&ctx.identity.email)
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, second.conversation.id);
    assert_eq!(listed[1].id, first.conversation.id);
}

#[tokio::test]
async fn test_polling_until_completion() {
    let (_assistant, _store, coordinator) =
        harness(vec![RunScript::CompleteAfterPolls(3, "done polling")]);

    let outcome = coordinator
        .send(&vendor_ctx(), None, "slow one", Vec::new(), None)
        .await
        .unwrap();
    assert_eq!(outcome.reply.unwrap().text, "done polling");
}

#[tokio::test(start_paused = true)]
async fn test_polling_gives_up_after_timeout() {
    let (assistant, store, _) = harness(vec![RunScript::CompleteAfterPolls(100_000, "never")]);
    let coordinator = Coordinator::new(assistant, store.clone(), CoordinatorTuning::default());

    let err = coordinator
        .send(&vendor_ctx(), None, "stuck run", Vec::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, VendoraError::RunTimeout { .. }));
}

#[tokio::test]
async fn test_stale_reply_is_not_reused() {
    // The thread already holds an assistant welcome message older than the
    // submitted turn; a run that adds nothing new must yield "no response".
    let (assistant, store, coordinator) = harness(vec![RunScript::NoNewReply]);
    let ctx = vendor_ctx();

    let thread_id = assistant.threads.create();
    assistant
        .threads
        .append(&thread_id, Sender::Assistant, "Welcome!", Vec::new());
    std::thread::sleep(std::time::Duration::from_millis(2));

    let conversation = Conversation::new("resumed", &ctx.identity.email, thread_id);
    store.upsert_conversation(&conversation).await.unwrap();

    let outcome = coordinator
        .send(&ctx, Some(conversation), "anyone there?", Vec::new(), None)
        .await
        .unwrap();

    assert!(outcome.reply.is_none());
    // Only the user's turn was persisted.
    assert_eq!(store.message_senders(), vec![Sender::User]);
}

#[tokio::test]
async fn test_run_failure_persists_user_turn_alone() {
    let (_assistant, store, coordinator) = harness(vec![RunScript::FailWith("upstream 502")]);

    let err = coordinator
        .send(&vendor_ctx(), None, "break please", Vec::new(), None)
        .await
        .unwrap_err();

    assert!(!err.is_token_limited());
    assert_eq!(store.message_senders(), vec![Sender::User]);
}

#[tokio::test]
async fn test_token_limit_evicts_two_and_retries_once() {
    let (assistant, store, coordinator) = harness(vec![
        RunScript::FailWith("request exceeds the token limit"),
        RunScript::Reply("trimmed and answered"),
    ]);
    let ctx = vendor_ctx();

    // A long-lived thread: 11 prior entries, above the eviction threshold.
    let thread_id = assistant.threads.create();
    for i in 0..11 {
        let role = if i % 2 == 0 { Sender::User } else { Sender::Assistant };
        assistant
            .threads
            .append(&thread_id, role, &format!("m{i}"), Vec::new());
    }
    let conversation = Conversation::new("long chat", &ctx.identity.email, thread_id.clone());
    store.upsert_conversation(&conversation).await.unwrap();

    let outcome = coordinator
        .send(&ctx, Some(conversation), "one more thing", Vec::new(), None)
        .await
        .unwrap();

    assert!(outcome.retried);
    assert_eq!(outcome.reply.unwrap().text, "trimmed and answered");
    assert_eq!(assistant.runs_started(), 2);

    // Exactly the two oldest entries were evicted; the resent turn and its
    // reply sit at the end: 11 - 2 + 2 = 11.
    let history = assistant.threads.messages(&thread_id).unwrap();
    assert_eq!(history.len(), 11);
    assert_eq!(history[0].content, "m2");
    assert_eq!(history[history.len() - 2].content, "one more thing");
}

#[tokio::test]
async fn test_second_token_limit_failure_is_terminal() {
    let (assistant, store, coordinator) = harness(vec![
        RunScript::FailWith("token limit exceeded"),
        RunScript::FailWith("token limit exceeded"),
        // A third entry would mean the retry looped — it must never pop.
        RunScript::Reply("unreachable"),
    ]);

    let err = coordinator
        .send(&vendor_ctx(), None, "too big", Vec::new(), None)
        .await
        .unwrap_err();

    assert!(err.is_token_limited());
    assert_eq!(assistant.runs_started(), 2);
    // The terminal failure still records the user's turn, without a reply.
    assert_eq!(store.message_senders(), vec![Sender::User]);
}

#[tokio::test]
async fn test_unauthorized_propagates_without_persisting() {
    let (_assistant, store, coordinator) = harness(vec![RunScript::Http401]);

    let err = coordinator
        .send(&vendor_ctx(), None, "hello?", Vec::new(), None)
        .await
        .unwrap_err();

    assert!(err.is_unauthorized());
    assert!(store.message_senders().is_empty());
}

#[tokio::test]
async fn test_quick_action_rows_render_inline_table() {
    let (_assistant, _store, coordinator) = harness(vec![RunScript::Reply("Here is the report.")]);

    let rows: Vec<vendora::core::types::ProductRow> = (0..12)
        .map(|i| {
            let mut row = serde_json::Map::new();
            row.insert("product_name".into(), serde_json::json!(format!("Item {i}")));
            row.insert("quality_score".into(), serde_json::json!(3.5));
            row
        })
        .collect();
    let payload = QuickActionPayload {
        rows,
        csv: Some(vendora::core::types::CsvRef {
            url: "https://cdn.example.com/x/high-quality.csv".into(),
            filename: "high-quality.csv".into(),
        }),
    };

    let outcome = coordinator
        .send(
            &vendor_ctx(),
            None,
            "Show me my high quality products",
            Vec::new(),
            Some(payload),
        )
        .await
        .unwrap();

    let reply = outcome.reply.unwrap();
    assert!(reply.text.starts_with("Here is the report."));
    assert!(reply.text.contains("| Product Name | Quality Score |"));
    assert!(reply.text.contains("first 10 of 12 products"));
    assert_eq!(reply.csv.unwrap().filename, "high-quality.csv");
}

#[tokio::test]
async fn test_concurrent_sends_serialize_per_conversation() {
    let (_assistant, store, coordinator) = harness(vec![
        RunScript::Reply("warmup reply"),
        RunScript::CompleteAfterPolls(2, "first reply"),
        RunScript::Reply("second reply"),
    ]);
    let coordinator = Arc::new(coordinator);

    let ctx = vendor_ctx();
    let first = coordinator
        .send(&ctx, None, "warmup", Vec::new(), None)
        .await
        .unwrap();
    let conversation = first.conversation.clone();

    let c1 = coordinator.clone();
    let c2 = coordinator.clone();
    let ctx1 = ctx.clone();
    let ctx2 = ctx.clone();
    let conv1 = conversation.clone();
    let conv2 = conversation.clone();

    let (a, b) = tokio::join!(
        c1.send(&ctx1, Some(conv1), "again", Vec::new(), None),
        c2.send(&ctx2, Some(conv2), "and again", Vec::new(), None),
    );
    a.unwrap();
    b.unwrap();

    // With the per-conversation guard, the persisted stream alternates
    // user/assistant with no interleaving.
    assert_eq!(
        store.message_senders(),
        vec![
            Sender::User,
            Sender::Assistant,
            Sender::User,
            Sender::Assistant,
            Sender::User,
            Sender::Assistant
        ]
    );
}
