// src/assistant/threads.rs — In-process thread bookkeeping
//
// The assistant workflow is stateless between runs; the accumulated
// conversation history lives client-side, keyed by an opaque thread handle.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::types::{FileRef, Sender};

/// One entry of a thread's accumulated history.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadMessage {
    pub id: String,
    pub role: Sender,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub attachments: Vec<FileRef>,
}

#[derive(Debug, Default)]
struct Thread {
    messages: Vec<ThreadMessage>,
}

/// Thread registry. Single writer per thread (the coordinator holds a
/// per-conversation lock); the inner mutex only guards map access.
#[derive(Default)]
pub struct ThreadStore {
    threads: Mutex<HashMap<String, Thread>>,
}

impl ThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh opaque thread handle.
    pub fn create(&self) -> String {
        let id = format!("thread_{}", Uuid::new_v4().simple());
        self.threads
            .lock()
            .expect("thread map poisoned")
            .insert(id.clone(), Thread::default());
        id
    }

    pub fn exists(&self, thread_id: &str) -> bool {
        self.threads
            .lock()
            .expect("thread map poisoned")
            .contains_key(thread_id)
    }

    /// Re-register a handle loaded from a persisted conversation. The
    /// remote side keeps no thread state, so an empty local history is a
    /// valid resume point.
    pub fn adopt(&self, thread_id: &str) {
        self.threads
            .lock()
            .expect("thread map poisoned")
            .entry(thread_id.to_string())
            .or_default();
    }

    pub fn append(
        &self,
        thread_id: &str,
        role: Sender,
        content: &str,
        attachments: Vec<FileRef>,
    ) -> Option<ThreadMessage> {
        let mut threads = self.threads.lock().expect("thread map poisoned");
        let thread = threads.get_mut(thread_id)?;
        let message = ThreadMessage {
            id: format!("msg_{}", Uuid::new_v4().simple()),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
            attachments,
        };
        thread.messages.push(message.clone());
        Some(message)
    }

    pub fn messages(&self, thread_id: &str) -> Option<Vec<ThreadMessage>> {
        let threads = self.threads.lock().expect("thread map poisoned");
        threads.get(thread_id).map(|t| t.messages.clone())
    }

    pub fn len(&self, thread_id: &str) -> usize {
        self.threads
            .lock()
            .expect("thread map poisoned")
            .get(thread_id)
            .map(|t| t.messages.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, thread_id: &str) -> bool {
        self.len(thread_id) == 0
    }

    /// Drop the most recent entry (used when a failed send is rolled back
    /// before a retry).
    pub fn pop_last(&self, thread_id: &str) -> Option<ThreadMessage> {
        let mut threads = self.threads.lock().expect("thread map poisoned");
        threads.get_mut(thread_id)?.messages.pop()
    }

    /// Evict the `count` oldest entries, but only when the history holds
    /// more than `threshold` entries. Returns whether anything was evicted.
    pub fn evict_oldest(&self, thread_id: &str, threshold: usize, count: usize) -> bool {
        let mut threads = self.threads.lock().expect("thread map poisoned");
        let Some(thread) = threads.get_mut(thread_id) else {
            return false;
        };
        if thread.messages.len() <= threshold {
            return false;
        }
        let count = count.min(thread.messages.len());
        thread.messages.drain(..count);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_store(n: usize) -> (ThreadStore, String) {
        let store = ThreadStore::new();
        let id = store.create();
        for i in 0..n {
            let role = if i % 2 == 0 {
                Sender::User
            } else {
                Sender::Assistant
            };
            store.append(&id, role, &format!("m{i}"), Vec::new());
        }
        (store, id)
    }

    #[test]
    fn test_create_yields_unique_handles() {
        let store = ThreadStore::new();
        let a = store.create();
        let b = store.create();
        assert_ne!(a, b);
        assert!(a.starts_with("thread_"));
    }

    #[test]
    fn test_append_to_unknown_thread_is_none() {
        let store = ThreadStore::new();
        assert!(store
            .append("thread_nope", Sender::User, "hi", Vec::new())
            .is_none());
    }

    #[test]
    fn test_messages_keep_insertion_order() {
        let (store, id) = filled_store(4);
        let msgs = store.messages(&id).unwrap();
        let contents: Vec<_> = msgs.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m0", "m1", "m2", "m3"]);
    }

    #[test]
    fn test_evict_noop_at_or_below_threshold() {
        let (store, id) = filled_store(10);
        assert!(!store.evict_oldest(&id, 10, 2));
        assert_eq!(store.len(&id), 10);
    }

    #[test]
    fn test_evict_removes_exactly_the_oldest_two() {
        let (store, id) = filled_store(11);
        assert!(store.evict_oldest(&id, 10, 2));
        let msgs = store.messages(&id).unwrap();
        assert_eq!(msgs.len(), 9);
        assert_eq!(msgs[0].content, "m2");
    }

    #[test]
    fn test_pop_last_rolls_back_latest() {
        let (store, id) = filled_store(3);
        let popped = store.pop_last(&id).unwrap();
        assert_eq!(popped.content, "m2");
        assert_eq!(store.len(&id), 2);
    }

    #[test]
    fn test_adopt_registers_resumed_handle() {
        let store = ThreadStore::new();
        store.adopt("thread_resumed");
        assert!(store.exists("thread_resumed"));
        assert!(store.is_empty("thread_resumed"));
        // Adoption is idempotent and never clears existing history.
        store.append("thread_resumed", Sender::User, "hi", Vec::new());
        store.adopt("thread_resumed");
        assert_eq!(store.len("thread_resumed"), 1);
    }
}
