// src/store/mod.rs — Conversation Repository (remote persistence API)

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::types::{Conversation, Message};
use crate::infra::errors::VendoraError;

/// CRUD over conversation and message records. Injectable so the
/// coordinator can be exercised against an in-memory double.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// All conversations owned by `owner_email`, descending by `updated_at`.
    /// Transport failure is an error — callers must not conflate it with an
    /// empty result.
    async fn list_conversations(&self, owner_email: &str)
        -> Result<Vec<Conversation>, VendoraError>;

    /// Create a conversation or bump an existing one (same id).
    async fn upsert_conversation(&self, conversation: &Conversation) -> Result<(), VendoraError>;

    /// One batched write of one or more messages. The collaborator gives no
    /// multi-row transaction guarantee; partial application on failure is
    /// possible and callers must not assume atomicity across the batch.
    async fn append_messages(
        &self,
        conversation_id: Uuid,
        messages: &[Message],
    ) -> Result<(), VendoraError>;

    /// Messages of a conversation, ascending by `created_at`.
    async fn conversation_messages(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<Message>, VendoraError>;

    /// Remove a conversation and all its messages. Messages go first so a
    /// crash between the two deletes never leaves a conversation
    /// referencing removed messages.
    async fn delete_conversation(&self, conversation_id: Uuid) -> Result<(), VendoraError>;

    /// Batch-evict the oldest `count` persisted messages of a conversation.
    async fn delete_oldest_messages(
        &self,
        conversation_id: Uuid,
        count: usize,
    ) -> Result<(), VendoraError>;
}

/// REST client for the persistence collaborator.
pub struct RestConversationStore {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl RestConversationStore {
    pub fn new(base_url: String, bearer_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, VendoraError> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(VendoraError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VendoraError::Repository {
                message: format!("HTTP {status}: {body}"),
            });
        }
        Ok(response)
    }

    fn transport(e: reqwest::Error) -> VendoraError {
        VendoraError::Repository {
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl ConversationStore for RestConversationStore {
    async fn list_conversations(
        &self,
        owner_email: &str,
    ) -> Result<Vec<Conversation>, VendoraError> {
        let response = self
            .request(reqwest::Method::GET, "/conversations")
            .query(&[("owner_email", owner_email), ("order", "updated_at.desc")])
            .send()
            .await
            .map_err(Self::transport)?;

        let mut conversations: Vec<Conversation> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(Self::transport)?;

        // The contract is ours, not the collaborator's: enforce the order
        // locally as well.
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn upsert_conversation(&self, conversation: &Conversation) -> Result<(), VendoraError> {
        let response = self
            .request(reqwest::Method::POST, "/conversations")
            .json(conversation)
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn append_messages(
        &self,
        conversation_id: Uuid,
        messages: &[Message],
    ) -> Result<(), VendoraError> {
        if messages.is_empty() {
            return Ok(());
        }
        debug_assert!(messages.iter().all(|m| m.conversation_id == conversation_id));

        let response = self
            .request(reqwest::Method::POST, "/messages")
            .query(&[("conversation_id", conversation_id.to_string())])
            .json(messages)
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn conversation_messages(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<Message>, VendoraError> {
        let response = self
            .request(reqwest::Method::GET, "/messages")
            .query(&[
                ("conversation_id", conversation_id.to_string()),
                ("order", "created_at.asc".into()),
            ])
            .send()
            .await
            .map_err(Self::transport)?;

        let mut messages: Vec<Message> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(Self::transport)?;

        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    async fn delete_conversation(&self, conversation_id: Uuid) -> Result<(), VendoraError> {
        // Messages first; the parent row only goes once they are gone.
        let response = self
            .request(reqwest::Method::DELETE, "/messages")
            .query(&[("conversation_id", conversation_id.to_string())])
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response).await?;

        let response = self
            .request(
                reqwest::Method::DELETE,
                &format!("/conversations/{conversation_id}"),
            )
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_oldest_messages(
        &self,
        conversation_id: Uuid,
        count: usize,
    ) -> Result<(), VendoraError> {
        let response = self
            .request(reqwest::Method::DELETE, "/messages/oldest")
            .query(&[
                ("conversation_id", conversation_id.to_string()),
                ("count", count.to_string()),
            ])
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response).await?;
        Ok(())
    }
}
