//! Conversation history persistence.
//!
//! The turn controller only appends and reads recent windows; ordering comes
//! from the store-assigned message id.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use oikos_core::{OikosError, UserId};
use tokio::sync::RwLock;
use tracing::debug;

use crate::conversation::{Message, MessageMetadata, Role, StoredMessage};

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Persist one message and return it with its assigned id.
    async fn append_message(
        &self,
        user_id: UserId,
        role: Role,
        content: Option<String>,
        metadata: MessageMetadata,
    ) -> Result<StoredMessage, OikosError>;

    /// The last `limit` messages for a user, oldest first.
    async fn recent_messages(&self, user_id: UserId, limit: usize) -> Result<Vec<StoredMessage>, OikosError>;

    /// Delete a user's history, returning how many messages were removed.
    async fn clear(&self, user_id: UserId) -> Result<usize, OikosError>;

    async fn append(&self, user_id: UserId, message: Message) -> Result<StoredMessage, OikosError> {
        self.append_message(user_id, message.role, message.content, message.metadata)
            .await
    }
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    by_user: HashMap<UserId, Vec<StoredMessage>>,
}

/// Process-local history store.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append_message(
        &self,
        user_id: UserId,
        role: Role,
        content: Option<String>,
        metadata: MessageMetadata,
    ) -> Result<StoredMessage, OikosError> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let stored = StoredMessage {
            id: inner.next_id,
            created_at: Utc::now(),
            message: Message {
                role,
                content,
                metadata,
            },
        };
        debug!(user_id, id = stored.id, role = role.as_str(), "appending message");
        inner.by_user.entry(user_id).or_default().push(stored.clone());
        Ok(stored)
    }

    async fn recent_messages(&self, user_id: UserId, limit: usize) -> Result<Vec<StoredMessage>, OikosError> {
        let inner = self.inner.read().await;
        let messages = inner.by_user.get(&user_id).map(Vec::as_slice).unwrap_or(&[]);
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }

    async fn clear(&self, user_id: UserId) -> Result<usize, OikosError> {
        let mut inner = self.inner.write().await;
        Ok(inner.by_user.remove(&user_id).map_or(0, |m| m.len()))
    }
}
