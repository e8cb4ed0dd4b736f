use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::paths::validate_conversation_id;
use crate::schema::Conversation;
use crate::store::{check_revision, ConversationStore};

/// Process-local store. Same revision rules as the file store.
#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    conversations: Mutex<HashMap<String, Conversation>>,
}

impl MemoryConversationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.conversations.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn load(&self, id: &str) -> Result<Conversation, StoreError> {
        self.conversations
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn create(&self, id: &str) -> Result<Conversation, StoreError> {
        validate_conversation_id(id)?;
        let mut conversations = self.conversations.lock().await;
        if conversations.contains_key(id) {
            return Err(StoreError::AlreadyExists { id: id.to_string() });
        }
        let conversation = Conversation::new(id)?;
        conversations.insert(id.to_string(), conversation.clone());
        Ok(conversation)
    }

    async fn save(&self, conversation: &mut Conversation) -> Result<(), StoreError> {
        let mut conversations = self.conversations.lock().await;
        let stored = conversations
            .get(&conversation.id)
            .ok_or_else(|| StoreError::NotFound {
                id: conversation.id.clone(),
            })?;
        check_revision(conversation, stored.revision)?;

        let mut next = conversation.clone();
        next.revision += 1;
        next.touch()?;
        conversations.insert(next.id.clone(), next.clone());
        *conversation = next;
        tracing::trace!(
            conversation_id = %conversation.id,
            revision = conversation.revision,
            "conversation saved in memory"
        );
        Ok(())
    }
}
