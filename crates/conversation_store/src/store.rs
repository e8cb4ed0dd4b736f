use async_trait::async_trait;

use crate::error::StoreError;
use crate::schema::Conversation;

/// Persistence seam for conversations.
///
/// `save` is a compare-and-swap on `revision`: it succeeds only when the
/// stored revision equals the caller's, then bumps the caller's copy.
#[async_trait]
pub trait ConversationStore: Send + Sync + 'static {
    async fn load(&self, id: &str) -> Result<Conversation, StoreError>;

    /// Persists a new empty conversation. Fails if `id` already exists.
    async fn create(&self, id: &str) -> Result<Conversation, StoreError>;

    async fn save(&self, conversation: &mut Conversation) -> Result<(), StoreError>;

    async fn load_or_create(&self, id: &str) -> Result<Conversation, StoreError> {
        match self.load(id).await {
            Err(StoreError::NotFound { .. }) => self.create(id).await,
            other => other,
        }
    }
}

pub(crate) fn check_revision(
    conversation: &Conversation,
    stored_revision: u64,
) -> Result<(), StoreError> {
    if conversation.revision == stored_revision {
        Ok(())
    } else {
        Err(StoreError::ConcurrencyConflict {
            id: conversation.id.clone(),
            expected: conversation.revision,
            found: stored_revision,
        })
    }
}
