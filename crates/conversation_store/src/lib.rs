//! Durable conversation state and the stores that persist it.

mod error;
mod file;
mod memory;
mod paths;
mod schema;
mod store;

pub use error::StoreError;
pub use file::FileConversationStore;
pub use memory::MemoryConversationStore;
pub use paths::{conversation_file_name, conversation_root, validate_conversation_id};
pub use schema::{Conversation, PendingFunctionCall};
pub use store::ConversationStore;
