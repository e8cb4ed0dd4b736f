use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::paths::{conversation_file_name, conversation_root, validate_conversation_id};
use crate::schema::{is_rfc3339, Conversation};
use crate::store::{check_revision, ConversationStore};

/// One pretty-printed JSON document per conversation.
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// reader never observes a half-written document. Revision checks and writes
/// are serialized by an in-process lock.
#[derive(Debug)]
pub struct FileConversationStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileConversationStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store rooted at `<cwd>/.helix/conversations`.
    #[must_use]
    pub fn for_workspace(cwd: &Path) -> Self {
        Self::new(conversation_root(cwd))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        validate_conversation_id(id)?;
        Ok(self.root.join(conversation_file_name(id)))
    }

    async fn read_document(&self, id: &str) -> Result<Option<Conversation>, StoreError> {
        let path = self.path_for(id)?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::io("reading conversation", &path, source)),
        };

        let conversation: Conversation =
            serde_json::from_str(&raw).map_err(|source| StoreError::json_parse(&path, source))?;
        validate_document(&path, id, &conversation)?;
        Ok(Some(conversation))
    }

    async fn write_document(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let path = self.path_for(&conversation.id)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StoreError::io("creating conversation directory", &self.root, source))?;

        let mut body = serde_json::to_string_pretty(conversation)
            .map_err(|source| StoreError::json_serialize(&path, source))?;
        body.push('\n');

        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, body)
            .await
            .map_err(|source| StoreError::io("writing conversation temp file", &temp_path, source))?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|source| StoreError::io("replacing conversation file", &path, source))
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn load(&self, id: &str) -> Result<Conversation, StoreError> {
        self.read_document(id)
            .await?
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn create(&self, id: &str) -> Result<Conversation, StoreError> {
        let _guard = self.write_lock.lock().await;
        if self.read_document(id).await?.is_some() {
            return Err(StoreError::AlreadyExists { id: id.to_string() });
        }
        let conversation = Conversation::new(id)?;
        self.write_document(&conversation).await?;
        tracing::debug!(conversation_id = %id, "conversation created");
        Ok(conversation)
    }

    async fn save(&self, conversation: &mut Conversation) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let stored = self
            .read_document(&conversation.id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                id: conversation.id.clone(),
            })?;
        check_revision(conversation, stored.revision)?;

        let mut next = conversation.clone();
        next.revision += 1;
        next.touch()?;
        self.write_document(&next).await?;
        *conversation = next;
        tracing::debug!(
            conversation_id = %conversation.id,
            revision = conversation.revision,
            messages = conversation.messages.len(),
            pending = conversation.pending_calls.len(),
            "conversation saved"
        );
        Ok(())
    }
}

fn validate_document(path: &Path, id: &str, conversation: &Conversation) -> Result<(), StoreError> {
    if conversation.id != id {
        return Err(StoreError::IdMismatch {
            path: path.to_path_buf(),
            expected: id.to_string(),
            found: conversation.id.clone(),
        });
    }
    for (field, value) in [
        ("created_at", &conversation.created_at),
        ("updated_at", &conversation.updated_at),
    ] {
        if !is_rfc3339(value) {
            return Err(StoreError::InvalidTimestamp {
                path: path.to_path_buf(),
                field,
                value: value.clone(),
            });
        }
    }
    Ok(())
}
