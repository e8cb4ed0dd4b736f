use std::path::{Path, PathBuf};

use crate::error::StoreError;

pub const CONVERSATION_DIR: [&str; 2] = [".helix", "conversations"];

#[must_use]
pub fn conversation_root(cwd: &Path) -> PathBuf {
    cwd.join(CONVERSATION_DIR[0]).join(CONVERSATION_DIR[1])
}

/// Ids double as file names, so only `[A-Za-z0-9_-]+` is accepted.
pub fn validate_conversation_id(id: &str) -> Result<(), StoreError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidId { id: id.to_string() })
    }
}

#[must_use]
pub fn conversation_file_name(id: &str) -> String {
    format!("{id}.json")
}
