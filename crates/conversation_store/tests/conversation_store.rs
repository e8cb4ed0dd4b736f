use std::path::{Path, PathBuf};

use agent_provider::{RunMessage, ToolArguments, ToolCallRequest};
use conversation_store::{
    conversation_root, ConversationStore, FileConversationStore, PendingFunctionCall, StoreError,
};
use serde_json::json;
use tempfile::TempDir;

fn store() -> (TempDir, FileConversationStore) {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let store = FileConversationStore::for_workspace(dir.path());
    (dir, store)
}

fn document_path(cwd: &Path, id: &str) -> PathBuf {
    conversation_root(cwd).join(format!("{id}.json"))
}

fn write_document(cwd: &Path, id: &str, body: &str) {
    let root = conversation_root(cwd);
    std::fs::create_dir_all(&root).expect("conversation root should be created");
    std::fs::write(root.join(format!("{id}.json")), body).expect("document should be written");
}

fn shell_request(call_id: &str, command: &str) -> ToolCallRequest {
    let mut arguments = ToolArguments::new();
    arguments.insert("command".to_string(), command.to_string());
    ToolCallRequest::new(call_id, "run_shell_command", arguments)
}

#[tokio::test]
async fn create_writes_pretty_document_with_trailing_newline() {
    let (dir, store) = store();

    let created = store.create("conv-1").await.expect("create should succeed");
    assert_eq!(created.revision, 0);

    let raw = std::fs::read_to_string(document_path(dir.path(), "conv-1"))
        .expect("document should exist");
    assert!(raw.ends_with("}\n"));
    assert!(raw.contains("\n  \"id\": \"conv-1\""));
}

#[tokio::test]
async fn load_returns_saved_messages_and_pending_calls() {
    let (_dir, store) = store();
    let mut conversation = store.create("conv-1").await.expect("create");

    let request = shell_request("call-1", "rm -rf build");
    conversation.messages.push(RunMessage::UserText {
        text: "clean up".to_string(),
    });
    conversation.messages.push(request.to_message());
    conversation
        .pending_calls
        .push(PendingFunctionCall::from_request(&request));
    conversation
        .queued_calls
        .push(shell_request("call-2", "ls"));

    store.save(&mut conversation).await.expect("save");
    assert_eq!(conversation.revision, 1);

    let loaded = store.load("conv-1").await.expect("load");
    assert_eq!(loaded, conversation);
    assert!(loaded.is_paused());
    assert_eq!(loaded.pending_calls[0].arguments["command"], "rm -rf build");
    assert_eq!(loaded.queued_calls[0].call_id, "call-2");
}

#[tokio::test]
async fn stale_save_is_rejected_and_leaves_document_untouched() {
    let (_dir, store) = store();
    let mut writer_a = store.create("conv-1").await.expect("create");
    let mut writer_b = store.load("conv-1").await.expect("load");

    writer_a.messages.push(RunMessage::AssistantText {
        text: "from a".to_string(),
    });
    store.save(&mut writer_a).await.expect("first writer wins");

    writer_b.messages.push(RunMessage::AssistantText {
        text: "from b".to_string(),
    });
    let error = store
        .save(&mut writer_b)
        .await
        .expect_err("second writer is stale");
    match error {
        StoreError::ConcurrencyConflict {
            id,
            expected,
            found,
        } => {
            assert_eq!(id, "conv-1");
            assert_eq!(expected, 0);
            assert_eq!(found, 1);
        }
        other => panic!("unexpected error: {other}"),
    }

    let stored = store.load("conv-1").await.expect("load");
    assert_eq!(
        stored.messages,
        vec![RunMessage::AssistantText {
            text: "from a".to_string()
        }]
    );
}

#[tokio::test]
async fn save_leaves_no_temp_file_behind() {
    let (dir, store) = store();
    let mut conversation = store.create("conv-1").await.expect("create");
    store.save(&mut conversation).await.expect("save");

    let entries: Vec<String> = std::fs::read_dir(conversation_root(dir.path()))
        .expect("root should exist")
        .map(|entry| {
            entry
                .expect("dir entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    assert_eq!(entries, vec!["conv-1.json".to_string()]);
}

#[tokio::test]
async fn save_of_unknown_conversation_is_not_found() {
    let (_dir, store) = store();
    let mut conversation = conversation_store::Conversation::new("ghost").expect("valid id");
    let error = store
        .save(&mut conversation)
        .await
        .expect_err("never created");
    assert!(error.is_not_found());
}

#[tokio::test]
async fn create_rejects_existing_and_invalid_ids() {
    let (_dir, store) = store();
    store.create("conv-1").await.expect("create");

    let duplicate = store.create("conv-1").await.expect_err("duplicate");
    assert!(matches!(duplicate, StoreError::AlreadyExists { .. }));

    let invalid = store.create("../escape").await.expect_err("invalid id");
    assert!(matches!(invalid, StoreError::InvalidId { .. }));
}

#[tokio::test]
async fn load_missing_is_not_found() {
    let (_dir, store) = store();
    let error = store.load("absent").await.expect_err("missing");
    assert!(matches!(error, StoreError::NotFound { id } if id == "absent"));
}

#[tokio::test]
async fn load_rejects_corrupt_json() {
    let (dir, store) = store();
    write_document(dir.path(), "conv-1", "{ not json");

    let error = store.load("conv-1").await.expect_err("corrupt");
    assert!(matches!(error, StoreError::JsonParse { .. }));
}

#[tokio::test]
async fn load_rejects_mismatched_id() {
    let (dir, store) = store();
    let body = json!({
        "id": "someone-else",
        "messages": [],
        "revision": 3,
        "created_at": "2026-02-14T00:00:00Z",
        "updated_at": "2026-02-14T00:00:00Z",
    });
    write_document(dir.path(), "conv-1", &body.to_string());

    let error = store.load("conv-1").await.expect_err("id mismatch");
    assert!(matches!(error, StoreError::IdMismatch { .. }));
}

#[tokio::test]
async fn load_rejects_invalid_timestamp() {
    let (dir, store) = store();
    let body = json!({
        "id": "conv-1",
        "revision": 0,
        "created_at": "yesterday",
        "updated_at": "2026-02-14T00:00:00Z",
    });
    write_document(dir.path(), "conv-1", &body.to_string());

    let error = store.load("conv-1").await.expect_err("bad timestamp");
    assert!(matches!(
        error,
        StoreError::InvalidTimestamp {
            field: "created_at",
            ..
        }
    ));
}

#[tokio::test]
async fn hand_written_document_without_optional_lists_loads() {
    let (dir, store) = store();
    let body = json!({
        "id": "conv-1",
        "messages": [
            { "role": "user_text", "text": "hi" },
            { "role": "assistant_text", "text": "hello" }
        ],
        "revision": 4,
        "created_at": "2026-02-14T00:00:00Z",
        "updated_at": "2026-02-14T00:05:00Z",
    });
    write_document(dir.path(), "conv-1", &body.to_string());

    let loaded = store.load("conv-1").await.expect("load");
    assert_eq!(loaded.revision, 4);
    assert_eq!(loaded.messages.len(), 2);
    assert!(loaded.pending_calls.is_empty());
    assert!(loaded.queued_calls.is_empty());
}
