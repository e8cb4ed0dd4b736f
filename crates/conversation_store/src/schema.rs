use agent_provider::{RunMessage, ToolArguments, ToolCallRequest};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::StoreError;
use crate::paths::validate_conversation_id;

/// The unit of durable agent state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    /// Role-tagged history. Never holds the system prompt.
    #[serde(default)]
    pub messages: Vec<RunMessage>,
    /// Requests waiting on a human decision. Non-empty only while a turn is paused.
    #[serde(default)]
    pub pending_calls: Vec<PendingFunctionCall>,
    /// Requests from the paused batch that were already cleared, in request order.
    #[serde(default)]
    pub queued_calls: Vec<ToolCallRequest>,
    /// Bumped by the store on every successful save.
    pub revision: u64,
    pub created_at: String,
    pub updated_at: String,
}

impl Conversation {
    /// Fresh, unsaved conversation at revision 0.
    pub fn new(id: impl Into<String>) -> Result<Self, StoreError> {
        let id = id.into();
        validate_conversation_id(&id)?;
        let now = now_rfc3339()?;
        Ok(Self {
            id,
            messages: Vec::new(),
            pending_calls: Vec::new(),
            queued_calls: Vec::new(),
            revision: 0,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        !self.pending_calls.is_empty()
    }

    #[must_use]
    pub fn pending_call(&self, call_id: &str) -> Option<&PendingFunctionCall> {
        self.pending_calls
            .iter()
            .find(|pending| pending.call_id == call_id)
    }

    /// Removes and returns the pending entry for `call_id`.
    pub fn take_pending_call(&mut self, call_id: &str) -> Option<PendingFunctionCall> {
        let index = self
            .pending_calls
            .iter()
            .position(|pending| pending.call_id == call_id)?;
        Some(self.pending_calls.remove(index))
    }

    /// Tool requests in history that have no result message yet.
    #[must_use]
    pub fn unanswered_call_ids(&self) -> Vec<&str> {
        let mut open: Vec<&str> = Vec::new();
        for message in &self.messages {
            match message {
                RunMessage::ToolCall { call_id, .. } => open.push(call_id),
                RunMessage::ToolResult { call_id, .. } => open.retain(|id| *id != call_id.as_str()),
                _ => {}
            }
        }
        open
    }

    pub(crate) fn touch(&mut self) -> Result<(), StoreError> {
        self.updated_at = now_rfc3339()?;
        Ok(())
    }
}

/// A tool request parked until a human approves or declines it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFunctionCall {
    pub id: String,
    pub call_id: String,
    pub function_name: String,
    pub arguments: ToolArguments,
}

impl PendingFunctionCall {
    #[must_use]
    pub fn from_request(request: &ToolCallRequest) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            call_id: request.call_id.clone(),
            function_name: request.tool_name.clone(),
            arguments: request.arguments.clone(),
        }
    }

    #[must_use]
    pub fn to_request(&self) -> ToolCallRequest {
        ToolCallRequest::new(
            self.call_id.clone(),
            self.function_name.clone(),
            self.arguments.clone(),
        )
    }
}

pub(crate) fn now_rfc3339() -> Result<String, StoreError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(StoreError::ClockFormat)
}

pub(crate) fn is_rfc3339(value: &str) -> bool {
    OffsetDateTime::parse(value, &Rfc3339).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(call_id: &str) -> ToolCallRequest {
        let mut arguments = ToolArguments::new();
        arguments.insert("command".to_string(), "ls -la".to_string());
        ToolCallRequest::new(call_id, "run_shell_command", arguments)
    }

    #[test]
    fn new_conversation_starts_empty_at_revision_zero() {
        let conversation = Conversation::new("conv-1").expect("valid id");
        assert_eq!(conversation.revision, 0);
        assert!(conversation.messages.is_empty());
        assert!(!conversation.is_paused());
        assert!(is_rfc3339(&conversation.created_at));
        assert_eq!(conversation.created_at, conversation.updated_at);
    }

    #[test]
    fn new_conversation_rejects_bad_id() {
        let error = Conversation::new("../x").expect_err("invalid id");
        assert!(matches!(error, StoreError::InvalidId { .. }));
    }

    #[test]
    fn pending_call_round_trips_to_request() {
        let original = request("call-9");
        let pending = PendingFunctionCall::from_request(&original);
        assert_eq!(pending.call_id, "call-9");
        assert_eq!(pending.function_name, "run_shell_command");
        assert!(!pending.id.is_empty());
        assert_eq!(pending.to_request(), original);
    }

    #[test]
    fn take_pending_call_removes_only_the_match() {
        let mut conversation = Conversation::new("conv-2").expect("valid id");
        conversation.pending_calls = vec![
            PendingFunctionCall::from_request(&request("a")),
            PendingFunctionCall::from_request(&request("b")),
        ];

        assert!(conversation.take_pending_call("missing").is_none());
        let taken = conversation.take_pending_call("a").expect("a is pending");
        assert_eq!(taken.call_id, "a");
        assert_eq!(conversation.pending_calls.len(), 1);
        assert!(conversation.pending_call("b").is_some());
    }

    #[test]
    fn unanswered_call_ids_tracks_results() {
        let mut conversation = Conversation::new("conv-3").expect("valid id");
        conversation.messages = vec![
            request("a").to_message(),
            request("b").to_message(),
            RunMessage::ToolResult {
                call_id: "a".to_string(),
                tool_name: "run_shell_command".to_string(),
                content: "ok".to_string(),
                is_error: false,
            },
        ];
        assert_eq!(conversation.unanswered_call_ids(), vec!["b"]);
    }
}
