//! Push channel from a running turn to whoever is watching it.

use std::sync::{Mutex, MutexGuard};

use agent_provider::{ToolArguments, ToolResult};
use conversation_store::PendingFunctionCall;

/// Receives turn progress. Calls are made in the order events happen.
pub trait NotificationSink: Send + Sync + 'static {
    fn on_text(&self, conversation_id: &str, content: &str);

    fn on_tool_invoked(&self, conversation_id: &str, name: &str, arguments: &ToolArguments);

    fn on_tool_result(&self, _conversation_id: &str, _result: &ToolResult) {}

    fn on_completed(&self, conversation_id: &str, final_message: &str);

    fn on_max_iterations_reached(&self, conversation_id: &str);

    fn on_cancelled(&self, conversation_id: &str);

    fn on_permission_requested(&self, conversation_id: &str, call: &PendingFunctionCall);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn on_text(&self, _conversation_id: &str, _content: &str) {}

    fn on_tool_invoked(&self, _conversation_id: &str, _name: &str, _arguments: &ToolArguments) {}

    fn on_completed(&self, _conversation_id: &str, _final_message: &str) {}

    fn on_max_iterations_reached(&self, _conversation_id: &str) {}

    fn on_cancelled(&self, _conversation_id: &str) {}

    fn on_permission_requested(&self, _conversation_id: &str, _call: &PendingFunctionCall) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    Text(String),
    ToolInvoked {
        name: String,
        arguments: ToolArguments,
    },
    ToolResult(ToolResult),
    Completed(String),
    MaxIterationsReached,
    Cancelled,
    PermissionRequested {
        call_id: String,
        name: String,
        arguments: ToolArguments,
    },
}

/// Keeps every event, tagged with its conversation id.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, AgentEvent)>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events for every conversation, in arrival order.
    #[must_use]
    pub fn events(&self) -> Vec<(String, AgentEvent)> {
        lock_unpoisoned(&self.events).clone()
    }

    #[must_use]
    pub fn events_for(&self, conversation_id: &str) -> Vec<AgentEvent> {
        lock_unpoisoned(&self.events)
            .iter()
            .filter(|(id, _)| id == conversation_id)
            .map(|(_, event)| event.clone())
            .collect()
    }

    #[must_use]
    pub fn count(&self, predicate: impl Fn(&AgentEvent) -> bool) -> usize {
        lock_unpoisoned(&self.events)
            .iter()
            .filter(|(_, event)| predicate(event))
            .count()
    }

    pub fn clear(&self) {
        lock_unpoisoned(&self.events).clear();
    }

    fn push(&self, conversation_id: &str, event: AgentEvent) {
        lock_unpoisoned(&self.events).push((conversation_id.to_string(), event));
    }
}

impl NotificationSink for RecordingSink {
    fn on_text(&self, conversation_id: &str, content: &str) {
        self.push(conversation_id, AgentEvent::Text(content.to_string()));
    }

    fn on_tool_invoked(&self, conversation_id: &str, name: &str, arguments: &ToolArguments) {
        self.push(
            conversation_id,
            AgentEvent::ToolInvoked {
                name: name.to_string(),
                arguments: arguments.clone(),
            },
        );
    }

    fn on_tool_result(&self, conversation_id: &str, result: &ToolResult) {
        self.push(conversation_id, AgentEvent::ToolResult(result.clone()));
    }

    fn on_completed(&self, conversation_id: &str, final_message: &str) {
        self.push(conversation_id, AgentEvent::Completed(final_message.to_string()));
    }

    fn on_max_iterations_reached(&self, conversation_id: &str) {
        self.push(conversation_id, AgentEvent::MaxIterationsReached);
    }

    fn on_cancelled(&self, conversation_id: &str) {
        self.push(conversation_id, AgentEvent::Cancelled);
    }

    fn on_permission_requested(&self, conversation_id: &str, call: &PendingFunctionCall) {
        self.push(
            conversation_id,
            AgentEvent::PermissionRequested {
                call_id: call.call_id.clone(),
                name: call.function_name.clone(),
                arguments: call.arguments.clone(),
            },
        );
    }
}

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
