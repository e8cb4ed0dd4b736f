#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use agent_provider::{RunMessage, ToolArguments};
use agent_provider_mock::{ScriptedProvider, ScriptedReply};
use async_trait::async_trait;
use command_parser::ShellDialect;
use conversation_store::{Conversation, ConversationStore, MemoryConversationStore};
use helix::tools::FinalOutputTool;
use helix::{
    Agent, AgentConfig, ApprovalGate, RecordingSink, Tool, ToolCategory, ToolError, ToolRegistry,
};
use serde_json::{json, Value};

pub const SYSTEM_PROMPT: &str = "You are a test agent.";

pub type InvocationLog = Arc<Mutex<Vec<String>>>;

/// Tool that records each call and answers with a fixed string.
pub struct RecordingTool {
    name: &'static str,
    category: ToolCategory,
    log: InvocationLog,
}

#[async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "records its calls"
    }

    fn category(&self) -> ToolCategory {
        self.category
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn invoke(&self, arguments: &ToolArguments) -> Result<String, ToolError> {
        lock_unpoisoned(&self.log).push(self.name.to_string());
        let detail = arguments
            .values()
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");
        Ok(format!("{} ok: {detail}", self.name))
    }
}

/// Tool that never finishes.
pub struct StuckTool {
    name: &'static str,
    category: ToolCategory,
}

#[async_trait]
impl Tool for StuckTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "never returns"
    }

    fn category(&self) -> ToolCategory {
        self.category
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn invoke(&self, _arguments: &ToolArguments) -> Result<String, ToolError> {
        std::future::pending().await
    }
}

/// `read_file` (read-only), `write_file` (file write), `run_shell_command`
/// (shell), `wait_forever` (read-only, hangs), `hang_shell` (shell, hangs)
/// and the builtin `final_output`.
pub fn test_registry(log: &InvocationLog) -> ToolRegistry {
    let tool = |name: &'static str, category: ToolCategory| RecordingTool {
        name,
        category,
        log: Arc::clone(log),
    };
    ToolRegistry::builder()
        .register(tool("read_file", ToolCategory::ReadOnly))
        .register(tool("write_file", ToolCategory::FileWrite))
        .register(tool("run_shell_command", ToolCategory::Shell))
        .register(StuckTool {
            name: "wait_forever",
            category: ToolCategory::ReadOnly,
        })
        .register(StuckTool {
            name: "hang_shell",
            category: ToolCategory::Shell,
        })
        .register(FinalOutputTool)
        .build()
        .expect("test registry is valid")
}

pub struct Harness {
    pub agent: Arc<Agent>,
    pub provider: Arc<ScriptedProvider>,
    pub store: Arc<MemoryConversationStore>,
    pub sink: Arc<RecordingSink>,
    pub log: InvocationLog,
}

impl Harness {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self::build(ScriptedProvider::new(replies), ApprovalGate::category_defaults(ShellDialect::Posix), 20)
    }

    pub fn with_gate(replies: Vec<ScriptedReply>, gate: ApprovalGate) -> Self {
        Self::build(ScriptedProvider::new(replies), gate, 20)
    }

    pub fn with_max_iterations(replies: Vec<ScriptedReply>, max_iterations: usize) -> Self {
        Self::build(
            ScriptedProvider::new(replies),
            ApprovalGate::category_defaults(ShellDialect::Posix),
            max_iterations,
        )
    }

    pub fn build(provider: ScriptedProvider, gate: ApprovalGate, max_iterations: usize) -> Self {
        let provider = Arc::new(provider);
        let store = Arc::new(MemoryConversationStore::new());
        let sink = Arc::new(RecordingSink::new());
        let log: InvocationLog = Arc::new(Mutex::new(Vec::new()));
        let config = AgentConfig::default()
            .with_system_prompt(SYSTEM_PROMPT)
            .with_max_iterations(max_iterations);

        let agent = Agent::new(
            Arc::clone(&provider) as Arc<dyn agent_provider::ModelProvider>,
            Arc::clone(&store) as Arc<dyn ConversationStore>,
            test_registry(&log),
            config,
        )
        .with_gate(gate)
        .with_sink(Arc::clone(&sink) as Arc<dyn helix::NotificationSink>);

        Self {
            agent: Arc::new(agent),
            provider,
            store,
            sink,
            log,
        }
    }

    pub async fn stored(&self, id: &str) -> Conversation {
        self.store.load(id).await.expect("conversation is stored")
    }

    pub fn invocations(&self) -> Vec<String> {
        lock_unpoisoned(&self.log).clone()
    }
}

pub fn gate(allow: &[&str], deny: &[&str]) -> ApprovalGate {
    ApprovalGate::new(
        &helix::Permissions {
            allow: allow.iter().map(|rule| rule.to_string()).collect(),
            deny: deny.iter().map(|rule| rule.to_string()).collect(),
        },
        ShellDialect::Posix,
    )
}

/// The `(call_id, is_error, content)` of every tool result, in history order.
pub fn tool_results(conversation: &Conversation) -> Vec<(String, bool, String)> {
    conversation
        .messages
        .iter()
        .filter_map(|message| match message {
            RunMessage::ToolResult {
                call_id,
                is_error,
                content,
                ..
            } => Some((call_id.clone(), *is_error, content.clone())),
            _ => None,
        })
        .collect()
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
