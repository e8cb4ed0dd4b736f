use agent_provider::{CompletionRequest, RunMessage, ToolArguments, ToolDefinition};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ChatTool>,
    pub stream: bool,
    pub options: ChatOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatOptions {
    pub num_ctx: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ChatToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            tool_calls: Vec::new(),
            tool_name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatToolCall {
    pub function: ChatFunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ChatFunctionDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatFunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

impl ChatRequest {
    /// Translates a provider-neutral request into Ollama's chat shape.
    ///
    /// Consecutive tool requests are folded into the preceding assistant
    /// message, which is how Ollama expects a multi-call turn.
    #[must_use]
    pub fn from_completion(model: &str, num_ctx: u32, request: &CompletionRequest) -> Self {
        let mut messages: Vec<ChatMessage> = Vec::with_capacity(request.messages.len());

        for message in &request.messages {
            match message {
                RunMessage::System { text } => messages.push(ChatMessage::new("system", text)),
                RunMessage::UserText { text } => messages.push(ChatMessage::new("user", text)),
                RunMessage::AssistantText { text } => {
                    messages.push(ChatMessage::new("assistant", text));
                }
                RunMessage::ToolCall {
                    tool_name,
                    arguments,
                    ..
                } => {
                    let call = ChatToolCall {
                        function: ChatFunctionCall {
                            name: tool_name.clone(),
                            arguments: arguments_to_value(arguments),
                        },
                    };
                    match messages.last_mut() {
                        Some(last) if last.role == "assistant" => last.tool_calls.push(call),
                        _ => {
                            let mut assistant = ChatMessage::new("assistant", "");
                            assistant.tool_calls.push(call);
                            messages.push(assistant);
                        }
                    }
                }
                RunMessage::ToolResult {
                    tool_name, content, ..
                } => {
                    let mut result = ChatMessage::new("tool", content);
                    result.tool_name = Some(tool_name.clone());
                    messages.push(result);
                }
            }
        }

        Self {
            model: model.to_string(),
            messages,
            tools: request.tools.iter().map(tool_to_chat).collect(),
            stream: true,
            options: ChatOptions { num_ctx },
        }
    }
}

fn arguments_to_value(arguments: &ToolArguments) -> Value {
    let map: Map<String, Value> = arguments
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();
    Value::Object(map)
}

fn tool_to_chat(tool: &ToolDefinition) -> ChatTool {
    ChatTool {
        kind: "function".to_string(),
        function: ChatFunctionDefinition {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.input_schema.clone(),
        },
    }
}
