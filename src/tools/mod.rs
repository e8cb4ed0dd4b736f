//! Host tools the model may call, keyed by name.

mod builtin;

use std::sync::Arc;

use agent_provider::{ToolArguments, ToolCallRequest, ToolDefinition, ToolResult};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

use crate::error::ToolError;

pub use builtin::{
    BuiltinTools, EditFileTool, FinalOutputTool, InsertTextTool, ListDirectoryTool, ReadFileTool,
    RunShellCommandTool, WorkspaceRoot, WriteFileTool, DEFAULT_READ_MAX_BYTES,
    DEFAULT_SHELL_MAX_OUTPUT_BYTES, DEFAULT_SHELL_TIMEOUT_SEC,
};

/// Coarse classification that drives the default permission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolCategory {
    ReadOnly,
    FileWrite,
    Shell,
    /// Ends the turn; its single argument is the final message for the user.
    Completion,
}

impl ToolCategory {
    #[must_use]
    pub fn requires_permission(self) -> bool {
        matches!(self, Self::FileWrite | Self::Shell)
    }
}

#[async_trait]
pub trait Tool: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn category(&self) -> ToolCategory;

    /// JSON schema of the arguments object.
    fn input_schema(&self) -> Value;

    async fn invoke(&self, arguments: &ToolArguments) -> Result<String, ToolError>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: Some(self.description().to_string()),
            input_schema: self.input_schema(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("tool `{0}` is registered twice")]
    DuplicateTool(String),

    #[error("no completion tool registered")]
    MissingCompletionTool,

    #[error("more than one completion tool registered: {0} and {1}")]
    MultipleCompletionTools(String, String),
}

/// Registered tools in advertisement order, with exactly one completion tool.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<dyn Tool>>,
    completion_tool: String,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("completion_tool", &self.completion_tool)
            .finish()
    }
}

impl ToolRegistry {
    #[must_use]
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    #[must_use]
    pub fn category_of(&self, name: &str) -> Option<ToolCategory> {
        self.tools.get(name).map(|tool| tool.category())
    }

    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|tool| tool.definition()).collect()
    }

    #[must_use]
    pub fn completion_tool(&self) -> &str {
        &self.completion_tool
    }

    #[must_use]
    pub fn is_completion(&self, name: &str) -> bool {
        name == self.completion_tool
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// Runs one request. Unknown tools and tool failures become error results.
    pub async fn invoke(&self, request: &ToolCallRequest) -> ToolResult {
        let Some(tool) = self.tools.get(&request.tool_name) else {
            tracing::warn!(tool = %request.tool_name, call_id = %request.call_id, "unknown tool requested");
            return ToolResult::error(
                &request.call_id,
                &request.tool_name,
                format!("Unknown tool: {}", request.tool_name),
            );
        };

        match tool.invoke(&request.arguments).await {
            Ok(content) => {
                tracing::debug!(tool = %request.tool_name, call_id = %request.call_id, bytes = content.len(), "tool finished");
                ToolResult::success(&request.call_id, &request.tool_name, content)
            }
            Err(error) => {
                tracing::debug!(tool = %request.tool_name, call_id = %request.call_id, %error, "tool failed");
                ToolResult::error(&request.call_id, &request.tool_name, error.to_string())
            }
        }
    }
}

#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistryBuilder {
    #[must_use]
    pub fn register(mut self, tool: impl Tool) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    #[must_use]
    pub fn register_arc(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn build(self) -> Result<ToolRegistry, RegistryError> {
        let mut tools: IndexMap<String, Arc<dyn Tool>> = IndexMap::new();
        let mut completion_tool: Option<String> = None;

        for tool in self.tools {
            let name = tool.name().to_string();
            if tools.contains_key(&name) {
                return Err(RegistryError::DuplicateTool(name));
            }
            if tool.category() == ToolCategory::Completion {
                if let Some(existing) = &completion_tool {
                    return Err(RegistryError::MultipleCompletionTools(existing.clone(), name));
                }
                completion_tool = Some(name.clone());
            }
            tools.insert(name, tool);
        }

        let completion_tool = completion_tool.ok_or(RegistryError::MissingCompletionTool)?;
        Ok(ToolRegistry {
            tools,
            completion_tool,
        })
    }
}

pub(crate) fn required_arg<'a>(
    arguments: &'a ToolArguments,
    name: &str,
) -> Result<&'a str, ToolError> {
    arguments
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| ToolError::MissingArgument(name.to_string()))
}

pub(crate) fn optional_arg<'a>(arguments: &'a ToolArguments, name: &str) -> Option<&'a str> {
    arguments
        .get(name)
        .map(String::as_str)
        .filter(|value| !value.trim().is_empty() && *value != "null")
}

pub(crate) fn optional_number(
    arguments: &ToolArguments,
    name: &str,
) -> Result<Option<u64>, ToolError> {
    optional_arg(arguments, name)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map_err(|_| ToolError::invalid(name, format!("expected a non-negative integer, got {raw:?}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct Fixed {
        name: &'static str,
        category: ToolCategory,
        result: Result<&'static str, &'static str>,
    }

    #[async_trait]
    impl Tool for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "fixed answer"
        }

        fn category(&self) -> ToolCategory {
            self.category
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        async fn invoke(&self, _arguments: &ToolArguments) -> Result<String, ToolError> {
            self.result
                .map(str::to_string)
                .map_err(|message| ToolError::Execution(message.to_string()))
        }
    }

    fn fixed(name: &'static str, category: ToolCategory) -> Fixed {
        Fixed {
            name,
            category,
            result: Ok("ok"),
        }
    }

    #[test]
    fn only_write_and_shell_categories_need_permission() {
        assert!(!ToolCategory::ReadOnly.requires_permission());
        assert!(ToolCategory::FileWrite.requires_permission());
        assert!(ToolCategory::Shell.requires_permission());
        assert!(!ToolCategory::Completion.requires_permission());
    }

    #[test]
    fn builder_requires_exactly_one_completion_tool() {
        let missing = ToolRegistry::builder()
            .register(fixed("look", ToolCategory::ReadOnly))
            .build();
        assert_eq!(missing.unwrap_err(), RegistryError::MissingCompletionTool);

        let twice = ToolRegistry::builder()
            .register(fixed("done", ToolCategory::Completion))
            .register(fixed("finish", ToolCategory::Completion))
            .build();
        assert_eq!(
            twice.unwrap_err(),
            RegistryError::MultipleCompletionTools("done".to_string(), "finish".to_string())
        );
    }

    #[test]
    fn builder_rejects_duplicate_names() {
        let error = ToolRegistry::builder()
            .register(fixed("look", ToolCategory::ReadOnly))
            .register(fixed("look", ToolCategory::Shell))
            .register(fixed("done", ToolCategory::Completion))
            .build()
            .unwrap_err();
        assert_eq!(error, RegistryError::DuplicateTool("look".to_string()));
    }

    #[test]
    fn definitions_keep_registration_order() {
        let registry = ToolRegistry::builder()
            .register(fixed("zeta", ToolCategory::ReadOnly))
            .register(fixed("alpha", ToolCategory::Shell))
            .register(fixed("done", ToolCategory::Completion))
            .build()
            .expect("registry");

        let names: Vec<_> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "done"]);
        assert_eq!(registry.completion_tool(), "done");
        assert_eq!(registry.category_of("alpha"), Some(ToolCategory::Shell));
        assert_eq!(registry.category_of("nope"), None);
    }

    #[tokio::test]
    async fn invoke_turns_failures_and_unknown_tools_into_error_results() {
        let registry = ToolRegistry::builder()
            .register(Fixed {
                name: "broken",
                category: ToolCategory::ReadOnly,
                result: Err("disk on fire"),
            })
            .register(fixed("done", ToolCategory::Completion))
            .build()
            .expect("registry");

        let failed = registry
            .invoke(&ToolCallRequest::new("c1", "broken", ToolArguments::new()))
            .await;
        assert!(failed.is_error);
        assert_eq!(failed.content, "disk on fire");

        let unknown = registry
            .invoke(&ToolCallRequest::new("c2", "teleport", ToolArguments::new()))
            .await;
        assert!(unknown.is_error);
        assert_eq!(unknown.content, "Unknown tool: teleport");
        assert_eq!(unknown.call_id, "c2");
    }

    #[test]
    fn optional_number_rejects_garbage() {
        let mut arguments = ToolArguments::new();
        arguments.insert("n".to_string(), "12".to_string());
        arguments.insert("bad".to_string(), "twelve".to_string());
        arguments.insert("blank".to_string(), " ".to_string());

        assert_eq!(optional_number(&arguments, "n").expect("n"), Some(12));
        assert_eq!(optional_number(&arguments, "blank").expect("blank"), None);
        assert_eq!(optional_number(&arguments, "absent").expect("absent"), None);
        assert!(optional_number(&arguments, "bad").is_err());
    }
}
