use std::path::Path;

use crate::tools::ToolRegistry;

pub const SYSTEM_INSTRUCTIONS_ENV_VAR: &str = "HELIX_SYSTEM_INSTRUCTIONS";
pub const PROJECT_INSTRUCTIONS_FILE: &str = "AGENTS.md";

pub const DEFAULT_SYSTEM_INSTRUCTIONS: &str = "You are Helix, a careful coding agent working inside the user's workspace. \
Inspect files before changing them, prefer small targeted edits, and explain what you changed. \
When the task is finished, call the completion tool exactly once with your final answer.";

pub fn system_instructions_from_env() -> String {
    sanitize_system_instructions(std::env::var(SYSTEM_INSTRUCTIONS_ENV_VAR).ok())
}

fn sanitize_system_instructions(raw: Option<String>) -> String {
    let Some(value) = raw else {
        return DEFAULT_SYSTEM_INSTRUCTIONS.to_string();
    };

    let trimmed = value.trim();
    if trimmed.is_empty() {
        DEFAULT_SYSTEM_INSTRUCTIONS.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Contents of `<cwd>/AGENTS.md`, when present and non-blank.
#[must_use]
pub fn load_project_instructions(cwd: &Path) -> Option<String> {
    let path = cwd.join(PROJECT_INSTRUCTIONS_FILE);
    match std::fs::read_to_string(&path) {
        Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Ok(_) => None,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => None,
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "cannot read project instructions");
            None
        }
    }
}

/// Base instructions, then the tool inventory, then project instructions.
#[must_use]
pub fn build_system_prompt(
    base: &str,
    registry: &ToolRegistry,
    project_instructions: Option<&str>,
) -> String {
    let mut prompt = base.trim().to_string();

    prompt.push_str("\n\n# Tools\n");
    for definition in registry.definitions() {
        prompt.push_str("- ");
        prompt.push_str(&definition.name);
        if let Some(description) = definition.description.as_deref() {
            prompt.push_str(": ");
            prompt.push_str(description);
        }
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "\nCall `{}` when you are done.",
        registry.completion_tool()
    ));

    if let Some(instructions) = project_instructions {
        prompt.push_str("\n\n# Project instructions\n");
        prompt.push_str(instructions);
    }
    prompt
}
