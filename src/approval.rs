//! Permission decisions for tool requests.
//!
//! Static allow/deny rules are checked first; deny wins. Anything no rule
//! decides falls back to the tool category: read-only and completion tools
//! run, file writes and shell commands ask.

use std::fmt;
use std::sync::OnceLock;

use agent_provider::ToolCallRequest;
use command_parser::{parse_command, ParsedCommand, ShellDialect};
use regex::Regex;

use crate::config::Permissions;
use crate::tools::ToolCategory;

/// Name of the tool whose `command` argument pattern rules match against.
pub const SHELL_TOOL_NAME: &str = "run_shell_command";

/// One allow or deny entry: `tool_name` or `tool_name(pattern)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PermissionRule {
    Tool(String),
    Pattern { tool: String, pattern: String },
}

impl PermissionRule {
    /// Parses a rule. Text outside the grammar becomes a bare tool name.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let Some(captures) = rule_regex().captures(raw) else {
            return Self::Tool(raw.to_string());
        };
        let tool = captures[1].to_string();
        match captures.get(2) {
            Some(pattern) => Self::Pattern {
                tool,
                pattern: pattern.as_str().trim().to_string(),
            },
            None => Self::Tool(tool),
        }
    }

    /// The "always allow" rule for a request the user just approved.
    ///
    /// Shell commands are widened to their first word (`git:*`); every other
    /// tool is allowed by name.
    #[must_use]
    pub fn always_allow(request: &ToolCallRequest) -> Self {
        if request.tool_name != SHELL_TOOL_NAME {
            return Self::Tool(request.tool_name.clone());
        }
        let command = request
            .arguments
            .get("command")
            .map(String::as_str)
            .unwrap_or_default();
        let first_word = command.split_whitespace().next().unwrap_or(command.trim());
        Self::Pattern {
            tool: SHELL_TOOL_NAME.to_string(),
            pattern: format!("{first_word}:*"),
        }
    }

    #[must_use]
    pub fn tool(&self) -> &str {
        match self {
            Self::Tool(tool) | Self::Pattern { tool, .. } => tool,
        }
    }

    fn matches_whole_call(&self, tool_name: &str) -> bool {
        matches!(self, Self::Tool(tool) if tool == tool_name)
    }

    fn matches_segment(&self, tool_name: &str, segment: &ParsedCommand) -> bool {
        match self {
            Self::Pattern { tool, pattern } if tool == tool_name && tool == SHELL_TOOL_NAME => {
                segment.has_executable() && match_command_pattern(&segment.rejoined(), pattern)
            }
            _ => false,
        }
    }
}

impl fmt::Display for PermissionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tool(tool) => f.write_str(tool),
            Self::Pattern { tool, pattern } => write!(f, "{tool}({pattern})"),
        }
    }
}

fn rule_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([a-z_]+)(?:\((.+)\))?$").expect("rule pattern is valid"))
}

/// `prefix:*` matches `prefix` alone or followed by a space; anything else is exact.
fn match_command_pattern(command: &str, pattern: &str) -> bool {
    let command = command.trim();
    let pattern = pattern.trim();
    match pattern.strip_suffix(":*") {
        Some(prefix) => {
            command == prefix
                || command
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with(' '))
        }
        None => command == pattern,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Run now.
    Allow,
    /// Never run; the model gets a denial result.
    Deny,
    /// Park as a pending call until a human decides.
    Ask,
}

#[derive(Debug, Clone, Default)]
pub struct ApprovalGate {
    allow: Vec<PermissionRule>,
    deny: Vec<PermissionRule>,
    dialect: ShellDialect,
}

impl ApprovalGate {
    #[must_use]
    pub fn new(permissions: &Permissions, dialect: ShellDialect) -> Self {
        Self {
            allow: permissions.allow.iter().map(|rule| PermissionRule::parse(rule)).collect(),
            deny: permissions.deny.iter().map(|rule| PermissionRule::parse(rule)).collect(),
            dialect,
        }
    }

    /// Gate with no rules: decisions come from tool categories alone.
    #[must_use]
    pub fn category_defaults(dialect: ShellDialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn allow_rules(&self) -> &[PermissionRule] {
        &self.allow
    }

    /// Returns false when the rule was already present.
    pub fn add_allow_rule(&mut self, rule: PermissionRule) -> bool {
        if self.allow.contains(&rule) {
            return false;
        }
        self.allow.push(rule);
        true
    }

    /// True when the request must wait for a human decision.
    #[must_use]
    pub fn requires_permission(&self, category: ToolCategory, request: &ToolCallRequest) -> bool {
        self.evaluate(category, request) == GateDecision::Ask
    }

    #[must_use]
    pub fn evaluate(&self, category: ToolCategory, request: &ToolCallRequest) -> GateDecision {
        let tool_name = request.tool_name.as_str();
        let segments = self.segments(request);

        if self.deny.iter().any(|rule| {
            rule.matches_whole_call(tool_name)
                || segments.iter().any(|segment| rule.matches_segment(tool_name, segment))
        }) {
            return GateDecision::Deny;
        }

        let allowed_by_name = self.allow.iter().any(|rule| rule.matches_whole_call(tool_name));
        let allowed_by_pattern = !segments.is_empty()
            && segments.iter().all(|segment| {
                self.allow
                    .iter()
                    .any(|rule| rule.matches_segment(tool_name, segment))
            });
        if allowed_by_name || allowed_by_pattern {
            return GateDecision::Allow;
        }

        if category.requires_permission() {
            GateDecision::Ask
        } else {
            GateDecision::Allow
        }
    }

    fn segments(&self, request: &ToolCallRequest) -> Vec<ParsedCommand> {
        if request.tool_name != SHELL_TOOL_NAME {
            return Vec::new();
        }
        request
            .arguments
            .get("command")
            .map(|command| parse_command(command, self.dialect))
            .unwrap_or_default()
    }
}
