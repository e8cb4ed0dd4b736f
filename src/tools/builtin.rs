use std::path::{Component, Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use agent_provider::ToolArguments;
use async_trait::async_trait;
use command_parser::ShellDialect;
use serde_json::{json, Value};
use tokio::process::Command;

use super::{optional_arg, optional_number, required_arg, RegistryError, Tool, ToolCategory, ToolRegistry};
use crate::error::ToolError;

pub const DEFAULT_SHELL_TIMEOUT_SEC: u64 = 30;
pub const DEFAULT_SHELL_MAX_OUTPUT_BYTES: usize = 100 * 1024;
pub const DEFAULT_READ_MAX_BYTES: usize = 200 * 1024;

/// Canonical directory every file tool is confined to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRoot {
    root: PathBuf,
}

impl WorkspaceRoot {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ToolError> {
        let root = root.into();
        let canonical = root
            .canonicalize()
            .map_err(|source| ToolError::io("Failed to resolve workspace root", &root, source))?;
        if !canonical.is_dir() {
            return Err(ToolError::invalid("workspace_root", "must be a directory"));
        }
        Ok(Self { root: canonical })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolves a path that must already exist inside the workspace.
    pub fn resolve_existing(&self, path: &str) -> Result<PathBuf, ToolError> {
        let candidate = self.candidate(path)?;
        let canonical = candidate
            .canonicalize()
            .map_err(|source| ToolError::io("Failed to resolve path", &candidate, source))?;
        self.ensure_inside(&canonical)?;
        Ok(canonical)
    }

    /// Resolves a write target whose nearest existing ancestor lies inside the workspace.
    /// `..` is folded lexically first, so nothing outside the root is ever created.
    pub fn resolve_write(&self, path: &str) -> Result<PathBuf, ToolError> {
        let candidate = normalize_lexically(&self.candidate(path)?);
        self.ensure_inside(&candidate)?;
        let parent = candidate
            .parent()
            .ok_or_else(|| ToolError::invalid("path", "has no parent directory"))?;
        let anchor = canonicalize_existing_ancestor(parent)?;
        self.ensure_inside(&anchor)?;
        Ok(candidate)
    }

    fn candidate(&self, path: &str) -> Result<PathBuf, ToolError> {
        if path.trim().is_empty() {
            return Err(ToolError::invalid("path", "must not be empty"));
        }
        let path = Path::new(path);
        Ok(if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        })
    }

    fn ensure_inside(&self, canonical: &Path) -> Result<(), ToolError> {
        if canonical.starts_with(&self.root) {
            Ok(())
        } else {
            Err(ToolError::WorkspaceEscape(canonical.to_path_buf()))
        }
    }

    fn display<'a>(&self, path: &'a Path) -> std::borrow::Cow<'a, str> {
        match path.strip_prefix(&self.root) {
            Ok(relative) if relative.as_os_str().is_empty() => ".".into(),
            Ok(relative) => relative.to_string_lossy(),
            Err(_) => path.to_string_lossy(),
        }
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

fn canonicalize_existing_ancestor(path: &Path) -> Result<PathBuf, ToolError> {
    for ancestor in path.ancestors() {
        if ancestor.exists() {
            return ancestor
                .canonicalize()
                .map_err(|source| ToolError::io("Failed to resolve path", ancestor, source));
        }
    }
    Err(ToolError::invalid(
        "path",
        format!("no existing ancestor for {}", path.display()),
    ))
}

/// The stock tool set: file access, shell, and `final_output`.
#[derive(Debug, Clone)]
pub struct BuiltinTools {
    root: Arc<WorkspaceRoot>,
    dialect: ShellDialect,
    shell_timeout_sec: u64,
}

impl BuiltinTools {
    pub fn new(workspace_root: impl Into<PathBuf>, dialect: ShellDialect) -> Result<Self, ToolError> {
        Ok(Self {
            root: Arc::new(WorkspaceRoot::new(workspace_root)?),
            dialect,
            shell_timeout_sec: DEFAULT_SHELL_TIMEOUT_SEC,
        })
    }

    #[must_use]
    pub fn with_shell_timeout(mut self, seconds: u64) -> Self {
        self.shell_timeout_sec = seconds;
        self
    }

    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        self.root.path()
    }

    pub fn into_registry(self) -> Result<ToolRegistry, RegistryError> {
        ToolRegistry::builder()
            .register(ReadFileTool::new(Arc::clone(&self.root)))
            .register(ListDirectoryTool::new(Arc::clone(&self.root)))
            .register(WriteFileTool::new(Arc::clone(&self.root)))
            .register(InsertTextTool::new(Arc::clone(&self.root)))
            .register(EditFileTool::new(Arc::clone(&self.root)))
            .register(
                RunShellCommandTool::new(Arc::clone(&self.root), self.dialect)
                    .with_default_timeout(self.shell_timeout_sec),
            )
            .register(FinalOutputTool)
            .build()
    }
}

#[derive(Debug, Clone)]
pub struct ReadFileTool {
    root: Arc<WorkspaceRoot>,
    max_bytes: usize,
}

impl ReadFileTool {
    #[must_use]
    pub fn new(root: Arc<WorkspaceRoot>) -> Self {
        Self {
            root,
            max_bytes: DEFAULT_READ_MAX_BYTES,
        }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a UTF-8 text file in the workspace, optionally limited to a 1-based inclusive line range."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::ReadOnly
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File path relative to the workspace root"},
                "start_line": {"type": "integer", "description": "First line to return (1-based)"},
                "end_line": {"type": "integer", "description": "Last line to return (inclusive)"}
            },
            "required": ["path"]
        })
    }

    async fn invoke(&self, arguments: &ToolArguments) -> Result<String, ToolError> {
        let resolved = self.root.resolve_existing(required_arg(arguments, "path")?)?;
        let bytes = tokio::fs::read(&resolved)
            .await
            .map_err(|source| ToolError::io("Failed to read file", &resolved, source))?;
        if bytes.len() > self.max_bytes {
            return Err(ToolError::Execution(format!(
                "File exceeds max read size ({} bytes > {} bytes)",
                bytes.len(),
                self.max_bytes
            )));
        }
        let content = String::from_utf8(bytes)
            .map_err(|_| ToolError::Execution("File is not valid UTF-8 text".to_string()))?;

        let start = optional_number(arguments, "start_line")?;
        let end = optional_number(arguments, "end_line")?;
        if start.is_none() && end.is_none() {
            return Ok(content);
        }
        select_lines(&content, start.unwrap_or(1), end)
    }
}

fn select_lines(content: &str, start: u64, end: Option<u64>) -> Result<String, ToolError> {
    if start == 0 {
        return Err(ToolError::invalid("start_line", "lines are numbered from 1"));
    }
    let lines: Vec<&str> = content.lines().collect();
    let total = lines.len() as u64;
    if start > total {
        return Err(ToolError::invalid(
            "start_line",
            format!("{start} is past the end of the file ({total} lines)"),
        ));
    }
    let end = end.unwrap_or(total).min(total);
    if end < start {
        return Err(ToolError::invalid("end_line", format!("{end} is before start_line {start}")));
    }
    let from = usize::try_from(start - 1).unwrap_or(usize::MAX);
    let to = usize::try_from(end).unwrap_or(usize::MAX);
    Ok(lines[from..to].join("\n"))
}

#[derive(Debug, Clone)]
pub struct ListDirectoryTool {
    root: Arc<WorkspaceRoot>,
}

impl ListDirectoryTool {
    #[must_use]
    pub fn new(root: Arc<WorkspaceRoot>) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List the entries of a workspace directory. Directories end with '/'."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::ReadOnly
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory relative to the workspace root (default '.')"}
            }
        })
    }

    async fn invoke(&self, arguments: &ToolArguments) -> Result<String, ToolError> {
        let path = optional_arg(arguments, "path").unwrap_or(".");
        let resolved = self.root.resolve_existing(path)?;
        let mut reader = tokio::fs::read_dir(&resolved)
            .await
            .map_err(|source| ToolError::io("Failed to list directory", &resolved, source))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|source| ToolError::io("Failed to list directory", &resolved, source))?
        {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry
                .file_type()
                .await
                .map(|file_type| file_type.is_dir())
                .unwrap_or(false);
            if is_dir {
                name.push('/');
            }
            entries.push(name);
        }
        entries.sort();

        if entries.is_empty() {
            Ok(format!("{} is empty", self.root.display(&resolved)))
        } else {
            Ok(entries.join("\n"))
        }
    }
}

#[derive(Debug, Clone)]
pub struct WriteFileTool {
    root: Arc<WorkspaceRoot>,
}

impl WriteFileTool {
    #[must_use]
    pub fn new(root: Arc<WorkspaceRoot>) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a workspace file. Missing parent directories are created."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::FileWrite
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "content": {"type": "string"}
            },
            "required": ["path", "content"]
        })
    }

    async fn invoke(&self, arguments: &ToolArguments) -> Result<String, ToolError> {
        let resolved = self.root.resolve_write(required_arg(arguments, "path")?)?;
        let content = required_arg(arguments, "content")?;

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ToolError::io("Failed to create parent directories", parent, source))?;
            let canonical_parent = parent
                .canonicalize()
                .map_err(|source| ToolError::io("Failed to resolve write parent", parent, source))?;
            self.root.ensure_inside(&canonical_parent)?;
        }

        tokio::fs::write(&resolved, content)
            .await
            .map_err(|source| ToolError::io("Failed to write file", &resolved, source))?;
        Ok(format!("Wrote {}", self.root.display(&resolved)))
    }
}

#[derive(Debug, Clone)]
pub struct InsertTextTool {
    root: Arc<WorkspaceRoot>,
}

impl InsertTextTool {
    #[must_use]
    pub fn new(root: Arc<WorkspaceRoot>) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for InsertTextTool {
    fn name(&self) -> &str {
        "insert_text"
    }

    fn description(&self) -> &str {
        "Insert text before a 1-based line of an existing file. Use one past the last line to append."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::FileWrite
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "line_number": {"type": "integer"},
                "content": {"type": "string"}
            },
            "required": ["path", "line_number", "content"]
        })
    }

    async fn invoke(&self, arguments: &ToolArguments) -> Result<String, ToolError> {
        let resolved = self.root.resolve_existing(required_arg(arguments, "path")?)?;
        let line_number = optional_number(arguments, "line_number")?
            .ok_or_else(|| ToolError::MissingArgument("line_number".to_string()))?;
        let content = required_arg(arguments, "content")?;

        let current = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|source| ToolError::io("Failed to read file", &resolved, source))?;
        let updated = insert_at_line(&current, line_number, content)?;
        tokio::fs::write(&resolved, updated)
            .await
            .map_err(|source| ToolError::io("Failed to write file", &resolved, source))?;
        Ok(format!(
            "Inserted text at line {line_number} of {}",
            self.root.display(&resolved)
        ))
    }
}

fn insert_at_line(current: &str, line_number: u64, content: &str) -> Result<String, ToolError> {
    let mut lines: Vec<&str> = current.lines().collect();
    let max = lines.len() as u64 + 1;
    if line_number == 0 || line_number > max {
        return Err(ToolError::invalid(
            "line_number",
            format!("must be between 1 and {max}"),
        ));
    }
    let index = usize::try_from(line_number - 1).unwrap_or(lines.len());
    let inserted = content.strip_suffix('\n').unwrap_or(content);
    lines.insert(index, inserted);

    let mut updated = lines.join("\n");
    if current.ends_with('\n') || current.is_empty() {
        updated.push('\n');
    }
    Ok(updated)
}

#[derive(Debug, Clone)]
pub struct EditFileTool {
    root: Arc<WorkspaceRoot>,
}

impl EditFileTool {
    #[must_use]
    pub fn new(root: Arc<WorkspaceRoot>) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace exactly one occurrence of old_text with new_text in a workspace file."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::FileWrite
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "old_text": {"type": "string"},
                "new_text": {"type": "string"}
            },
            "required": ["path", "old_text", "new_text"]
        })
    }

    async fn invoke(&self, arguments: &ToolArguments) -> Result<String, ToolError> {
        let old_text = required_arg(arguments, "old_text")?;
        if old_text.is_empty() {
            return Err(ToolError::invalid("old_text", "must not be empty"));
        }
        let new_text = required_arg(arguments, "new_text")?;
        let resolved = self.root.resolve_existing(required_arg(arguments, "path")?)?;

        let current = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|source| ToolError::io("Failed to read file", &resolved, source))?;
        let occurrences = current.match_indices(old_text).count();
        if occurrences != 1 {
            return Err(ToolError::Execution(format!(
                "edit_file requires exactly one match; found {occurrences}"
            )));
        }

        tokio::fs::write(&resolved, current.replacen(old_text, new_text, 1))
            .await
            .map_err(|source| ToolError::io("Failed to write file", &resolved, source))?;
        Ok(format!("Updated {}", self.root.display(&resolved)))
    }
}

/// Runs the command string as given through the host shell.
#[derive(Debug, Clone)]
pub struct RunShellCommandTool {
    root: Arc<WorkspaceRoot>,
    dialect: ShellDialect,
    default_timeout_sec: u64,
    max_output_bytes: usize,
}

impl RunShellCommandTool {
    #[must_use]
    pub fn new(root: Arc<WorkspaceRoot>, dialect: ShellDialect) -> Self {
        Self {
            root,
            dialect,
            default_timeout_sec: DEFAULT_SHELL_TIMEOUT_SEC,
            max_output_bytes: DEFAULT_SHELL_MAX_OUTPUT_BYTES,
        }
    }

    #[must_use]
    pub fn with_default_timeout(mut self, seconds: u64) -> Self {
        self.default_timeout_sec = seconds;
        self
    }

    fn command(&self, command: &str) -> Command {
        let mut builder = match self.dialect {
            ShellDialect::Posix => {
                let mut builder = Command::new("bash");
                builder.arg("-lc");
                builder
            }
            ShellDialect::Windows => {
                let mut builder = Command::new("cmd");
                builder.arg("/C");
                builder
            }
        };
        builder
            .arg(command)
            .current_dir(self.root.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        builder
    }
}

#[async_trait]
impl Tool for RunShellCommandTool {
    fn name(&self) -> &str {
        "run_shell_command"
    }

    fn description(&self) -> &str {
        "Run a shell command in the workspace root and return its exit status, stdout and stderr."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Shell
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string"},
                "timeout_sec": {"type": "integer", "description": "Defaults to 30"}
            },
            "required": ["command"]
        })
    }

    async fn invoke(&self, arguments: &ToolArguments) -> Result<String, ToolError> {
        let command = required_arg(arguments, "command")?;
        if command.trim().is_empty() {
            return Err(ToolError::invalid("command", "must not be empty"));
        }
        let timeout = optional_number(arguments, "timeout_sec")?.unwrap_or(self.default_timeout_sec);

        let child = self
            .command(command)
            .spawn()
            .map_err(|error| ToolError::Execution(format!("Failed to launch shell command: {error}")))?;

        let output = tokio::time::timeout(Duration::from_secs(timeout), child.wait_with_output())
            .await
            .map_err(|_| ToolError::Timeout(timeout))?
            .map_err(|error| ToolError::Execution(format!("Failed waiting for shell command: {error}")))?;

        let content = format!(
            "status: {}\nstdout:\n{}\nstderr:\n{}",
            format_exit_status(output.status),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        Ok(truncate_to_byte_limit(content, self.max_output_bytes))
    }
}

fn format_exit_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit_code={code}"),
        None => "exit_code=terminated_by_signal".to_string(),
    }
}

fn truncate_to_byte_limit(content: String, max_bytes: usize) -> String {
    if content.len() <= max_bytes {
        return content;
    }
    let mut cutoff = max_bytes;
    while cutoff > 0 && !content.is_char_boundary(cutoff) {
        cutoff -= 1;
    }
    let mut truncated = content[..cutoff].to_string();
    truncated.push_str("\n[truncated]");
    truncated
}

/// Completion tool. Its result content is the final message for the user.
#[derive(Debug, Clone, Copy, Default)]
pub struct FinalOutputTool;

#[async_trait]
impl Tool for FinalOutputTool {
    fn name(&self) -> &str {
        "final_output"
    }

    fn description(&self) -> &str {
        "Finish the task. Call exactly once, with the final message for the user."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Completion
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {"type": "string", "description": "Final answer shown to the user"}
            },
            "required": ["message"]
        })
    }

    async fn invoke(&self, arguments: &ToolArguments) -> Result<String, ToolError> {
        Ok(required_arg(arguments, "message")?.to_string())
    }
}
