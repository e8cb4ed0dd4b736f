use agent_provider::{ToolArguments, ToolCallRequest, ToolResult};
use command_parser::ShellDialect;
use helix::{BuiltinTools, ToolCategory, ToolRegistry};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn workspace() -> (TempDir, ToolRegistry) {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = BuiltinTools::new(dir.path(), ShellDialect::Posix)
        .expect("workspace root")
        .with_shell_timeout(5)
        .into_registry()
        .expect("builtin registry");
    (dir, registry)
}

async fn call(registry: &ToolRegistry, tool: &str, arguments: &[(&str, &str)]) -> ToolResult {
    let arguments: ToolArguments = arguments
        .iter()
        .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
        .collect();
    registry
        .invoke(&ToolCallRequest::new("call-1", tool, arguments))
        .await
}

#[test]
fn builtin_registry_lists_tools_with_their_categories() {
    let (_dir, registry) = workspace();

    let names: Vec<_> = registry.names().collect();
    assert_eq!(
        names,
        vec![
            "read_file",
            "list_directory",
            "write_file",
            "insert_text",
            "edit_file",
            "run_shell_command",
            "final_output",
        ]
    );
    assert_eq!(registry.category_of("read_file"), Some(ToolCategory::ReadOnly));
    assert_eq!(registry.category_of("edit_file"), Some(ToolCategory::FileWrite));
    assert_eq!(registry.category_of("run_shell_command"), Some(ToolCategory::Shell));
    assert_eq!(registry.completion_tool(), "final_output");
}

#[test]
fn missing_workspace_root_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("nope");
    assert!(BuiltinTools::new(&missing, ShellDialect::Posix).is_err());
}

#[tokio::test]
async fn write_then_read_edit_and_insert() {
    let (dir, registry) = workspace();

    let written = call(
        &registry,
        "write_file",
        &[("path", "src/notes.txt"), ("content", "alpha\nbeta\ngamma\n")],
    )
    .await;
    assert!(!written.is_error, "{}", written.content);
    assert_eq!(written.content, "Wrote src/notes.txt");

    let read = call(&registry, "read_file", &[("path", "src/notes.txt")]).await;
    assert_eq!(read.content, "alpha\nbeta\ngamma\n");

    let edited = call(
        &registry,
        "edit_file",
        &[("path", "src/notes.txt"), ("old_text", "beta"), ("new_text", "BETA")],
    )
    .await;
    assert_eq!(edited.content, "Updated src/notes.txt");

    let inserted = call(
        &registry,
        "insert_text",
        &[("path", "src/notes.txt"), ("line_number", "4"), ("content", "delta")],
    )
    .await;
    assert!(!inserted.is_error, "{}", inserted.content);

    let on_disk = std::fs::read_to_string(dir.path().join("src/notes.txt")).expect("file");
    assert_eq!(on_disk, "alpha\nBETA\ngamma\ndelta\n");
}

#[tokio::test]
async fn read_file_honours_a_line_range() {
    let (dir, registry) = workspace();
    std::fs::write(dir.path().join("lines.txt"), "one\ntwo\nthree\nfour\n").expect("seed");

    let middle = call(
        &registry,
        "read_file",
        &[("path", "lines.txt"), ("start_line", "2"), ("end_line", "3")],
    )
    .await;
    assert_eq!(middle.content, "two\nthree");

    let tail = call(&registry, "read_file", &[("path", "lines.txt"), ("start_line", "3")]).await;
    assert_eq!(tail.content, "three\nfour");

    let past_end = call(&registry, "read_file", &[("path", "lines.txt"), ("start_line", "9")]).await;
    assert!(past_end.is_error);
}

#[tokio::test]
async fn edit_file_needs_exactly_one_match() {
    let (dir, registry) = workspace();
    std::fs::write(dir.path().join("dup.txt"), "x = 1\nx = 1\n").expect("seed");

    let result = call(
        &registry,
        "edit_file",
        &[("path", "dup.txt"), ("old_text", "x = 1"), ("new_text", "x = 2")],
    )
    .await;

    assert!(result.is_error);
    assert_eq!(result.content, "edit_file requires exactly one match; found 2");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("dup.txt")).expect("file"),
        "x = 1\nx = 1\n"
    );
}

#[tokio::test]
async fn list_directory_sorts_and_marks_directories() {
    let (dir, registry) = workspace();
    std::fs::create_dir(dir.path().join("src")).expect("dir");
    std::fs::write(dir.path().join("b.txt"), "").expect("file");
    std::fs::write(dir.path().join("a.txt"), "").expect("file");
    std::fs::create_dir(dir.path().join("empty")).expect("dir");

    let listing = call(&registry, "list_directory", &[]).await;
    assert_eq!(listing.content, "a.txt\nb.txt\nempty/\nsrc/");

    let empty = call(&registry, "list_directory", &[("path", "empty")]).await;
    assert_eq!(empty.content, "empty is empty");
}

#[tokio::test]
async fn paths_outside_the_workspace_are_refused() {
    let (_dir, registry) = workspace();

    let read = call(&registry, "read_file", &[("path", "/etc/hostname")]).await;
    assert!(read.is_error);

    let write = call(&registry, "write_file", &[("path", "../escape.txt"), ("content", "x")]).await;
    assert!(write.is_error);
    assert!(write.content.starts_with("Path escapes workspace root"), "{}", write.content);
}

#[tokio::test]
async fn missing_arguments_become_error_results() {
    let (_dir, registry) = workspace();

    let result = call(&registry, "write_file", &[("path", "a.txt")]).await;
    assert!(result.is_error);
    assert_eq!(result.content, "missing required argument `content`");
    assert_eq!(result.call_id, "call-1");
    assert_eq!(result.tool_name, "write_file");
}

#[tokio::test]
async fn shell_reports_status_and_both_streams_from_the_workspace_root() {
    let (dir, registry) = workspace();
    std::fs::write(dir.path().join("marker.txt"), "").expect("seed");

    let result = call(
        &registry,
        "run_shell_command",
        &[("command", "ls marker.txt; printf 'oops' >&2; exit 3")],
    )
    .await;

    assert!(!result.is_error, "a failing command is still a tool success");
    assert_eq!(
        result.content,
        "status: exit_code=3\nstdout:\nmarker.txt\n\nstderr:\noops"
    );
}

#[tokio::test]
async fn shell_commands_are_killed_at_the_timeout() {
    let (_dir, registry) = workspace();

    let result = call(
        &registry,
        "run_shell_command",
        &[("command", "sleep 30"), ("timeout_sec", "1")],
    )
    .await;

    assert!(result.is_error);
    assert_eq!(result.content, "command timed out after 1s");
}

#[tokio::test]
async fn final_output_echoes_its_message() {
    let (_dir, registry) = workspace();
    let result = call(&registry, "final_output", &[("message", "All done.")]).await;
    assert_eq!(result, ToolResult::success("call-1", "final_output", "All done."));
}
