use command_parser::{parse_command, split_segments, ParsedCommand, ShellDialect};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

#[test]
fn install_script_splits_into_independent_commands() {
    let parsed = parse_command("cd /tmp && npm install", ShellDialect::Posix);

    assert_eq!(
        parsed,
        vec![
            ParsedCommand {
                executable: "cd".to_string(),
                arguments: "/tmp".to_string(),
                full_text: "cd /tmp".to_string(),
            },
            ParsedCommand {
                executable: "npm".to_string(),
                arguments: "install".to_string(),
                full_text: "npm install".to_string(),
            },
        ]
    );
}

#[test]
fn pipeline_with_env_prefix_and_stderr_redirect() {
    let parsed = parse_command(
        "CI=1 cargo test 2>&1 | tee out.log; echo done",
        ShellDialect::Posix,
    );
    let rejoined: Vec<String> = parsed.iter().map(ParsedCommand::rejoined).collect();

    assert_eq!(
        rejoined,
        vec!["cargo test 2>&1", "tee out.log", "echo done"]
    );
    assert_eq!(parsed[0].full_text, "CI=1 cargo test 2>&1");
}

#[test]
fn split_segments_keeps_quoted_separators() {
    assert_eq!(
        split_segments(r#"git commit -m "fix; tidy" && git push"#, ShellDialect::Posix),
        vec![r#"git commit -m "fix; tidy""#, "git push"]
    );
}

#[test]
fn windows_single_ampersand_separates() {
    let parsed = parse_command("mkdir out & copy a.txt out\\", ShellDialect::Windows);
    let executables: Vec<&str> = parsed.iter().map(|c| c.executable.as_str()).collect();
    assert_eq!(executables, vec!["mkdir", "copy"]);
    assert_eq!(parsed[1].arguments, "a.txt out\\");
}

fn plain_word() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_./:,+-]{1,12}"
}

proptest! {
    #[test]
    fn plain_commands_rejoin_to_full_text(words in prop::collection::vec(plain_word(), 1..8)) {
        let input = words.join(" ");
        for dialect in [ShellDialect::Posix, ShellDialect::Windows] {
            let parsed = parse_command(&input, dialect);
            prop_assert_eq!(parsed.len(), 1);
            prop_assert_eq!(&parsed[0].rejoined(), &parsed[0].full_text);
            prop_assert_eq!(&parsed[0].full_text, &input);
        }
    }
}
