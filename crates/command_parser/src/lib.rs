//! Shell command line splitting for permission-pattern matching.
//!
//! The output is advisory. Callers execute the original command string and only
//! use the parsed segments to decide whether that string is allowed to run.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Quoting and escaping rules of the shell that will run the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellDialect {
    /// `sh`-like shells: backslash escapes outside single quotes.
    #[default]
    Posix,
    /// `cmd.exe`: caret escapes outside double quotes, backslash is a path separator.
    Windows,
}

impl ShellDialect {
    /// Dialect of the shell the tool runtime spawns on this platform.
    #[must_use]
    pub fn host() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Posix
        }
    }

    fn escape_char(self) -> char {
        match self {
            Self::Posix => '\\',
            Self::Windows => '^',
        }
    }

    fn escapes_inside_double_quotes(self) -> bool {
        matches!(self, Self::Posix)
    }
}

/// One command segment of a command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCommand {
    /// Empty when the segment holds only assignments or redirections.
    pub executable: String,
    /// Tokens after the executable joined by single spaces; empty when there are none.
    pub arguments: String,
    /// The segment as written, trimmed.
    pub full_text: String,
}

impl ParsedCommand {
    #[must_use]
    pub fn has_executable(&self) -> bool {
        !self.executable.is_empty()
    }

    /// `executable` and `arguments` joined the way permission patterns are written.
    #[must_use]
    pub fn rejoined(&self) -> String {
        if self.arguments.is_empty() {
            self.executable.clone()
        } else {
            format!("{} {}", self.executable, self.arguments)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    Single,
    Double,
}

/// Splits `input` into segments and extracts the executable of each.
///
/// Every segment is returned, one per [`split_segments`] entry. Segments with
/// no executable (only assignments or redirections) keep their `full_text`
/// with an empty `executable`. Blank input yields an empty list.
#[must_use]
pub fn parse_command(input: &str, dialect: ShellDialect) -> Vec<ParsedCommand> {
    split_segments(input, dialect)
        .into_iter()
        .map(|segment| parse_segment(&segment, dialect))
        .collect()
}

/// Splits a command line on unquoted `&&`, `||`, `|`, `;`, `&` and newlines.
///
/// Returned segments are trimmed and never empty.
#[must_use]
pub fn split_segments(input: &str, dialect: ShellDialect) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let escape = dialect.escape_char();
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<Quote> = None;
    let mut index = 0;

    while index < chars.len() {
        let ch = chars[index];
        let next = chars.get(index + 1).copied();

        match quote {
            Some(Quote::Single) => {
                current.push(ch);
                if ch == '\'' {
                    quote = None;
                }
            }
            Some(Quote::Double) => {
                if ch == escape && dialect.escapes_inside_double_quotes() {
                    if let Some(escaped) = next {
                        current.push(ch);
                        current.push(escaped);
                        index += 2;
                        continue;
                    }
                }
                current.push(ch);
                if ch == '"' {
                    quote = None;
                }
            }
            None => {
                if ch == escape {
                    if let Some(escaped) = next {
                        current.push(ch);
                        current.push(escaped);
                        index += 2;
                        continue;
                    }
                }
                match ch {
                    '\'' => {
                        quote = Some(Quote::Single);
                        current.push(ch);
                    }
                    '"' => {
                        quote = Some(Quote::Double);
                        current.push(ch);
                    }
                    '&' | '|' if next == Some(ch) => {
                        flush_segment(&mut segments, &mut current);
                        index += 2;
                        continue;
                    }
                    '&' if is_redirection_ampersand(&current, next) => current.push(ch),
                    '|' | ';' | '&' | '\n' | '\r' => flush_segment(&mut segments, &mut current),
                    _ => current.push(ch),
                }
            }
        }
        index += 1;
    }

    flush_segment(&mut segments, &mut current);
    segments
}

// `2>&1`, `>&2` and `&>file` keep their ampersand.
fn is_redirection_ampersand(current: &str, next: Option<char>) -> bool {
    current.ends_with(&['>', '<'][..]) || next == Some('>')
}

fn flush_segment(segments: &mut Vec<String>, current: &mut String) {
    let segment = current.trim();
    if !segment.is_empty() {
        segments.push(segment.to_string());
    }
    current.clear();
}

/// Splits one segment on unquoted whitespace.
///
/// Quotes and escapes stay in the tokens exactly as written.
#[must_use]
pub fn tokenize(segment: &str, dialect: ShellDialect) -> Vec<String> {
    let escape = dialect.escape_char();
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<Quote> = None;
    let mut chars = segment.chars();

    while let Some(ch) = chars.next() {
        match quote {
            Some(Quote::Single) => {
                current.push(ch);
                if ch == '\'' {
                    quote = None;
                }
            }
            Some(Quote::Double) => {
                current.push(ch);
                if ch == escape && dialect.escapes_inside_double_quotes() {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                } else if ch == '"' {
                    quote = None;
                }
            }
            None if ch.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            None => {
                current.push(ch);
                if ch == escape {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                } else if ch == '\'' {
                    quote = Some(Quote::Single);
                } else if ch == '"' {
                    quote = Some(Quote::Double);
                }
            }
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn parse_segment(segment: &str, dialect: ShellDialect) -> ParsedCommand {
    let tokens = tokenize(segment, dialect);
    let full_text = segment.trim().to_string();
    let Some(position) = tokens
        .iter()
        .position(|token| !is_assignment(token) && !is_redirection(token))
    else {
        return ParsedCommand {
            executable: String::new(),
            arguments: String::new(),
            full_text,
        };
    };

    ParsedCommand {
        executable: strip_quotes(&tokens[position]).to_string(),
        arguments: tokens[position + 1..].join(" "),
        full_text,
    }
}

fn assignment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*\+?=").expect("assignment pattern is valid")
    })
}

fn redirection_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:\d*(?:>>?|<<?<?|>&|<&|>\|)(?:\d+|-)?|&>>?)$")
            .expect("redirection pattern is valid")
    })
}

fn is_assignment(token: &str) -> bool {
    assignment_regex().is_match(token)
}

fn is_redirection(token: &str) -> bool {
    redirection_regex().is_match(token)
}

fn strip_quotes(token: &str) -> &str {
    for quote in ['"', '\''] {
        if token.len() >= 2 && token.starts_with(quote) && token.ends_with(quote) {
            return &token[1..token.len() - 1];
        }
    }
    token
}
