use serde_json::Value;

/// One meaningful item of an `/api/chat` response stream.
#[derive(Debug, Clone, PartialEq)]
pub enum OllamaStreamEvent {
    Content(String),
    ToolCall { name: String, arguments: Value },
    /// Final line (`"done": true`), with Ollama's reason when present.
    Done { reason: Option<String> },
    Error(String),
}

/// Incremental parser for newline-delimited JSON streams.
///
/// Bytes are buffered until a full line is available so that multi-byte
/// characters split across chunks survive intact.
#[derive(Debug, Default)]
pub struct NdjsonStreamParser {
    buffer: Vec<u8>,
}

impl NdjsonStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<OllamaStreamEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(split) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=split).collect();
            parse_line(&line, &mut events);
        }

        events
    }

    /// Drains a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<OllamaStreamEvent> {
        let line = std::mem::take(&mut self.buffer);
        let mut events = Vec::new();
        parse_line(&line, &mut events);
        events
    }

    /// Parse a complete NDJSON payload in one shot.
    pub fn parse_lines(input: &str) -> Vec<OllamaStreamEvent> {
        let mut parser = Self::default();
        let mut events = parser.feed(input.as_bytes());
        events.extend(parser.finish());
        events
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }
}

fn parse_line(line: &[u8], events: &mut Vec<OllamaStreamEvent>) {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return;
    }

    match serde_json::from_str::<Value>(text) {
        Ok(value) => map_line(value, events),
        Err(error) => {
            tracing::warn!(%error, line = %text, "skipping malformed NDJSON line");
        }
    }
}

fn map_line(value: Value, events: &mut Vec<OllamaStreamEvent>) {
    if let Some(error) = value.get("error") {
        let message = error
            .as_str()
            .map(ToString::to_string)
            .unwrap_or_else(|| error.to_string());
        events.push(OllamaStreamEvent::Error(message));
        return;
    }

    if let Some(message) = value.get("message") {
        let content = message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or("");
        if !content.is_empty() {
            events.push(OllamaStreamEvent::Content(content.to_string()));
        }

        let calls = message
            .get("tool_calls")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for call in calls {
            let Some(function) = call.get("function") else {
                continue;
            };
            let Some(name) = function.get("name").and_then(Value::as_str) else {
                continue;
            };
            events.push(OllamaStreamEvent::ToolCall {
                name: name.to_string(),
                arguments: normalize_arguments(function.get("arguments")),
            });
        }
    }

    if value.get("done").and_then(Value::as_bool) == Some(true) {
        let reason = value
            .get("done_reason")
            .and_then(Value::as_str)
            .map(ToString::to_string);
        events.push(OllamaStreamEvent::Done { reason });
    }
}

// Some models emit arguments as a JSON-encoded string instead of an object.
fn normalize_arguments(arguments: Option<&Value>) -> Value {
    match arguments {
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(parsed @ Value::Object(_)) => parsed,
            _ => Value::String(raw.clone()),
        },
        Some(other) => other.clone(),
        None => Value::Null,
    }
}
