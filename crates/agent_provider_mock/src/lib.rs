//! Deterministic scripted implementation of the shared `agent_provider` contract.
//!
//! This crate contains no transport/protocol logic and is intended for local
//! development and contract-level integration testing of the agent loop.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use agent_provider::{
    fragment_stream, CompletionRequest, ModelProvider, ProviderError, ProviderProfile,
    ResponseFragment, ResponseStream, ToolArguments, ToolCallRequest,
};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

/// Stable provider identifier used for explicit startup selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

/// One scripted answer to a model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    /// Streams the fragments in order; an `Err` item fails mid-stream.
    Fragments(Vec<Result<ResponseFragment, ProviderError>>),
    /// Fails before any fragment is produced.
    Fail(ProviderError),
    /// Never resolves the call itself.
    Hang,
    /// Streams the fragments, then never finishes the stream.
    HangAfter(Vec<ResponseFragment>),
}

impl ScriptedReply {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Fragments(vec![Ok(ResponseFragment::Text(text.into()))])
    }

    #[must_use]
    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self::Fragments(
            calls
                .into_iter()
                .map(|call| Ok(ResponseFragment::ToolCall(call)))
                .collect(),
        )
    }

    #[must_use]
    pub fn text_and_tool_calls(text: impl Into<String>, calls: Vec<ToolCallRequest>) -> Self {
        let mut fragments = vec![Ok(ResponseFragment::Text(text.into()))];
        fragments.extend(
            calls
                .into_iter()
                .map(|call| Ok(ResponseFragment::ToolCall(call))),
        );
        Self::Fragments(fragments)
    }

    /// Text split on spaces into several fragments, the way a streaming model emits it.
    #[must_use]
    pub fn streamed_text(text: &str) -> Self {
        let mut fragments = Vec::new();
        let mut pending = String::new();
        for ch in text.chars() {
            pending.push(ch);
            if ch == ' ' {
                fragments.push(Ok(ResponseFragment::Text(std::mem::take(&mut pending))));
            }
        }
        if !pending.is_empty() {
            fragments.push(Ok(ResponseFragment::Text(pending)));
        }
        Self::Fragments(fragments)
    }

    #[must_use]
    pub fn rate_limited() -> Self {
        Self::Fail(ProviderError::rate_limited("429 Too Many Requests", None))
    }
}

/// Builds a tool request with ordered string arguments.
#[must_use]
pub fn tool_call(call_id: &str, tool_name: &str, arguments: &[(&str, &str)]) -> ToolCallRequest {
    let arguments: ToolArguments = arguments
        .iter()
        .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
        .collect();
    ToolCallRequest::new(call_id, tool_name, arguments)
}

#[derive(Debug, Default)]
struct ScriptState {
    replies: VecDeque<ScriptedReply>,
    requests: Vec<CompletionRequest>,
}

/// Scripted provider used by agent tests and offline runs.
///
/// Replies are consumed in order. Once the script is exhausted the provider
/// repeats its fallback reply, or fails permanently when none is set.
#[derive(Debug)]
pub struct ScriptedProvider {
    model_id: String,
    fallback: Option<ScriptedReply>,
    state: Mutex<ScriptState>,
}

impl ScriptedProvider {
    #[must_use]
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            model_id: "mock".to_string(),
            fallback: None,
            state: Mutex::new(ScriptState {
                replies: replies.into(),
                requests: Vec::new(),
            }),
        }
    }

    /// Answers every call with `reply`.
    #[must_use]
    pub fn repeating(reply: ScriptedReply) -> Self {
        Self::new(Vec::new()).with_fallback(reply)
    }

    #[must_use]
    pub fn with_fallback(mut self, reply: ScriptedReply) -> Self {
        self.fallback = Some(reply);
        self
    }

    #[must_use]
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Appends replies to the end of the script.
    pub fn enqueue(&self, replies: impl IntoIterator<Item = ScriptedReply>) {
        lock_unpoisoned(&self.state).replies.extend(replies);
    }

    /// Number of model calls received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        lock_unpoisoned(&self.state).requests.len()
    }

    /// Every request received so far, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock_unpoisoned(&self.state).requests.clone()
    }

    #[must_use]
    pub fn remaining_replies(&self) -> usize {
        lock_unpoisoned(&self.state).replies.len()
    }

    fn next_reply(&self, request: CompletionRequest) -> Option<ScriptedReply> {
        let mut state = lock_unpoisoned(&self.state);
        state.requests.push(request);
        state
            .replies
            .pop_front()
            .or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: MOCK_PROVIDER_ID.to_string(),
            model_id: self.model_id.clone(),
        }
    }

    async fn complete(&self, request: CompletionRequest) -> Result<ResponseStream, ProviderError> {
        match self.next_reply(request) {
            Some(ScriptedReply::Fragments(fragments)) => Ok(fragment_stream(fragments)),
            Some(ScriptedReply::Fail(error)) => Err(error),
            Some(ScriptedReply::Hang) => futures_util::future::pending().await,
            Some(ScriptedReply::HangAfter(fragments)) => {
                let head = fragments
                    .into_iter()
                    .map(Ok::<ResponseFragment, ProviderError>);
                Ok(stream::iter(head).chain(stream::pending()).boxed())
            }
            None => Err(ProviderError::permanent(
                None,
                "scripted provider has no replies left",
            )),
        }
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
