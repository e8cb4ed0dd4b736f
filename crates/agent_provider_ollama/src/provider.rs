use std::collections::VecDeque;

use agent_provider::{
    stringify_arguments, CompletionRequest, ModelProvider, ProviderError, ProviderInitError,
    ProviderProfile, ResponseFragment, ResponseStream, ToolCallRequest,
};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use crate::client::{OllamaClient, OllamaStatus};
use crate::config::OllamaConfig;
use crate::error::OllamaError;
use crate::ndjson::{NdjsonStreamParser, OllamaStreamEvent};
use crate::payload::ChatRequest;

/// Stable provider identifier used for startup selection.
pub const OLLAMA_PROVIDER_ID: &str = "ollama";

type FragmentResult = Result<ResponseFragment, ProviderError>;

/// `ModelProvider` adapter over [`OllamaClient`].
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: OllamaClient,
}

impl OllamaProvider {
    pub fn new(config: OllamaConfig) -> Result<Self, ProviderInitError> {
        let client = OllamaClient::new(config).map_err(|error| {
            ProviderInitError::new(format!("failed to initialize Ollama provider: {error}"))
        })?;
        Ok(Self { client })
    }

    #[must_use]
    pub fn client(&self) -> &OllamaClient {
        &self.client
    }

    pub async fn check_status(&self) -> OllamaStatus {
        self.client.check_status().await
    }
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: OLLAMA_PROVIDER_ID.to_string(),
            model_id: self.client.config().model.clone(),
        }
    }

    async fn complete(&self, request: CompletionRequest) -> Result<ResponseStream, ProviderError> {
        let config = self.client.config();
        let chat = ChatRequest::from_completion(&config.model, config.num_ctx, &request);
        let response = self.client.send_chat(&chat).await?;
        Ok(fragments_from_bytes(response.bytes_stream()))
    }
}

struct StreamState<S> {
    bytes: S,
    parser: NdjsonStreamParser,
    queue: VecDeque<FragmentResult>,
    finished: bool,
}

/// Turns a raw NDJSON byte stream into response fragments.
///
/// A transport error or an in-stream `error` line ends the stream after
/// yielding that error.
pub fn fragments_from_bytes<S, B>(bytes: S) -> ResponseStream
where
    S: futures_util::Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = StreamState {
        bytes: Box::pin(bytes),
        parser: NdjsonStreamParser::default(),
        queue: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.queue.pop_front() {
                if item.is_err() {
                    state.finished = true;
                    state.queue.clear();
                }
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = state.parser.feed(chunk.as_ref());
                    state.queue.extend(events.into_iter().filter_map(event_to_fragment));
                }
                Some(Err(error)) => {
                    state
                        .queue
                        .push_back(Err(ProviderError::from(OllamaError::Request(error))));
                }
                None => {
                    let events = state.parser.finish();
                    state.queue.extend(events.into_iter().filter_map(event_to_fragment));
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}

fn event_to_fragment(event: OllamaStreamEvent) -> Option<FragmentResult> {
    match event {
        OllamaStreamEvent::Content(text) => Some(Ok(ResponseFragment::Text(text))),
        OllamaStreamEvent::ToolCall { name, arguments } => {
            let call_id = format!("call_{}", uuid::Uuid::new_v4().simple());
            Some(Ok(ResponseFragment::ToolCall(ToolCallRequest::new(
                call_id,
                name,
                stringify_arguments(&arguments),
            ))))
        }
        OllamaStreamEvent::Done { reason } => {
            tracing::trace!(reason = ?reason, "Ollama stream finished");
            None
        }
        OllamaStreamEvent::Error(message) => {
            Some(Err(ProviderError::from(OllamaError::StreamFailed(message))))
        }
    }
}

#[cfg(test)]
mod tests {
    use agent_provider::ModelResponse;

    use super::*;

    fn chunks(parts: &[&'static str]) -> impl futures_util::Stream<Item = Result<&'static [u8], reqwest::Error>> {
        stream::iter(parts.iter().map(|part| Ok(part.as_bytes())).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn assembles_text_and_tool_calls_in_order() {
        let stream = fragments_from_bytes(chunks(&[
            "{\"message\":{\"content\":\"Reading \"}}\n{\"message\":{\"content\":\"now\"}}\n",
            "{\"message\":{\"content\":\"\",\"tool_calls\":[{\"function\":{\"name\":\"read_file\",\"arguments\":{\"path\":\"a.rs\",\"end_line\":10}}}]}}\n",
            "{\"done\":true}",
        ]));

        let response = ModelResponse::collect(stream).await.expect("stream succeeds");
        assert_eq!(response.text, "Reading now");
        assert_eq!(response.tool_calls.len(), 1);
        let call = &response.tool_calls[0];
        assert!(call.call_id.starts_with("call_"));
        assert_eq!(call.tool_name, "read_file");
        assert_eq!(call.arguments["path"], "a.rs");
        assert_eq!(call.arguments["end_line"], "10");
    }

    #[tokio::test]
    async fn error_line_ends_the_stream() {
        let stream = fragments_from_bytes(chunks(&[
            "{\"message\":{\"content\":\"partial\"}}\n{\"error\":\"rate limit exceeded\"}\n{\"message\":{\"content\":\"ignored\"}}\n",
        ]));

        let items: Vec<FragmentResult> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok(ResponseFragment::Text("partial".to_string())));
        assert!(items[1].as_ref().is_err_and(ProviderError::is_rate_limit));
    }

    #[tokio::test]
    async fn generated_call_ids_are_unique() {
        let line = "{\"message\":{\"tool_calls\":[{\"function\":{\"name\":\"list_directory\",\"arguments\":{}}},{\"function\":{\"name\":\"list_directory\",\"arguments\":{}}}]}}\n";
        let response = ModelResponse::collect(fragments_from_bytes(chunks(&[line])))
            .await
            .expect("stream succeeds");
        assert_eq!(response.tool_calls.len(), 2);
        assert_ne!(response.tool_calls[0].call_id, response.tool_calls[1].call_id);
    }
}
