//! Ollama-backed implementation of the shared `agent_provider` contract.
//!
//! Talks to a local Ollama server over `/api/chat` (NDJSON streaming) and
//! `/api/tags` (status check). Each call is a single attempt; retrying rate
//! limits is the caller's concern.

pub mod client;
pub mod config;
pub mod error;
pub mod ndjson;
pub mod payload;
pub mod provider;
pub mod url;

pub use client::{OllamaClient, OllamaStatus};
pub use config::OllamaConfig;
pub use error::OllamaError;
pub use ndjson::{NdjsonStreamParser, OllamaStreamEvent};
pub use payload::ChatRequest;
pub use provider::{OllamaProvider, OLLAMA_PROVIDER_ID};
