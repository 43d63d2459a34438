//! Suggestion generation: the orchestrated run and its service boundary.

pub mod heuristics;
pub mod openai;
pub mod pipeline;
pub mod prompts;
pub mod service;

pub use openai::OpenAiClient;
pub use pipeline::{Orchestrator, Phase, RunStatus, SuggestionOutcome, SuggestionRequest};
pub use service::{ChatMessage, ChatRequest, GenerativeService, Role};
