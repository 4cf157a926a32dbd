//! Bicameral LLM - the external reasoning engine and its HTTP client

pub mod engine;
pub mod ollama;
pub mod types;

pub use engine::{ReasoningEngine, ReasoningError, ReasoningResult};
pub use ollama::OllamaEngine;
pub use tokio_util::sync::CancellationToken;
pub use types::*;
