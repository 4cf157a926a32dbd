//! Reasoning engine trait

use crate::types::{EngineHealth, ReasoningRequest, ReasoningResponse};
use tokio_util::sync::CancellationToken;

/// Result type for engine operations
pub type ReasoningResult<T> = Result<T, ReasoningError>;

/// Engine error types
#[derive(Debug, thiserror::Error)]
pub enum ReasoningError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("engine unavailable: {0}")]
    Unavailable(String),

    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("cancelled")]
    Cancelled,

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl ReasoningError {
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::NetworkError(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// The external reasoning collaborator. Implementations are stateless per
/// call and safe to share across requests.
#[async_trait::async_trait]
pub trait ReasoningEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Model used when a request leaves `model` empty.
    fn default_model(&self) -> &str;

    /// Run one completion. If `cancel` is provided and triggered, the
    /// underlying call is dropped and `ReasoningError::Cancelled` is returned.
    async fn generate(
        &self,
        request: ReasoningRequest,
        cancel: Option<CancellationToken>,
    ) -> ReasoningResult<ReasoningResponse>;

    async fn health_check(&self) -> EngineHealth {
        EngineHealth {
            reachable: true,
            models: vec![self.default_model().to_string()],
            error: None,
        }
    }
}
