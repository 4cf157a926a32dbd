//! Error taxonomy for Bicameral
//!
//! Every failure is scoped to a single request. Consent denial is not an
//! error: it is a terminal pipeline outcome and never appears here.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("authentication failed: {reason}")]
    AuthFailed { reason: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("reasoning unavailable ({stage}): {message}")]
    ReasoningUnavailable { stage: String, message: String },

    #[error("harmonization impossible: no hemisphere verdict available ({})", causes.join("; "))]
    HarmonizationImpossible { causes: Vec<String> },

    #[error("enhancement unavailable: {0}")]
    EnhancementUnavailable(String),

    #[error("{stage} timed out after {after_ms}ms")]
    Timeout { stage: String, after_ms: u64 },

    #[error("adapter conflict: platform '{platform}' is already registered")]
    AdapterConflict { platform: String },

    #[error("unknown adapter: {0}")]
    UnknownAdapter(String),

    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("adapter '{platform}' does not implement '{capability}'")]
    CapabilityMissing { platform: String, capability: String },

    #[error("overloaded: {limit} requests already admitted")]
    Overloaded { limit: usize },

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn auth_failed(reason: impl Into<String>) -> Self {
        Self::AuthFailed {
            reason: reason.into(),
        }
    }

    pub fn reasoning_unavailable(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ReasoningUnavailable {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn timeout(stage: impl Into<String>, after_ms: u64) -> Self {
        Self::Timeout {
            stage: stage.into(),
            after_ms,
        }
    }

    /// Transport status for this error. Collaborator failures are 503,
    /// backpressure is 429, malformed input is 400.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::AuthFailed { .. } => 401,
            Self::InvalidRequest(_) | Self::JsonError(_) => 400,
            Self::CapabilityMissing { .. } => 403,
            Self::UnknownAdapter(_) | Self::UnknownTask(_) => 404,
            Self::AdapterConflict { .. } => 409,
            Self::Overloaded { .. } => 429,
            Self::ReasoningUnavailable { .. }
            | Self::HarmonizationImpossible { .. }
            | Self::EnhancementUnavailable(_)
            | Self::Timeout { .. } => 503,
            Self::ConfigError(_) | Self::IoError(_) | Self::Internal(_) => 500,
        }
    }

    /// Stable, typed cause name surfaced to callers.
    pub fn cause(&self) -> &'static str {
        match self {
            Self::AuthFailed { .. } => "AuthFailed",
            Self::InvalidRequest(_) | Self::JsonError(_) => "InvalidRequest",
            Self::ReasoningUnavailable { .. } => "ReasoningUnavailable",
            Self::HarmonizationImpossible { .. } => "HarmonizationImpossible",
            Self::EnhancementUnavailable(_) => "EnhancementUnavailable",
            Self::Timeout { .. } => "Timeout",
            Self::AdapterConflict { .. } => "AdapterConflict",
            Self::UnknownAdapter(_) => "UnknownAdapter",
            Self::UnknownTask(_) => "UnknownTask",
            Self::CapabilityMissing { .. } => "CapabilityMissing",
            Self::Overloaded { .. } => "Overloaded",
            Self::ConfigError(_) | Self::IoError(_) | Self::Internal(_) => "Internal",
        }
    }

    /// Whether the caller may retry later (with backoff). The core never
    /// retries on the caller's behalf.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Overloaded { .. }
                | Self::ReasoningUnavailable { .. }
                | Self::HarmonizationImpossible { .. }
                | Self::EnhancementUnavailable(_)
                | Self::Timeout { .. }
        )
    }
}
