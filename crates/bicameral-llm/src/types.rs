//! Reasoning request and response types

use serde::{Deserialize, Serialize};

/// One non-streaming completion request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReasoningRequest {
    /// Empty means the engine's default model.
    pub model: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ReasoningRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            model: String::new(),
            prompt: prompt.into(),
            system: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Engine-reported timing and token counts. All optional; engines vary.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Performance {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReasoningResponse {
    pub text: String,
    pub model: String,
    #[serde(default)]
    pub performance: Performance,
}

impl ReasoningResponse {
    pub fn new(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: model.into(),
            performance: Performance::default(),
        }
    }
}

/// Result of an engine health probe.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EngineHealth {
    pub reachable: bool,
    /// Models the engine reports as installed.
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
