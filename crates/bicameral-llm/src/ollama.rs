//! Ollama-compatible HTTP engine (`/api/generate`, `/api/tags`)

use crate::engine::{ReasoningEngine, ReasoningError, ReasoningResult};
use crate::types::{EngineHealth, Performance, ReasoningRequest, ReasoningResponse};
use bicameral_core::EngineConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_MODEL: &str = "phi3:mini";

const DEFAULT_TEMPERATURE: f32 = 0.7;
const TOP_P: f32 = 0.9;
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct OllamaEngine {
    client: Client,
    base_url: String,
    model: String,
    timeout_ms: u64,
    max_tokens: u32,
}

impl OllamaEngine {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self::from_config(&EngineConfig {
            base_url: base_url.into(),
            model: model.into(),
            ..EngineConfig::default()
        })
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout_ms: config.timeout_ms,
            max_tokens: config.max_tokens,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, body: &GenerateRequest<'_>) -> ReasoningResult<ReasoningResponse> {
        let url = format!("{}/api/generate", self.base_url);
        let response = self.client.post(&url).json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                ReasoningError::Timeout { after_ms: self.timeout_ms }
            } else if e.is_connect() {
                ReasoningError::Unavailable(e.to_string())
            } else {
                ReasoningError::NetworkError(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Ollama error {}: {}", status, error_text);
            return Err(if status.is_server_error() {
                ReasoningError::Unavailable(format!("{}: {}", status, error_text))
            } else {
                ReasoningError::RequestFailed(format!("{}: {}", status, error_text))
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ReasoningError::InvalidResponse(e.to_string()))?;

        Ok(ReasoningResponse {
            text: parsed.response,
            model: parsed.model.unwrap_or_else(|| body.model.to_string()),
            performance: Performance {
                total_duration_ms: parsed.total_duration.map(|ns| ns / 1_000_000),
                prompt_tokens: parsed.prompt_eval_count,
                completion_tokens: parsed.eval_count,
            },
        })
    }
}

#[async_trait::async_trait]
impl ReasoningEngine for OllamaEngine {
    fn name(&self) -> &str {
        "ollama"
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        request: ReasoningRequest,
        cancel: Option<CancellationToken>,
    ) -> ReasoningResult<ReasoningResponse> {
        let model = if request.model.is_empty() {
            self.model.as_str()
        } else {
            request.model.as_str()
        };
        let body = GenerateRequest {
            model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                top_p: TOP_P,
                num_predict: request.max_tokens.unwrap_or(self.max_tokens),
            },
        };

        debug!("Ollama request: model={} prompt_len={}", model, request.prompt.len());

        match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(ReasoningError::Cancelled),
                result = self.send(&body) => result,
            },
            None => self.send(&body).await,
        }
    }

    async fn health_check(&self) -> EngineHealth {
        let url = format!("{}/api/tags", self.base_url);
        let result = self.client.get(&url).timeout(HEALTH_TIMEOUT).send().await;
        match result {
            Ok(resp) if resp.status().is_success() => match resp.json::<TagsResponse>().await {
                Ok(tags) => EngineHealth {
                    reachable: true,
                    models: tags.models.into_iter().map(|m| m.name).collect(),
                    error: None,
                },
                Err(e) => EngineHealth { reachable: true, models: Vec::new(), error: Some(e.to_string()) },
            },
            Ok(resp) => EngineHealth {
                reachable: false,
                models: Vec::new(),
                error: Some(format!("status {}", resp.status())),
            },
            Err(e) => EngineHealth { reachable: false, models: Vec::new(), error: Some(e.to_string()) },
        }
    }
}

// Ollama wire types

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    total_duration: Option<u64>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}
