//! Articulation hand-off - turn an authorized verdict into one spoken sentence
//!
//! Audio synthesis is out of scope; this stage produces text only.

use bicameral_core::{ConnectionRequest, HarmonizedVerdict};
use bicameral_llm::{CancellationToken, ReasoningEngine, ReasoningRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const EMPTY_ARTICULATION: &str = "I have processed your request and reached a conclusion.";

const VOICE_PROMPT: &str = "You give voice to a decision that has already been made. \
Speak warmly and steadily, with calm authority, in clear and fully formed sentences. \
Do not re-decide, hedge, apologize or add filler. Return only the final spoken sentence.";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArticulationSource {
    Engine,
    Fallback,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Articulation {
    pub text: String,
    pub source: ArticulationSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Articulation {
    pub fn fallback(verdict: &str, error: impl Into<String>) -> Self {
        Self {
            text: fallback_text(verdict),
            source: ArticulationSource::Fallback,
            model: None,
            error: Some(error.into()),
        }
    }
}

/// Collaborator that phrases a verdict for speech. Never fails: on any
/// problem it returns a deterministic fallback.
#[async_trait::async_trait]
pub trait Articulator: Send + Sync {
    fn name(&self) -> &str;
    async fn articulate(&self, request: &ConnectionRequest, verdict: &HarmonizedVerdict) -> Articulation;
}

pub struct LlmArticulator {
    engine: Arc<dyn ReasoningEngine>,
    timeout: Duration,
    model: String,
}

impl LlmArticulator {
    pub fn new(engine: Arc<dyn ReasoningEngine>, timeout: Duration) -> Self {
        Self { engine, timeout, model: String::new() }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait::async_trait]
impl Articulator for LlmArticulator {
    fn name(&self) -> &str {
        "llm"
    }

    async fn articulate(&self, request: &ConnectionRequest, verdict: &HarmonizedVerdict) -> Articulation {
        let mut context = vec![format!("Consensus: {:?}", verdict.consensus)];
        context.push(format!("Confidence: {:.2}", verdict.confidence));
        if let Some(intent) = request.context.get("intent") {
            context.push(format!("Intent: {}", intent));
        }
        context.push(format!("Platform: {}", request.platform));

        let prompt = format!(
            "Decision:\n{}\n\nContext: {}\n",
            verdict.final_content,
            context.join(" | ")
        );
        let mut req = ReasoningRequest::new(prompt).with_system(VOICE_PROMPT);
        if !self.model.is_empty() {
            req = req.with_model(self.model.clone());
        }

        let cancel = CancellationToken::new();
        let call = self.engine.generate(req, Some(cancel.clone()));
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(resp)) => Articulation {
                text: clean_articulation(&resp.text),
                source: ArticulationSource::Engine,
                model: Some(resp.model),
                error: None,
            },
            Ok(Err(e)) => {
                warn!("Articulation failed for {}: {}", request.request_id, e);
                Articulation::fallback(&verdict.final_content, e.to_string())
            }
            Err(_) => {
                cancel.cancel();
                let message = format!("timed out after {}ms", self.timeout.as_millis());
                warn!("Articulation {} for {}", message, request.request_id);
                Articulation::fallback(&verdict.final_content, message)
            }
        }
    }
}

/// Strip surrounding quotes, guarantee non-empty, end on terminal punctuation.
pub fn clean_articulation(raw: &str) -> String {
    let text = raw
        .trim()
        .trim_matches('"')
        .trim_matches('\'')
        .trim();
    if text.is_empty() {
        return EMPTY_ARTICULATION.to_string();
    }
    if text.ends_with(['.', '!', '?']) {
        text.to_string()
    } else {
        format!("{}.", text)
    }
}

/// Deterministic sentence used when the engine cannot articulate. The
/// template is chosen by verdict length.
pub fn fallback_text(verdict: &str) -> String {
    let index = (verdict.chars().count() / 20).min(3);
    match index {
        0 => format!("I have carefully considered this matter. {}", verdict),
        1 => format!("Based on my analysis, I conclude that {}", verdict),
        2 => format!("My assessment indicates that {}", verdict),
        _ => format!("After thorough evaluation, I determine that {}", verdict),
    }
}
