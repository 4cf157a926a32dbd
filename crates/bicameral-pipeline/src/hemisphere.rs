//! Hemisphere processor - one independent reasoning branch
//!
//! Each side owns its configuration and its engine handle. Sides never see
//! each other's output; the coordinator joins them and hands both verdicts,
//! by value, to the harmonizer.

use bicameral_core::{
    ConnectionRequest, Error, HemisphereConfig, HemisphereVerdict, Result, Side, TemporalSpine,
};
use bicameral_llm::{CancellationToken, ReasoningEngine, ReasoningError, ReasoningRequest};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

const CONFIDENCE_INSTRUCTION: &str =
    "End your answer with a final line of the form `confidence: <number between 0 and 1>`.";

pub struct HemisphereProcessor {
    side: Side,
    engine: Arc<dyn ReasoningEngine>,
    config: HemisphereConfig,
    spine: Arc<TemporalSpine>,
}

impl HemisphereProcessor {
    pub fn new(
        side: Side,
        engine: Arc<dyn ReasoningEngine>,
        config: HemisphereConfig,
        spine: Arc<TemporalSpine>,
    ) -> Self {
        Self { side, engine, config, spine }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    /// Ask the engine for this side's verdict within the side's own timeout.
    ///
    /// Fails with `ReasoningUnavailable` when the engine errors, times out
    /// or returns nothing. On timeout the outstanding call is cancelled, so
    /// no late result can surface.
    pub async fn reason(&self, request: &ConnectionRequest) -> Result<HemisphereVerdict> {
        let cancel = CancellationToken::new();
        let call = self
            .engine
            .generate(self.build_request(request), Some(cancel.clone()));

        let response = match tokio::time::timeout(self.timeout(), call).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(self.unavailable(&e)),
            Err(_) => {
                cancel.cancel();
                let err = Error::reasoning_unavailable(
                    self.side.as_str(),
                    format!("timed out after {}ms", self.config.timeout_ms),
                );
                warn!("{}", err);
                return Err(err);
            }
        };

        let (content, stated) = split_confidence(&response.text);
        if content.is_empty() {
            let err = Error::reasoning_unavailable(self.side.as_str(), "engine returned an empty answer");
            warn!("{}", err);
            return Err(err);
        }

        let confidence = stated.unwrap_or(self.config.default_confidence);
        debug!(
            "{} hemisphere verdict for {}: {} chars, confidence {:.2}",
            self.side,
            request.request_id,
            content.len(),
            confidence
        );
        Ok(HemisphereVerdict::new(self.side, content, confidence, self.spine.pulse()))
    }

    fn build_request(&self, request: &ConnectionRequest) -> ReasoningRequest {
        let mut prompt = String::new();
        prompt.push_str(&format!("Platform: {}\n", request.platform));
        prompt.push_str(&format!("Priority: {}\n", request.priority.as_str()));
        for (key, value) in &request.context {
            prompt.push_str(&format!("Context {}: {}\n", key, value));
        }
        prompt.push_str(&format!("\nMessage:\n{}\n\n{}", request.payload, CONFIDENCE_INSTRUCTION));

        let mut req = ReasoningRequest::new(prompt)
            .with_system(self.config.system_prompt.clone())
            .with_temperature(self.config.temperature);
        if !self.config.model.is_empty() {
            req = req.with_model(self.config.model.clone());
        }
        req
    }

    fn unavailable(&self, e: &ReasoningError) -> Error {
        let err = Error::reasoning_unavailable(self.side.as_str(), e.to_string());
        warn!("{}", err);
        err
    }
}

/// Bare values from here up are read as percentages.
const PERCENT_FLOOR: f64 = 10.0;

fn confidence_line() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\W*confidence\W*?[:=][\s*_]*([0-9]*\.?[0-9]+)\s*(%?)\W*$").ok()
    })
    .as_ref()
}

/// Split a trailing `confidence: x` line off an engine answer.
///
/// Values with a `%` sign, or bare values of 10 and up, are read as
/// percentages. Anything else outside [0, 1] is dropped along with its line
/// and yields `None`. A missing or unparseable line leaves the text
/// untouched and yields `None`.
pub fn split_confidence(text: &str) -> (String, Option<f64>) {
    let trimmed = text.trim_end();
    let (body, last) = match trimmed.rfind('\n') {
        Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
        None => ("", trimmed),
    };

    let Some(caps) = confidence_line().and_then(|re| re.captures(last.trim())) else {
        return (trimmed.trim().to_string(), None);
    };
    let Ok(mut value) = caps[1].parse::<f64>() else {
        return (trimmed.trim().to_string(), None);
    };
    if &caps[2] == "%" || value >= PERCENT_FLOOR {
        value /= 100.0;
    }
    if !(0.0..=1.0).contains(&value) {
        return (body.trim().to_string(), None);
    }
    (body.trim().to_string(), Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_trailing_confidence_line() {
        let (body, c) = split_confidence("Water boils at 100C.\nconfidence: 0.85\n");
        assert_eq!(body, "Water boils at 100C.");
        assert_eq!(c, Some(0.85));
    }

    #[test]
    fn accepts_markdown_and_percent() {
        assert_eq!(split_confidence("Yes.\n**Confidence:** 70%").1, Some(0.7));
        assert_eq!(split_confidence("Yes.\nConfidence = 92").1, Some(0.92));
    }

    #[test]
    fn missing_line_keeps_text() {
        let (body, c) = split_confidence("Just an answer.\nNothing else.");
        assert_eq!(body, "Just an answer.\nNothing else.");
        assert_eq!(c, None);
    }

    #[test]
    fn out_of_range_value_is_dropped_with_line() {
        let (body, c) = split_confidence("Answer\nconfidence: 250");
        assert_eq!(body, "Answer");
        assert_eq!(c, None);
    }

    #[test]
    fn small_values_above_one_are_not_percentages() {
        assert_eq!(split_confidence("Answer\nconfidence: 1.5"), ("Answer".to_string(), None));
        assert_eq!(split_confidence("Answer\nconfidence: 5"), ("Answer".to_string(), None));
        assert_eq!(split_confidence("Answer\nconfidence: 1").1, Some(1.0));
        assert_eq!(split_confidence("Answer\nconfidence: 5%").1, Some(0.05));
        assert_eq!(split_confidence("Answer\nconfidence: 10").1, Some(0.1));
    }

    #[test]
    fn lone_confidence_line_leaves_empty_body() {
        let (body, c) = split_confidence("confidence: 0.5");
        assert_eq!(body, "");
        assert_eq!(c, Some(0.5));
    }
}
