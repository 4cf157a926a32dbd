//! Harmonizer - deterministic consensus over two optional verdicts
//!
//! Resolution, in order:
//! 1. one side present: `conflicted`, that side's content, confidence times
//!    `single_source_discount`;
//! 2. both present and similarity above the threshold: `resolved`,
//!    confidence is the max of the two;
//! 3. otherwise `conflicted`, the higher-confidence side wins (left on an
//!    exact tie), confidence times `conflict_discount`.
//!
//! The optional enhancement pass runs after resolution and only adds
//! metadata; it never changes the consensus, content or confidence.

use bicameral_core::{
    clamp_unit, ComparatorKind, Consensus, ConnectionRequest, EnhancementConfig, Error,
    ExternalEnhancement, HarmonizedVerdict, HarmonizerConfig, HemisphereVerdict, Result, Side,
    SourceVerdicts, TemporalSpine,
};
use bicameral_llm::{CancellationToken, ReasoningEngine, ReasoningRequest};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

// ============================================================
// Similarity
// ============================================================

/// Scores how much two verdict texts agree, in [0, 1].
pub trait SimilarityComparator: Send + Sync {
    fn name(&self) -> &str;
    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// Trimmed, case-insensitive equality.
pub struct LiteralComparator;

impl SimilarityComparator for LiteralComparator {
    fn name(&self) -> &str {
        "literal"
    }

    fn similarity(&self, a: &str, b: &str) -> f64 {
        if a.trim().to_lowercase() == b.trim().to_lowercase() {
            1.0
        } else {
            0.0
        }
    }
}

/// Jaccard overlap of lowercase word sets.
pub struct JaccardComparator;

impl SimilarityComparator for JaccardComparator {
    fn name(&self) -> &str {
        "jaccard"
    }

    fn similarity(&self, a: &str, b: &str) -> f64 {
        let words_a = word_set(a);
        let words_b = word_set(b);

        if words_a.is_empty() && words_b.is_empty() {
            return LiteralComparator.similarity(a, b);
        }
        if words_a.is_empty() || words_b.is_empty() {
            return 0.0;
        }

        let intersection = words_a.intersection(&words_b).count();
        let union = words_a.union(&words_b).count();
        intersection as f64 / union as f64
    }
}

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

pub fn comparator_for(kind: ComparatorKind) -> Arc<dyn SimilarityComparator> {
    match kind {
        ComparatorKind::Literal => Arc::new(LiteralComparator),
        ComparatorKind::Jaccard => Arc::new(JaccardComparator),
    }
}

// ============================================================
// Resolution
// ============================================================

/// Pure consensus rule. Fails only when both sides are absent.
pub fn resolve(
    left: Option<HemisphereVerdict>,
    right: Option<HemisphereVerdict>,
    comparator: &dyn SimilarityComparator,
    config: &HarmonizerConfig,
) -> Result<HarmonizedVerdict> {
    let sources = SourceVerdicts { left, right };
    let missing_sides = sources.missing();

    let (final_content, consensus, confidence, similarity) = match (&sources.left, &sources.right) {
        (None, None) => {
            return Err(Error::HarmonizationImpossible {
                causes: vec!["left: no verdict".into(), "right: no verdict".into()],
            })
        }
        (Some(only), None) | (None, Some(only)) => (
            only.content.clone(),
            Consensus::Conflicted,
            only.confidence * config.single_source_discount,
            None,
        ),
        (Some(l), Some(r)) => {
            let score = clamp_unit(comparator.similarity(&l.content, &r.content));
            if score > config.similarity_threshold {
                (
                    l.content.clone(),
                    Consensus::Resolved,
                    l.confidence.max(r.confidence),
                    Some(score),
                )
            } else {
                // exact ties go left
                let winner = if r.confidence > l.confidence { r } else { l };
                (
                    winner.content.clone(),
                    Consensus::Conflicted,
                    winner.confidence * config.conflict_discount,
                    Some(score),
                )
            }
        }
    };

    Ok(HarmonizedVerdict {
        final_content,
        consensus,
        confidence: clamp_unit(confidence),
        source_verdicts: sources,
        missing_sides,
        similarity,
        enhancement: None,
    })
}

/// Replace the harmonized content with a caller-supplied verdict.
pub fn apply_override(mut verdict: HarmonizedVerdict, content: String) -> HarmonizedVerdict {
    verdict.final_content = content;
    verdict.consensus = Consensus::Overridden;
    verdict
}

// ============================================================
// Harmonizer
// ============================================================

pub struct Harmonizer {
    comparator: Arc<dyn SimilarityComparator>,
    config: HarmonizerConfig,
    enhancer: Option<Arc<dyn ReasoningEngine>>,
    spine: Arc<TemporalSpine>,
}

impl Harmonizer {
    pub fn new(config: HarmonizerConfig, spine: Arc<TemporalSpine>) -> Self {
        Self {
            comparator: comparator_for(config.comparator),
            config,
            enhancer: None,
            spine,
        }
    }

    pub fn with_comparator(mut self, comparator: Arc<dyn SimilarityComparator>) -> Self {
        self.comparator = comparator;
        self
    }

    /// Engine used for the enhancement pass. Ignored when enhancement is disabled.
    pub fn with_enhancer(mut self, engine: Arc<dyn ReasoningEngine>) -> Self {
        self.enhancer = Some(engine);
        self
    }

    pub fn comparator(&self) -> &dyn SimilarityComparator {
        self.comparator.as_ref()
    }

    pub fn config(&self) -> &HarmonizerConfig {
        &self.config
    }

    pub fn harmonize(
        &self,
        left: Option<HemisphereVerdict>,
        right: Option<HemisphereVerdict>,
    ) -> Result<HarmonizedVerdict> {
        let verdict = resolve(left, right, self.comparator.as_ref(), &self.config)?;
        debug!(
            "Harmonized via {}: {:?} confidence={:.3} similarity={:?}",
            self.comparator.name(),
            verdict.consensus,
            verdict.confidence,
            verdict.similarity
        );
        Ok(verdict)
    }

    /// Attempt the enhancement pass within its timeout and record the
    /// outcome. Never fails; failures are recorded in `verdict.enhancement`.
    pub async fn enhance(&self, request: &ConnectionRequest, mut verdict: HarmonizedVerdict) -> HarmonizedVerdict {
        let settings = &self.config.enhancement;
        let Some(engine) = self.enhancer.as_ref().filter(|_| settings.enabled) else {
            return verdict;
        };

        let started = Instant::now();
        let cancel = CancellationToken::new();
        let call = engine.generate(self.enhancement_request(settings, request, &verdict), Some(cancel.clone()));

        let outcome = match tokio::time::timeout(settings.timeout(), call).await {
            Ok(Ok(resp)) if !resp.text.trim().is_empty() => Ok(resp),
            Ok(Ok(_)) => Err("engine returned an empty enhancement".to_string()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => {
                cancel.cancel();
                Err(format!("timed out after {}ms", settings.timeout_ms))
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        verdict.enhancement = Some(match outcome {
            Ok(resp) => ExternalEnhancement::applied(resp.text.trim(), resp.model, elapsed_ms),
            Err(message) => {
                let err = Error::EnhancementUnavailable(message);
                warn!("{} (request {})", err, request.request_id);
                ExternalEnhancement::unavailable(err.to_string(), elapsed_ms)
            }
        });
        verdict
    }

    fn enhancement_request(
        &self,
        settings: &EnhancementConfig,
        request: &ConnectionRequest,
        verdict: &HarmonizedVerdict,
    ) -> ReasoningRequest {
        let side_text = |side: Side| {
            verdict
                .source_verdicts
                .get(side)
                .map(|v| format!("{} (confidence {:.2})", v.content, v.confidence))
                .unwrap_or_else(|| "unavailable".to_string())
        };
        let prompt = format!(
            "User query: {}\n\n\
             Left hemisphere verdict: {}\n\
             Right hemisphere verdict: {}\n\
             Harmonized verdict: {}\n\
             Consensus: {:?}, confidence {:.2}\n\n\
             Context: platform={}, priority={}, stardate={}\n\n\
             Provide brief additional insights that deepen or clarify this conclusion. \
             Do not contradict or replace it.",
            request.payload,
            side_text(Side::Left),
            side_text(Side::Right),
            verdict.final_content,
            verdict.consensus,
            verdict.confidence,
            request.platform,
            request.priority.as_str(),
            self.spine.pulse().epoch_label,
        );
        let mut req = ReasoningRequest::new(prompt)
            .with_system("You enhance the conclusions of a two-part reasoning system.");
        if !settings.model.is_empty() {
            req = req.with_model(settings.model.clone());
        }
        req
    }
}
