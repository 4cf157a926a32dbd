//! Pipeline coordinator - one request through the state machine
//!
//! Received → Reasoning → Harmonizing → Consenting → {Completed | Denied | Failed}
//!
//! Direct reasoning skips harmonizing; articulation tests skip the
//! hemispheres. A whole traversal runs under the request timeout, and
//! dropping a traversal drops every outstanding engine call with it, so a
//! late result can never touch a finished request.

use crate::articulation::{Articulation, Articulator, LlmArticulator};
use crate::consent::{ConsentGate, PolicyTable, REFUSAL};
use crate::harmonizer::{apply_override, Harmonizer};
use crate::hemisphere::HemisphereProcessor;
use crate::status::StatusBoard;
use bicameral_core::{
    BicameralConfig, ConnectionRequest, ConsentDecision, Error, HarmonizedVerdict,
    HemisphereVerdict, PipelineConfig, PipelineStage, PulseCycle, RequestMode, Result, Side,
    TemporalSpine,
};
use bicameral_llm::{ReasoningEngine, ReasoningRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Context key carrying the system prompt of a direct reasoning request.
pub const DIRECT_SYSTEM_KEY: &str = "system";

/// Verdicts supplied by the caller in articulation-test mode.
#[derive(Clone, Debug, Default)]
pub struct SuppliedVerdicts {
    pub left: Option<(String, Option<f64>)>,
    pub right: Option<(String, Option<f64>)>,
    /// Replaces the harmonized content and marks the verdict `overridden`.
    pub distilled_override: Option<String>,
}

/// Terminal result of one traversal that did not fail.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub request_id: String,
    pub mode: RequestMode,
    pub started: PulseCycle,
    pub stage: PipelineStage,
    pub stages: Vec<PipelineStage>,
    pub authorized: bool,
    /// The harmonized content, or the fixed refusal when denied.
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<HarmonizedVerdict>,
    pub decision: ConsentDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub articulation: Option<Articulation>,
    /// Model that answered a direct reasoning request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub elapsed_ms: u64,
    /// SHA-256 over request id, start pulse, final stage, response and decision pulse.
    pub seal: String,
}

/// Legal-transition trail for one request.
struct StageTrail {
    request_id: String,
    stages: Vec<PipelineStage>,
}

impl StageTrail {
    fn new(request_id: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            stages: vec![PipelineStage::Received],
        }
    }

    fn current(&self) -> PipelineStage {
        self.stages.last().copied().unwrap_or(PipelineStage::Received)
    }

    fn advance(&mut self, next: PipelineStage) {
        let from = self.current();
        debug_assert!(
            from.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            from,
            next
        );
        debug!("{}: {:?} -> {:?}", self.request_id, from, next);
        self.stages.push(next);
    }

    fn fail(&mut self, err: Error) -> Error {
        self.advance(PipelineStage::Failed);
        error!("Request {} failed ({}): {}", self.request_id, err.cause(), err);
        err
    }
}

pub struct PipelineCoordinator {
    spine: Arc<TemporalSpine>,
    status: Arc<StatusBoard>,
    left: HemisphereProcessor,
    right: HemisphereProcessor,
    harmonizer: Harmonizer,
    gate: ConsentGate,
    direct: Arc<dyn ReasoningEngine>,
    articulator: Option<Arc<dyn Articulator>>,
    config: PipelineConfig,
    default_confidence: (f64, f64),
}

impl PipelineCoordinator {
    /// Wire every stage to one engine, as configured.
    pub fn from_config(
        config: &BicameralConfig,
        engine: Arc<dyn ReasoningEngine>,
        spine: Arc<TemporalSpine>,
        status: Arc<StatusBoard>,
    ) -> Self {
        let hemispheres = &config.hemispheres;
        Self {
            left: HemisphereProcessor::new(Side::Left, engine.clone(), hemispheres.left.clone(), spine.clone()),
            right: HemisphereProcessor::new(Side::Right, engine.clone(), hemispheres.right.clone(), spine.clone()),
            harmonizer: Harmonizer::new(config.harmonizer.clone(), spine.clone()).with_enhancer(engine.clone()),
            gate: ConsentGate::new(PolicyTable::from_config(&config.consent), spine.clone()),
            articulator: Some(Arc::new(LlmArticulator::new(
                engine.clone(),
                config.pipeline.articulation_timeout(),
            ))),
            direct: engine,
            config: config.pipeline.clone(),
            default_confidence: (hemispheres.left.default_confidence, hemispheres.right.default_confidence),
            spine,
            status,
        }
    }

    pub fn with_harmonizer(mut self, harmonizer: Harmonizer) -> Self {
        self.harmonizer = harmonizer;
        self
    }

    pub fn with_articulator(mut self, articulator: Option<Arc<dyn Articulator>>) -> Self {
        self.articulator = articulator;
        self
    }

    pub fn spine(&self) -> &Arc<TemporalSpine> {
        &self.spine
    }

    pub fn status(&self) -> &Arc<StatusBoard> {
        &self.status
    }

    pub fn gate(&self) -> &ConsentGate {
        &self.gate
    }

    /// Run a full-pipeline or direct-reasoning request.
    pub async fn run(&self, request: ConnectionRequest) -> Result<PipelineOutcome> {
        match request.mode {
            RequestMode::ArticulationTest => Err(Error::InvalidRequest(
                "articulation_test requests must supply verdicts".into(),
            )),
            _ => self.run_with(request, None).await,
        }
    }

    /// Run an articulation test over caller-supplied verdicts.
    pub async fn run_articulation_test(
        &self,
        mut request: ConnectionRequest,
        supplied: SuppliedVerdicts,
    ) -> Result<PipelineOutcome> {
        request.mode = RequestMode::ArticulationTest;
        self.run_with(request, Some(supplied)).await
    }

    async fn run_with(
        &self,
        request: ConnectionRequest,
        supplied: Option<SuppliedVerdicts>,
    ) -> Result<PipelineOutcome> {
        let _in_flight = self.status.begin_request();
        let started_at = Instant::now();
        let started = self.spine.pulse();
        let mut trail = StageTrail::new(&request.request_id);

        info!(
            "Request {} from {} ({:?}, {}) at {}",
            request.request_id,
            request.platform,
            request.mode,
            request.priority.as_str(),
            started.epoch_label
        );

        let limit = self.config.request_timeout();
        let traversal = async {
            match (request.mode, supplied) {
                (RequestMode::ArticulationTest, Some(supplied)) => {
                    self.articulation_test(&request, supplied, &mut trail).await
                }
                (RequestMode::DirectReasoning, _) => self.direct(&request, &mut trail).await,
                _ => self.full(&request, &mut trail).await,
            }
        };
        let result = tokio::time::timeout(limit, traversal).await;

        let stage_result = match result {
            Ok(inner) => inner,
            Err(_) => Err(Error::timeout("request", self.config.request_timeout_ms)),
        };
        let terminal = match stage_result {
            Ok(terminal) => terminal,
            Err(err) => {
                if trail.current().is_terminal() {
                    return Err(err);
                }
                return Err(trail.fail(err));
            }
        };

        let Terminal { verdict, decision, response, articulation, model } = terminal;
        let stage = trail.current();
        let seal = TemporalSpine::anchor(&[
            &request.request_id,
            &started.cycle_id,
            stage_name(stage),
            &response,
            &decision.decided_at.cycle_id,
        ]);
        let elapsed_ms = started_at.elapsed().as_millis() as u64;

        info!(
            "Request {} {:?} in {}ms (authorized={})",
            request.request_id, stage, elapsed_ms, decision.authorized
        );

        Ok(PipelineOutcome {
            request_id: request.request_id,
            mode: request.mode,
            started,
            stage,
            stages: trail.stages,
            authorized: decision.authorized,
            response,
            verdict,
            decision,
            articulation,
            model,
            elapsed_ms,
            seal,
        })
    }

    async fn full(&self, request: &ConnectionRequest, trail: &mut StageTrail) -> Result<Terminal> {
        trail.advance(PipelineStage::Reasoning);
        let left_active = self.status.hemisphere_active(Side::Left);
        let right_active = self.status.hemisphere_active(Side::Right);
        let (left, right) = tokio::join!(
            async {
                let verdict = self.left.reason(request).await;
                drop(left_active);
                verdict
            },
            async {
                let verdict = self.right.reason(request).await;
                drop(right_active);
                verdict
            },
        );

        trail.advance(PipelineStage::Harmonizing);
        let causes: Vec<String> = [&left, &right]
            .iter()
            .filter_map(|r| r.as_ref().err().map(|e| e.to_string()))
            .collect();
        let verdict = match self.harmonizer.harmonize(left.ok(), right.ok()) {
            Ok(verdict) => verdict,
            Err(Error::HarmonizationImpossible { .. }) => {
                return Err(trail.fail(Error::HarmonizationImpossible { causes }))
            }
            Err(other) => return Err(trail.fail(other)),
        };
        let verdict = self.harmonizer.enhance(request, verdict).await;

        trail.advance(PipelineStage::Consenting);
        let decision = self.gate.authorize(request, &verdict);
        let articulate = self.config.articulate;
        Ok(self.finish(request, trail, Some(verdict), decision, articulate).await)
    }

    async fn direct(&self, request: &ConnectionRequest, trail: &mut StageTrail) -> Result<Terminal> {
        trail.advance(PipelineStage::Reasoning);
        let mut call = ReasoningRequest::new(request.payload.clone());
        if let Some(system) = request.context.get(DIRECT_SYSTEM_KEY) {
            call = call.with_system(system.clone());
        }
        let limit = self.config.direct_timeout();
        let response = match tokio::time::timeout(limit, self.direct.generate(call, None)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(trail.fail(Error::reasoning_unavailable("direct", e.to_string()))),
            Err(_) => {
                let message = format!("timed out after {}ms", self.config.direct_timeout_ms);
                return Err(trail.fail(Error::reasoning_unavailable("direct", message)));
            }
        };

        trail.advance(PipelineStage::Consenting);
        let decision = self.gate.authorize_text(request, &response.text);
        let mut terminal = self.finish(request, trail, None, decision, false).await;
        if terminal.decision.authorized {
            terminal.response = response.text;
        }
        terminal.model = Some(response.model);
        Ok(terminal)
    }

    async fn articulation_test(
        &self,
        request: &ConnectionRequest,
        supplied: SuppliedVerdicts,
        trail: &mut StageTrail,
    ) -> Result<Terminal> {
        trail.advance(PipelineStage::Harmonizing);
        let (left_default, right_default) = self.default_confidence;
        let build = |side: Side, parts: Option<(String, Option<f64>)>, default: f64| {
            parts.map(|(content, confidence)| {
                HemisphereVerdict::new(side, content, confidence.unwrap_or(default), self.spine.pulse())
            })
        };
        let left = build(Side::Left, supplied.left, left_default);
        let right = build(Side::Right, supplied.right, right_default);

        let mut verdict = match self.harmonizer.harmonize(left, right) {
            Ok(verdict) => verdict,
            Err(e) => return Err(trail.fail(e)),
        };
        if let Some(content) = supplied.distilled_override {
            verdict = apply_override(verdict, content);
        }

        trail.advance(PipelineStage::Consenting);
        let decision = self.gate.authorize(request, &verdict);
        Ok(self.finish(request, trail, Some(verdict), decision, true).await)
    }

    async fn finish(
        &self,
        request: &ConnectionRequest,
        trail: &mut StageTrail,
        verdict: Option<HarmonizedVerdict>,
        decision: ConsentDecision,
        articulate: bool,
    ) -> Terminal {
        if !decision.authorized {
            trail.advance(PipelineStage::Denied);
            return Terminal {
                verdict,
                decision,
                response: REFUSAL.to_string(),
                articulation: None,
                model: None,
            };
        }

        trail.advance(PipelineStage::Completed);
        let response = verdict
            .as_ref()
            .map(|v| v.final_content.clone())
            .unwrap_or_default();
        let articulation = match (&self.articulator, &verdict) {
            (Some(articulator), Some(v)) if articulate => Some(articulator.articulate(request, v).await),
            _ => None,
        };
        Terminal { verdict, decision, response, articulation, model: None }
    }
}

struct Terminal {
    verdict: Option<HarmonizedVerdict>,
    decision: ConsentDecision,
    response: String,
    articulation: Option<Articulation>,
    model: Option<String>,
}

fn stage_name(stage: PipelineStage) -> &'static str {
    match stage {
        PipelineStage::Received => "received",
        PipelineStage::Reasoning => "reasoning",
        PipelineStage::Harmonizing => "harmonizing",
        PipelineStage::Consenting => "consenting",
        PipelineStage::Completed => "completed",
        PipelineStage::Denied => "denied",
        PipelineStage::Failed => "failed",
    }
}
