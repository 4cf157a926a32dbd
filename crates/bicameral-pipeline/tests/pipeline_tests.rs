//! Tests for bicameral-pipeline: harmonizer rules, consent gate, and the coordinator with a scripted engine

use bicameral_core::*;
use bicameral_llm::{
    CancellationToken, ReasoningEngine, ReasoningError, ReasoningRequest, ReasoningResponse,
    ReasoningResult,
};
use bicameral_pipeline::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ===========================================================================
// Scripted engine
// ===========================================================================

#[derive(Clone)]
enum Script {
    Reply(&'static str),
    Fail,
    Slow(u64, &'static str),
}

/// Routes calls by system prompt: left, right, or anything else
/// (enhancement, articulation, direct).
struct ScriptedEngine {
    left: Script,
    right: Script,
    other: Script,
    left_calls: AtomicUsize,
    right_calls: AtomicUsize,
    other_calls: AtomicUsize,
    last_other: Mutex<Option<ReasoningRequest>>,
}

impl ScriptedEngine {
    fn new(left: Script, right: Script) -> Self {
        Self {
            left,
            right,
            other: Script::Reply("Additional insight."),
            left_calls: AtomicUsize::new(0),
            right_calls: AtomicUsize::new(0),
            other_calls: AtomicUsize::new(0),
            last_other: Mutex::new(None),
        }
    }

    fn with_other(mut self, other: Script) -> Self {
        self.other = other;
        self
    }

    fn hemisphere_calls(&self) -> usize {
        self.left_calls.load(Ordering::SeqCst) + self.right_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ReasoningEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn generate(
        &self,
        request: ReasoningRequest,
        cancel: Option<CancellationToken>,
    ) -> ReasoningResult<ReasoningResponse> {
        let system = request.system.clone().unwrap_or_default();
        let script = if system.contains("left hemisphere") {
            self.left_calls.fetch_add(1, Ordering::SeqCst);
            &self.left
        } else if system.contains("right hemisphere") {
            self.right_calls.fetch_add(1, Ordering::SeqCst);
            &self.right
        } else {
            self.other_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_other.lock().unwrap() = Some(request);
            &self.other
        };
        play(script, cancel).await
    }
}

async fn play(script: &Script, cancel: Option<CancellationToken>) -> ReasoningResult<ReasoningResponse> {
    match script {
        Script::Reply(text) => Ok(ReasoningResponse::new(*text, "mock-model")),
        Script::Fail => Err(ReasoningError::Unavailable("connection refused".into())),
        Script::Slow(ms, text) => {
            let sleep = tokio::time::sleep(Duration::from_millis(*ms));
            match cancel {
                Some(token) => tokio::select! {
                    _ = token.cancelled() => Err(ReasoningError::Cancelled),
                    _ = sleep => Ok(ReasoningResponse::new(*text, "mock-model")),
                },
                None => {
                    sleep.await;
                    Ok(ReasoningResponse::new(*text, "mock-model"))
                }
            }
        }
    }
}

fn test_config() -> BicameralConfig {
    let mut config = BicameralConfig::default();
    config.hemispheres.left.timeout_ms = 1_000;
    config.hemispheres.right.timeout_ms = 1_000;
    config.harmonizer.enhancement.enabled = false;
    config.pipeline.request_timeout_ms = 5_000;
    config
}

fn coordinator(engine: Arc<ScriptedEngine>, config: &BicameralConfig) -> PipelineCoordinator {
    let spine = Arc::new(TemporalSpine::default());
    let status = Arc::new(StatusBoard::new(spine.clone(), config.gateway.max_in_flight));
    PipelineCoordinator::from_config(config, engine, spine, status)
}

fn request(payload: &str) -> ConnectionRequest {
    ConnectionRequest::new("req-1", "test", payload)
}

fn pulse() -> PulseCycle {
    TemporalSpine::default().pulse()
}

fn side(side: Side, content: &str, confidence: f64) -> Option<HemisphereVerdict> {
    Some(HemisphereVerdict::new(side, content, confidence, pulse()))
}

fn verdict(content: &str) -> HarmonizedVerdict {
    HarmonizedVerdict {
        final_content: content.into(),
        consensus: Consensus::Resolved,
        confidence: 0.9,
        source_verdicts: SourceVerdicts::default(),
        missing_sides: vec![],
        similarity: None,
        enhancement: None,
    }
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ===========================================================================
// Harmonizer
// ===========================================================================

#[test]
fn equal_confidence_tie_goes_left() {
    let config = HarmonizerConfig::default();
    let a = resolve(
        side(Side::Left, "go north", 0.6),
        side(Side::Right, "go south", 0.6),
        &LiteralComparator,
        &config,
    )
    .unwrap();
    let b = resolve(
        side(Side::Left, "go north", 0.6),
        side(Side::Right, "go south", 0.6),
        &LiteralComparator,
        &config,
    )
    .unwrap();
    assert_eq!(a.consensus, Consensus::Conflicted);
    assert_eq!(a.final_content, "go north");
    assert!(approx(a.confidence, 0.6 * config.conflict_discount));
    assert_eq!(a.final_content, b.final_content);
    assert_eq!(a.confidence, b.confidence);
}

#[test]
fn higher_confidence_side_wins_conflict() {
    let config = HarmonizerConfig::default();
    let v = resolve(
        side(Side::Left, "go north", 0.4),
        side(Side::Right, "go south", 0.9),
        &LiteralComparator,
        &config,
    )
    .unwrap();
    assert_eq!(v.final_content, "go south");
    assert_eq!(v.similarity, Some(0.0));
}

#[test]
fn right_only_is_discounted_conflict() {
    let config = HarmonizerConfig { single_source_discount: 0.25, ..HarmonizerConfig::default() };
    let v = resolve(None, side(Side::Right, "stay", 0.8), &LiteralComparator, &config).unwrap();
    assert_eq!(v.consensus, Consensus::Conflicted);
    assert_eq!(v.final_content, "stay");
    assert!(approx(v.confidence, 0.8 * 0.25));
    assert_eq!(v.missing_sides, vec![Side::Left]);
    assert!(v.source_verdicts.left.is_none());
}

#[test]
fn agreement_resolves_with_max_confidence() {
    let config = HarmonizerConfig::default();
    let v = resolve(
        side(Side::Left, "The answer is 4.", 0.7),
        side(Side::Right, "  the answer is 4. ", 0.9),
        &LiteralComparator,
        &config,
    )
    .unwrap();
    assert_eq!(v.consensus, Consensus::Resolved);
    assert_eq!(v.confidence, 0.9);
    assert!(v.missing_sides.is_empty());
}

#[test]
fn jaccard_resolves_near_matches() {
    let config = HarmonizerConfig { comparator: ComparatorKind::Jaccard, ..HarmonizerConfig::default() };
    let harmonizer = Harmonizer::new(config, Arc::new(TemporalSpine::default()));
    let v = harmonizer
        .harmonize(
            side(Side::Left, "the sky is blue", 0.5),
            side(Side::Right, "the sky is very blue", 0.6),
        )
        .unwrap();
    assert_eq!(harmonizer.comparator().name(), "jaccard");
    assert_eq!(v.consensus, Consensus::Resolved);
    assert!(approx(v.similarity.unwrap(), 0.8));
}

struct AlwaysSimilar;

impl SimilarityComparator for AlwaysSimilar {
    fn name(&self) -> &str {
        "always"
    }
    fn similarity(&self, _a: &str, _b: &str) -> f64 {
        1.0
    }
}

#[test]
fn injected_comparator_is_used() {
    let harmonizer = Harmonizer::new(HarmonizerConfig::default(), Arc::new(TemporalSpine::default()))
        .with_comparator(Arc::new(AlwaysSimilar));
    let v = harmonizer
        .harmonize(side(Side::Left, "yes", 0.3), side(Side::Right, "no", 0.4))
        .unwrap();
    assert_eq!(v.consensus, Consensus::Resolved);
    assert_eq!(v.confidence, 0.4);
}

#[test]
fn no_verdicts_is_impossible() {
    let err = resolve(None, None, &LiteralComparator, &HarmonizerConfig::default()).unwrap_err();
    assert!(matches!(err, Error::HarmonizationImpossible { .. }));
}

// ===========================================================================
// Consent gate
// ===========================================================================

fn gate(config: ConsentConfig) -> ConsentGate {
    ConsentGate::new(PolicyTable::from_config(&config), Arc::new(TemporalSpine::default()))
}

#[test]
fn delete_the_vault_is_denied_with_both_terms() {
    let decision = gate(ConsentConfig::default()).screen(&request("please delete the vault"));
    assert!(!decision.authorized);
    assert_eq!(decision.matched_block.as_deref(), Some("delete"));
    assert_eq!(decision.matched_resource.as_deref(), Some("vault"));
    assert!(decision.override_reason.is_none());
}

#[test]
fn hard_block_in_output_denies_regardless_of_confidence() {
    let mut v = verdict("I will destroy the evidence.");
    v.confidence = 1.0;
    let decision = gate(ConsentConfig::default()).authorize(&request("what now?"), &v);
    assert!(!decision.authorized);
    assert_eq!(decision.matched_block.as_deref(), Some("destroy"));
    assert!(decision.matched_resource.is_none());
}

#[test]
fn enhancement_insights_are_inspected() {
    let mut v = verdict("Clean up the drive.");
    v.enhancement = Some(ExternalEnhancement::applied("You could also format it.", "m", 1));
    let decision = gate(ConsentConfig::default()).authorize(&request("tidy my disk"), &v);
    assert!(!decision.authorized);
    assert_eq!(decision.matched_block.as_deref(), Some("format"));
}

#[test]
fn system_source_overrides_plain_hard_block() {
    let req = request("shutdown the display").with_context("source", "SYSTEM");
    let decision = gate(ConsentConfig::default()).authorize(&req, &verdict("Display is off."));
    assert!(decision.authorized);
    assert!(decision.override_reason.unwrap().contains("hard_block"));
}

#[test]
fn system_source_cannot_destroy_protected_resources() {
    let req = request("delete the vault").with_context("source", "SYSTEM");
    let decision = gate(ConsentConfig::default()).screen(&req);
    assert!(!decision.authorized);
    assert_eq!(decision.matched_resource.as_deref(), Some("vault"));
}

#[test]
fn system_allowlist_permits_destructive_action() {
    let req = request("wipe memory caches").with_context("source", "SYSTEM");
    let decision = gate(ConsentConfig::default()).screen(&req);
    assert!(decision.authorized);
    assert!(decision.override_reason.unwrap().contains("protected_action"));

    let outsider = gate(ConsentConfig::default()).screen(&request("wipe memory caches"));
    assert!(!outsider.authorized);
}

#[test]
fn system_allowlist_does_not_cover_other_resources() {
    let req = request("wipe memory and the network").with_context("source", "SYSTEM");
    let decision = gate(ConsentConfig::default()).screen(&req);
    assert!(!decision.authorized);
    assert_eq!(decision.matched_block.as_deref(), Some("wipe"));
    assert_eq!(decision.matched_resource.as_deref(), Some("network"));
    assert!(decision.override_reason.is_none());

    let outsider = gate(ConsentConfig::default()).screen(&request("wipe memory and the network"));
    assert!(!outsider.authorized);
    assert_eq!(outsider.matched_resource.as_deref(), Some("memory"));
}

#[test]
fn system_override_all_bypasses_everything() {
    let config = ConsentConfig { system_override: SystemOverride::All, ..ConsentConfig::default() };
    let req = request("delete the vault").with_context("source", "SYSTEM");
    assert!(gate(config).screen(&req).authorized);
}

#[test]
fn system_override_disabled_ignores_source() {
    let config = ConsentConfig { system_override: SystemOverride::Disabled, ..ConsentConfig::default() };
    let req = request("shutdown the display").with_context("source", "SYSTEM");
    let decision = gate(config).screen(&req);
    assert!(!decision.authorized);
    assert_eq!(decision.matched_block.as_deref(), Some("shutdown"));
}

#[test]
fn restricted_terms_need_system_and_only_check_payload() {
    let g = gate(ConsentConfig::default());
    let denied = g.screen(&request("run a diagnostic"));
    assert!(!denied.authorized);
    assert_eq!(denied.matched_block.as_deref(), Some("diagnostic"));

    let system = g.screen(&request("run a diagnostic").with_context("source", "SYSTEM"));
    assert!(system.authorized);

    let in_output = g.authorize(&request("how are you?"), &verdict("All diagnostic checks pass."));
    assert!(in_output.authorized);
}

#[test]
fn health_check_is_internal_only() {
    let g = gate(ConsentConfig::default());
    let denied = g.screen(&request("Run a health check"));
    assert!(!denied.authorized);
    assert_eq!(denied.matched_block.as_deref(), Some("health"));

    let system = g.screen(&request("Run a health check").with_context("source", "SYSTEM"));
    assert!(system.authorized);
    assert!(system.override_reason.unwrap().contains("restricted"));
}

#[test]
fn word_boundaries_prevent_false_positives() {
    let g = gate(ConsentConfig::default());
    assert!(g.screen(&request("Formatting tips for the coreffect and dose")).authorized);
    assert!(g.screen(&request("what is a kernel of corn")).authorized);
}

#[test]
fn custom_rule_table() {
    let policy = PolicyTable {
        rules: vec![PolicyRule::HardBlock { terms: vec![Term::new("Banana Split")] }],
        system_allowlist: vec![],
        system_override: SystemOverride::Disabled,
    };
    let g = ConsentGate::new(policy, Arc::new(TemporalSpine::default()));
    assert!(!g.screen(&request("one BANANA split please")).authorized);
    assert!(g.screen(&request("delete everything")).authorized);
}

#[test]
fn evaluation_is_deterministic() {
    let g = gate(ConsentConfig::default());
    let req = request("erase the registry");
    assert_eq!(g.evaluate(&req, &["ok"]), g.evaluate(&req, &["ok"]));
}

// ===========================================================================
// Coordinator
// ===========================================================================

#[tokio::test]
async fn agreeing_hemispheres_complete() {
    let engine = Arc::new(ScriptedEngine::new(
        Script::Reply("The answer is 4.\nconfidence: 0.9"),
        Script::Reply("the answer is 4.\nconfidence: 0.7"),
    ));
    let pipeline = coordinator(engine.clone(), &test_config());

    let outcome = pipeline.run(request("what is 2+2?")).await.unwrap();
    assert_eq!(outcome.stage, PipelineStage::Completed);
    assert_eq!(
        outcome.stages,
        vec![
            PipelineStage::Received,
            PipelineStage::Reasoning,
            PipelineStage::Harmonizing,
            PipelineStage::Consenting,
            PipelineStage::Completed
        ]
    );
    assert!(outcome.authorized);
    assert_eq!(outcome.response, "The answer is 4.");
    let v = outcome.verdict.as_ref().unwrap();
    assert_eq!(v.consensus, Consensus::Resolved);
    assert_eq!(v.confidence, 0.9);
    assert_eq!(outcome.seal.len(), 64);
    assert!(outcome.articulation.is_none());
    assert_eq!(engine.hemisphere_calls(), 2);
    assert_eq!(pipeline.status().snapshot().active_connections, 0);
}

#[tokio::test]
async fn missing_confidence_uses_side_default() {
    let engine = Arc::new(ScriptedEngine::new(Script::Reply("Yes."), Script::Fail));
    let mut config = test_config();
    config.hemispheres.left.default_confidence = 0.4;
    let outcome = coordinator(engine, &config).run(request("ok?")).await.unwrap();
    let v = outcome.verdict.unwrap();
    assert!(approx(v.confidence, 0.4 * DEFAULT_SINGLE_SOURCE_DISCOUNT));
    assert_eq!(v.missing_sides, vec![Side::Right]);
}

#[tokio::test]
async fn implausible_confidence_uses_side_default() {
    let engine = Arc::new(ScriptedEngine::new(Script::Reply("Yes.\nconfidence: 1.5"), Script::Fail));
    let mut config = test_config();
    config.hemispheres.left.default_confidence = 0.4;
    let outcome = coordinator(engine, &config).run(request("ok?")).await.unwrap();
    let v = outcome.verdict.unwrap();
    assert_eq!(v.final_content, "Yes.");
    assert!(approx(v.confidence, 0.4 * DEFAULT_SINGLE_SOURCE_DISCOUNT));
}

#[tokio::test]
async fn one_failed_side_still_harmonizes() {
    let engine = Arc::new(ScriptedEngine::new(
        Script::Fail,
        Script::Reply("Stay inside.\nconfidence: 0.8"),
    ));
    let outcome = coordinator(engine, &test_config()).run(request("rain?")).await.unwrap();
    let v = outcome.verdict.unwrap();
    assert_eq!(v.consensus, Consensus::Conflicted);
    assert_eq!(v.final_content, "Stay inside.");
    assert!(approx(v.confidence, 0.8 * DEFAULT_SINGLE_SOURCE_DISCOUNT));
    assert_eq!(v.missing_sides, vec![Side::Left]);
}

#[tokio::test]
async fn slow_side_times_out_independently() {
    let engine = Arc::new(ScriptedEngine::new(
        Script::Slow(2_000, "late\nconfidence: 1"),
        Script::Reply("Quick answer.\nconfidence: 0.6"),
    ));
    let mut config = test_config();
    config.hemispheres.left.timeout_ms = 50;
    let started = std::time::Instant::now();
    let outcome = coordinator(engine, &config).run(request("hurry")).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(1_500));
    let v = outcome.verdict.unwrap();
    assert_eq!(v.final_content, "Quick answer.");
    assert_eq!(v.missing_sides, vec![Side::Left]);
}

#[tokio::test]
async fn both_sides_timing_out_fails_with_harmonization_impossible() {
    let engine = Arc::new(ScriptedEngine::new(
        Script::Slow(2_000, "late"),
        Script::Slow(2_000, "late"),
    ));
    let mut config = test_config();
    config.hemispheres.left.timeout_ms = 50;
    config.hemispheres.right.timeout_ms = 50;
    let pipeline = coordinator(engine, &config);

    let err = pipeline.run(request("anything")).await.unwrap_err();
    assert!(matches!(err, Error::HarmonizationImpossible { .. }));
    assert_eq!(err.status_code(), 503);
    let msg = err.to_string();
    assert!(msg.contains("left") && msg.contains("right") && msg.contains("timed out"));
    assert_eq!(pipeline.status().snapshot().active_connections, 0);
}

#[tokio::test]
async fn request_timeout_fails_the_request() {
    let engine = Arc::new(ScriptedEngine::new(
        Script::Slow(2_000, "late"),
        Script::Slow(2_000, "late"),
    ));
    let mut config = test_config();
    config.pipeline.request_timeout_ms = 100;
    let pipeline = coordinator(engine, &config);

    let err = pipeline.run(request("anything")).await.unwrap_err();
    assert_eq!(err.cause(), "Timeout");
    assert_eq!(err.status_code(), 503);
    let snap = pipeline.status().snapshot();
    assert_eq!(snap.active_connections, 0);
    assert_eq!(snap.hemisphere_status.left, HemisphereState::Inactive);
    assert_eq!(snap.hemisphere_status.right, HemisphereState::Inactive);
}

#[tokio::test]
async fn denied_request_returns_refusal() {
    let engine = Arc::new(ScriptedEngine::new(
        Script::Reply("Sure.\nconfidence: 0.9"),
        Script::Reply("Sure.\nconfidence: 0.9"),
    ));
    let outcome = coordinator(engine, &test_config())
        .run(request("please delete the vault"))
        .await
        .unwrap();
    assert_eq!(outcome.stage, PipelineStage::Denied);
    assert!(!outcome.authorized);
    assert_eq!(outcome.response, REFUSAL);
    assert_eq!(outcome.decision.matched_block.as_deref(), Some("delete"));
    assert_eq!(outcome.decision.matched_resource.as_deref(), Some("vault"));
}

#[tokio::test]
async fn verdict_can_introduce_denial() {
    let engine = Arc::new(ScriptedEngine::new(
        Script::Reply("You should wipe everything.\nconfidence: 0.9"),
        Script::Reply("you should wipe everything.\nconfidence: 0.8"),
    ));
    let outcome = coordinator(engine, &test_config()).run(request("clean up?")).await.unwrap();
    assert!(!outcome.authorized);
    assert_eq!(outcome.decision.matched_block.as_deref(), Some("wipe"));
}

#[tokio::test]
async fn identical_requests_get_identical_consent() {
    let engine = Arc::new(ScriptedEngine::new(
        Script::Reply("Fine.\nconfidence: 0.9"),
        Script::Reply("Fine.\nconfidence: 0.9"),
    ));
    let pipeline = coordinator(engine, &test_config());
    let a = pipeline.run(request("kill the lights")).await.unwrap();
    let b = pipeline.run(request("kill the lights")).await.unwrap();
    assert_eq!(a.authorized, b.authorized);
    assert_ne!(a.seal, b.seal);
}

#[tokio::test]
async fn enhancement_adds_metadata_only() {
    let engine = Arc::new(
        ScriptedEngine::new(
            Script::Reply("Go north.\nconfidence: 0.6"),
            Script::Reply("Go south.\nconfidence: 0.6"),
        )
        .with_other(Script::Reply("Consider the weather first.")),
    );
    let mut config = test_config();
    config.harmonizer.enhancement.enabled = true;
    let outcome = coordinator(engine.clone(), &config).run(request("which way?")).await.unwrap();
    let v = outcome.verdict.unwrap();
    assert_eq!(v.consensus, Consensus::Conflicted);
    assert_eq!(v.final_content, "Go north.");
    let e = v.enhancement.unwrap();
    assert!(e.applied);
    assert_eq!(e.insights.as_deref(), Some("Consider the weather first."));

    let prompt = engine.last_other.lock().unwrap().clone().unwrap().prompt;
    assert!(prompt.contains("which way?"));
    assert!(prompt.contains("Go south."));
}

#[tokio::test]
async fn enhancement_failure_is_recorded_not_fatal() {
    let engine = Arc::new(
        ScriptedEngine::new(
            Script::Reply("Yes.\nconfidence: 0.9"),
            Script::Reply("Yes.\nconfidence: 0.9"),
        )
        .with_other(Script::Fail),
    );
    let mut config = test_config();
    config.harmonizer.enhancement.enabled = true;
    let outcome = coordinator(engine, &config).run(request("ok?")).await.unwrap();
    assert!(outcome.authorized);
    let v = outcome.verdict.unwrap();
    assert_eq!(v.consensus, Consensus::Resolved);
    let e = v.enhancement.unwrap();
    assert!(!e.applied);
    assert!(e.error.unwrap().contains("enhancement unavailable"));
}

#[tokio::test]
async fn slow_enhancement_times_out() {
    let engine = Arc::new(
        ScriptedEngine::new(
            Script::Reply("Yes.\nconfidence: 0.9"),
            Script::Reply("Yes.\nconfidence: 0.9"),
        )
        .with_other(Script::Slow(2_000, "too late")),
    );
    let mut config = test_config();
    config.harmonizer.enhancement.enabled = true;
    config.harmonizer.enhancement.timeout_ms = 50;
    let outcome = coordinator(engine, &config).run(request("ok?")).await.unwrap();
    let e = outcome.verdict.unwrap().enhancement.unwrap();
    assert!(!e.applied);
    assert!(e.error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn articulation_runs_when_enabled() {
    let engine = Arc::new(
        ScriptedEngine::new(
            Script::Reply("Rest now.\nconfidence: 0.9"),
            Script::Reply("rest now.\nconfidence: 0.9"),
        )
        .with_other(Script::Reply("\"You should rest now\"")),
    );
    let mut config = test_config();
    config.pipeline.articulate = true;
    let outcome = coordinator(engine, &config).run(request("tired")).await.unwrap();
    let a = outcome.articulation.unwrap();
    assert_eq!(a.source, ArticulationSource::Engine);
    assert_eq!(a.text, "You should rest now.");
}

#[tokio::test]
async fn direct_reasoning_bypasses_hemispheres() {
    let engine = Arc::new(
        ScriptedEngine::new(Script::Fail, Script::Fail).with_other(Script::Reply("Paris.")),
    );
    let req = request("capital of France?")
        .with_mode(RequestMode::DirectReasoning)
        .with_context(DIRECT_SYSTEM_KEY, "answer tersely");
    let outcome = coordinator(engine.clone(), &test_config()).run(req).await.unwrap();
    assert_eq!(outcome.response, "Paris.");
    assert_eq!(outcome.model.as_deref(), Some("mock-model"));
    assert!(outcome.verdict.is_none());
    assert_eq!(
        outcome.stages,
        vec![
            PipelineStage::Received,
            PipelineStage::Reasoning,
            PipelineStage::Consenting,
            PipelineStage::Completed
        ]
    );
    assert_eq!(engine.hemisphere_calls(), 0);
    let sent = engine.last_other.lock().unwrap().clone().unwrap();
    assert_eq!(sent.system.as_deref(), Some("answer tersely"));
}

#[tokio::test]
async fn direct_reasoning_output_passes_consent() {
    let engine = Arc::new(
        ScriptedEngine::new(Script::Fail, Script::Fail)
            .with_other(Script::Reply("Just erase the kernel.")),
    );
    let req = request("fix my computer").with_mode(RequestMode::DirectReasoning);
    let outcome = coordinator(engine, &test_config()).run(req).await.unwrap();
    assert!(!outcome.authorized);
    assert_eq!(outcome.response, REFUSAL);
}

#[tokio::test]
async fn direct_reasoning_failure_is_unavailable() {
    let engine = Arc::new(ScriptedEngine::new(Script::Fail, Script::Fail).with_other(Script::Fail));
    let req = request("hello").with_mode(RequestMode::DirectReasoning);
    let err = coordinator(engine, &test_config()).run(req).await.unwrap_err();
    assert_eq!(err.cause(), "ReasoningUnavailable");
}

#[tokio::test]
async fn articulation_test_uses_supplied_verdicts() {
    let engine = Arc::new(
        ScriptedEngine::new(Script::Fail, Script::Fail)
            .with_other(Script::Reply("Protect the user")),
    );
    let supplied = SuppliedVerdicts {
        left: Some(("Proceed carefully".into(), Some(0.7))),
        right: Some(("Wait and observe".into(), Some(0.9))),
        distilled_override: Some("Protect the user.".into()),
    };
    let outcome = coordinator(engine.clone(), &test_config())
        .run_articulation_test(request("speak"), supplied)
        .await
        .unwrap();

    assert_eq!(outcome.mode, RequestMode::ArticulationTest);
    assert_eq!(
        outcome.stages,
        vec![
            PipelineStage::Received,
            PipelineStage::Harmonizing,
            PipelineStage::Consenting,
            PipelineStage::Completed
        ]
    );
    let v = outcome.verdict.unwrap();
    assert_eq!(v.consensus, Consensus::Overridden);
    assert_eq!(v.final_content, "Protect the user.");
    assert!(approx(v.confidence, 0.9 * DEFAULT_CONFLICT_DISCOUNT));
    assert_eq!(outcome.articulation.unwrap().text, "Protect the user.");
    assert_eq!(engine.hemisphere_calls(), 0);
}

#[tokio::test]
async fn articulation_falls_back_when_engine_fails() {
    let engine = Arc::new(ScriptedEngine::new(Script::Fail, Script::Fail).with_other(Script::Fail));
    let supplied = SuppliedVerdicts {
        left: Some(("we wait".into(), None)),
        right: None,
        distilled_override: None,
    };
    let outcome = coordinator(engine, &test_config())
        .run_articulation_test(request("speak"), supplied)
        .await
        .unwrap();
    let a = outcome.articulation.unwrap();
    assert_eq!(a.source, ArticulationSource::Fallback);
    assert_eq!(a.text, "I have carefully considered this matter. we wait");
}

#[tokio::test]
async fn articulation_mode_requires_supplied_verdicts() {
    let engine = Arc::new(ScriptedEngine::new(Script::Fail, Script::Fail));
    let req = request("x").with_mode(RequestMode::ArticulationTest);
    let err = coordinator(engine, &test_config()).run(req).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn status_reflects_in_flight_work() {
    let engine = Arc::new(ScriptedEngine::new(
        Script::Slow(300, "A\nconfidence: 0.5"),
        Script::Slow(300, "A\nconfidence: 0.5"),
    ));
    let pipeline = Arc::new(coordinator(engine, &test_config()));
    let mut rx = pipeline.status().subscribe();

    let runner = pipeline.clone();
    let task = tokio::spawn(async move { runner.run(request("slow")).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    let busy = pipeline.status().snapshot();
    assert_eq!(busy.active_connections, 1);
    assert!(busy.cognitive_load > 0.0);
    assert_eq!(busy.hemisphere_status.left, HemisphereState::Active);
    assert_eq!(busy.hemisphere_status.right, HemisphereState::Active);

    task.await.unwrap().unwrap();
    let idle = pipeline.status().snapshot();
    assert_eq!(idle.active_connections, 0);
    assert_eq!(idle.hemisphere_status.left, HemisphereState::Inactive);
    assert!(idle.revision > busy.revision);

    rx.changed().await.unwrap();
    assert_eq!(rx.borrow().revision, idle.revision);
}

#[tokio::test]
async fn outcome_serializes_for_transport() {
    let engine = Arc::new(ScriptedEngine::new(
        Script::Reply("Yes.\nconfidence: 0.9"),
        Script::Reply("Yes.\nconfidence: 0.9"),
    ));
    let outcome = coordinator(engine, &test_config()).run(request("ok?")).await.unwrap();
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["stage"], "completed");
    assert_eq!(json["authorized"], true);
    assert_eq!(json["verdict"]["consensus"], "resolved");
    assert!(json.get("articulation").is_none());
}
