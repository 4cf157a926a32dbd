//! Core types for Bicameral

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Context key whose value `SYSTEM` marks a trusted internal caller.
pub const SOURCE_CONTEXT_KEY: &str = "source";
pub const SYSTEM_SOURCE: &str = "SYSTEM";

// ---------------------------------------------------------------------------
// PulseCycle
// ---------------------------------------------------------------------------

/// A logical timestamp issued by the temporal spine. Immutable once created.
///
/// `cycle_id` is zero-padded so that string order equals issue order.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PulseCycle {
    pub cycle_id: String,
    pub logical_time: f64,
    pub epoch_label: String,
}

impl PartialOrd for PulseCycle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cycle_id.cmp(&other.cycle_id))
    }
}

impl std::fmt::Display for PulseCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.cycle_id, self.epoch_label)
    }
}

// ---------------------------------------------------------------------------
// Hemispheres
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one hemisphere for one request. Owned by the coordinator and
/// moved into the harmonizer; never shared between sides.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HemisphereVerdict {
    pub side: Side,
    pub content: String,
    pub confidence: f64,
    pub produced_at: PulseCycle,
}

impl HemisphereVerdict {
    /// Builds a verdict, clamping confidence into [0, 1].
    pub fn new(side: Side, content: impl Into<String>, confidence: f64, produced_at: PulseCycle) -> Self {
        Self {
            side,
            content: content.into(),
            confidence: clamp_unit(confidence),
            produced_at,
        }
    }
}

/// Clamp to [0, 1]; NaN becomes 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// Harmonization
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Consensus {
    Resolved,
    Conflicted,
    Overridden,
}

/// The hemisphere verdicts a harmonized verdict was built from.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceVerdicts {
    pub left: Option<HemisphereVerdict>,
    pub right: Option<HemisphereVerdict>,
}

impl SourceVerdicts {
    pub fn get(&self, side: Side) -> Option<&HemisphereVerdict> {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        }
    }

    /// Sides that produced no verdict, in left-right order.
    pub fn missing(&self) -> Vec<Side> {
        Side::BOTH
            .into_iter()
            .filter(|side| self.get(*side).is_none())
            .collect()
    }
}

/// Record of the optional enhancement pass. Additive only.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExternalEnhancement {
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insights: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl ExternalEnhancement {
    pub fn applied(insights: impl Into<String>, model: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            applied: true,
            insights: Some(insights.into()),
            model: Some(model.into()),
            error: None,
            elapsed_ms,
        }
    }

    pub fn unavailable(error: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            applied: false,
            insights: None,
            model: None,
            error: Some(error.into()),
            elapsed_ms,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HarmonizedVerdict {
    pub final_content: String,
    pub consensus: Consensus,
    pub confidence: f64,
    pub source_verdicts: SourceVerdicts,
    /// Sides that were absent when harmonizing.
    pub missing_sides: Vec<Side>,
    /// Similarity score between the two sides, when both were present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enhancement: Option<ExternalEnhancement>,
}

// ---------------------------------------------------------------------------
// Consent
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConsentDecision {
    pub authorized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_block: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_reason: Option<String>,
    pub decided_at: PulseCycle,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    #[serde(alias = "urgent")]
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestMode {
    #[default]
    FullPipeline,
    DirectReasoning,
    ArticulationTest,
}

/// One pipeline traversal's worth of input. Not shared across requests.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConnectionRequest {
    pub request_id: String,
    pub platform: String,
    pub payload: String,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub mode: RequestMode,
}

impl ConnectionRequest {
    pub fn new(request_id: impl Into<String>, platform: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            platform: platform.into(),
            payload: payload.into(),
            context: BTreeMap::new(),
            priority: Priority::Normal,
            mode: RequestMode::FullPipeline,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// True when `context["source"] == "SYSTEM"` (exact match).
    pub fn is_system(&self) -> bool {
        self.context.get(SOURCE_CONTEXT_KEY).map(String::as_str) == Some(SYSTEM_SOURCE)
    }
}

// ---------------------------------------------------------------------------
// Adapters
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapabilitySet {
    pub send: bool,
    pub receive: bool,
}

impl CapabilitySet {
    /// Parse capability names; unknown names are ignored.
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut set = Self::default();
        for name in names {
            match name.trim().to_ascii_lowercase().as_str() {
                "send" => set.send = true,
                "receive" => set.receive = true,
                _ => {}
            }
        }
        set
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.send {
            names.push("send");
        }
        if self.receive {
            names.push("receive");
        }
        names
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AdapterBinding {
    pub platform_name: String,
    pub capability_set: CapabilitySet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub registered_at: PulseCycle,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HemisphereState {
    Active,
    #[default]
    Inactive,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HemisphereStatus {
    pub left: HemisphereState,
    pub right: HemisphereState,
}

impl HemisphereStatus {
    pub fn get(&self, side: Side) -> HemisphereState {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Executing,
    Completed,
}

/// A unit of work held by the task orchestrator, stamped with a pulse at
/// each state change. The id is the cycle id of the queueing pulse.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QueuedTask {
    pub task_id: String,
    pub data: serde_json::Value,
    pub priority: Priority,
    pub state: TaskState,
    pub queued_at: PulseCycle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<PulseCycle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<PulseCycle>,
}

/// Consistent point-in-time view of the system, as published to listeners.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SystemStatusSnapshot {
    pub active_connections: usize,
    pub cognitive_load: f64,
    pub hemisphere_status: HemisphereStatus,
    pub last_pulse: PulseCycle,
    pub revision: u64,
    pub drift_detected: bool,
    pub max_in_flight: usize,
    pub registered_adapters: usize,
}

// ---------------------------------------------------------------------------
// Pipeline stages
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Received,
    Reasoning,
    Harmonizing,
    Consenting,
    Completed,
    Denied,
    Failed,
}

impl PipelineStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Denied | Self::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: PipelineStage) -> bool {
        use PipelineStage::*;
        match (self, next) {
            (Received, Reasoning) => true,
            // articulation_test skips the hemispheres, direct_reasoning skips harmonizing
            (Received, Harmonizing) | (Reasoning, Consenting) => true,
            (Reasoning, Harmonizing) => true,
            (Harmonizing, Consenting) => true,
            (Consenting, Completed) | (Consenting, Denied) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}
