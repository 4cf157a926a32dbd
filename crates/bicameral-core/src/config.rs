//! Bicameral configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BicameralConfig {
    pub gateway: GatewayConfig,
    pub spine: SpineConfig,
    /// The external reasoning service.
    pub engine: EngineConfig,
    pub hemispheres: HemispheresConfig,
    pub harmonizer: HarmonizerConfig,
    pub consent: ConsentConfig,
    pub pipeline: PipelineConfig,
}

// ============================================================
// Gateway
// ============================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub port: u16,
    pub bind: BindMode,
    pub auth: AuthConfig,
    /// Maximum requests traversing the pipeline at once.
    pub max_in_flight: usize,
    /// Requests allowed to wait for a slot beyond `max_in_flight`.
    /// Zero means reject immediately at the limit.
    pub queue_depth: usize,
    /// Tasks the orchestrator holds, pending plus executing.
    pub task_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            bind: BindMode::default(),
            auth: AuthConfig::default(),
            max_in_flight: 10,
            queue_depth: 0,
            task_capacity: 1024,
        }
    }
}

/// Bind mode for the gateway
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    #[default]
    Loopback,
    Lan,
}

impl BindMode {
    pub fn to_addr(&self) -> &str {
        match self {
            BindMode::Loopback => "127.0.0.1",
            BindMode::Lan => "0.0.0.0",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "lan" | "0.0.0.0" => BindMode::Lan,
            _ => BindMode::Loopback,
        }
    }
}

/// Authentication configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    pub token: Option<String>,
}

/// Authentication mode
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    Token,
    None,
}

// ============================================================
// Spine
// ============================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SpineConfig {
    /// Allowed disagreement between wall clock and monotonic progression.
    pub drift_tolerance_ms: u64,
}

impl Default for SpineConfig {
    fn default() -> Self {
        Self { drift_tolerance_ms: 250 }
    }
}

impl SpineConfig {
    pub fn drift_tolerance(&self) -> Duration {
        Duration::from_millis(self.drift_tolerance_ms)
    }
}

// ============================================================
// Reasoning engine
// ============================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub base_url: String,
    pub model: String,
    /// Transport-level timeout for a single call.
    pub timeout_ms: u64,
    pub max_tokens: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".into(),
            model: "phi3:mini".into(),
            timeout_ms: 60_000,
            max_tokens: 256,
        }
    }
}

// ============================================================
// Hemispheres
// ============================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HemispheresConfig {
    pub left: HemisphereConfig,
    pub right: HemisphereConfig,
}

impl Default for HemispheresConfig {
    fn default() -> Self {
        Self {
            left: HemisphereConfig::left(),
            right: HemisphereConfig::right(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HemisphereConfig {
    /// Model override; empty uses `engine.model`.
    pub model: String,
    pub system_prompt: String,
    pub temperature: f32,
    /// Independent timeout budget for this side.
    pub timeout_ms: u64,
    /// Confidence assumed when the engine reports none.
    pub default_confidence: f64,
}

impl HemisphereConfig {
    pub fn left() -> Self {
        Self {
            model: String::new(),
            system_prompt: "You are the left hemisphere of a two-part reasoning system. \
                Reason analytically: decompose the message, apply deduction, and state a \
                precise, literal answer. Do not speculate beyond the evidence."
                .into(),
            temperature: 0.3,
            timeout_ms: 30_000,
            default_confidence: 0.6,
        }
    }

    pub fn right() -> Self {
        Self {
            model: String::new(),
            system_prompt: "You are the right hemisphere of a two-part reasoning system. \
                Reason intuitively: look for patterns, context, analogies and the intent \
                behind the message, then state a clear answer."
                .into(),
            temperature: 0.8,
            timeout_ms: 30_000,
            default_confidence: 0.6,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for HemisphereConfig {
    fn default() -> Self {
        Self::left()
    }
}

// ============================================================
// Harmonizer
// ============================================================

/// Default discount applied to single-sourced answers.
pub const DEFAULT_SINGLE_SOURCE_DISCOUNT: f64 = 0.5;
/// Default discount applied when both sides disagree.
pub const DEFAULT_CONFLICT_DISCOUNT: f64 = 0.8;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonizerConfig {
    pub single_source_discount: f64,
    pub conflict_discount: f64,
    /// Similarity strictly above this resolves consensus.
    pub similarity_threshold: f64,
    pub comparator: ComparatorKind,
    pub enhancement: EnhancementConfig,
}

impl Default for HarmonizerConfig {
    fn default() -> Self {
        Self {
            single_source_discount: DEFAULT_SINGLE_SOURCE_DISCOUNT,
            conflict_discount: DEFAULT_CONFLICT_DISCOUNT,
            similarity_threshold: 0.5,
            comparator: ComparatorKind::default(),
            enhancement: EnhancementConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComparatorKind {
    /// Trimmed, case-insensitive equality.
    #[default]
    Literal,
    /// Word-set overlap.
    Jaccard,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
    /// Model override; empty uses `engine.model`.
    pub model: String,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self { enabled: true, timeout_ms: 10_000, model: String::new() }
    }
}

impl EnhancementConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ============================================================
// Consent
// ============================================================

/// How far a `source=SYSTEM` context reaches.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SystemOverride {
    /// Bypass hard blocks and restricted terms; destructive actions on
    /// protected resources are still denied unless allowlisted.
    #[default]
    HardBlocksOnly,
    /// Bypass every rule.
    All,
    /// SYSTEM context has no effect.
    Disabled,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentConfig {
    /// Action-like terms that force denial.
    pub hard_block_terms: Vec<String>,
    /// Sensitive system nouns; denied when paired with a hard-block term.
    pub protected_resource_terms: Vec<String>,
    /// Internal-only terms, checked against the request payload.
    pub restricted_terms: Vec<String>,
    /// Protected resources a SYSTEM caller may still act on destructively.
    pub system_allowlist: Vec<String>,
    pub system_override: SystemOverride,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        let strings = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();
        Self {
            hard_block_terms: strings(&[
                "delete", "destroy", "erase", "wipe", "kill", "shutdown", "disable", "break",
                "format", "overwrite",
            ]),
            protected_resource_terms: strings(&[
                "system files", "kernel", "core", "os", "vault", "memory", "network", "registry",
            ]),
            restricted_terms: strings(&["diagnostic", "health"]),
            system_allowlist: strings(&["memory"]),
            system_override: SystemOverride::default(),
        }
    }
}

// ============================================================
// Pipeline
// ============================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Budget for one whole traversal.
    pub request_timeout_ms: u64,
    /// Hand authorized verdicts to the articulator in full-pipeline mode.
    pub articulate: bool,
    pub articulation_timeout_ms: u64,
    /// Budget for the single engine call of a direct reasoning request.
    pub direct_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 90_000,
            articulate: false,
            articulation_timeout_ms: 15_000,
            direct_timeout_ms: 30_000,
        }
    }
}

impl PipelineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn articulation_timeout(&self) -> Duration {
        Duration::from_millis(self.articulation_timeout_ms)
    }

    pub fn direct_timeout(&self) -> Duration {
        Duration::from_millis(self.direct_timeout_ms)
    }
}

// ============================================================
// Loading
// ============================================================

impl BicameralConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| crate::Error::ConfigError(e.to_string()))
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}
