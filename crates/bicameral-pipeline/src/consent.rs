//! Consent gate - ordered policy rules over the request and its candidate output
//!
//! The gate is stateless: the decision is a function of the request, the
//! harmonized verdict and the policy table. Rules are data, evaluated in
//! order; the first rule that matches and is not bypassed denies.
//!
//! Matching is case-insensitive and tokenized: text is split on anything
//! that is not alphanumeric, and a term (possibly several words) matches a
//! contiguous run of tokens. `os` therefore matches "the OS" but not "dose".

use bicameral_core::{
    ConnectionRequest, ConsentConfig, ConsentDecision, HarmonizedVerdict, SystemOverride,
    TemporalSpine,
};
use std::sync::Arc;
use tracing::warn;

/// Fixed response that replaces the pipeline output on denial.
pub const REFUSAL: &str = "DENIED: this request was refused by the consent gate.";

/// Where a rule looks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Request payload only.
    Payload,
    /// Payload, harmonized content and enhancement insights.
    PayloadAndOutput,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PolicyRule {
    /// An action term and a protected resource appearing together.
    ProtectedAction { actions: Vec<Term>, resources: Vec<Term> },
    /// Any occurrence denies.
    HardBlock { terms: Vec<Term> },
    /// Internal-only terms; denied unless the caller is SYSTEM.
    Restricted { terms: Vec<Term> },
}

impl PolicyRule {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProtectedAction { .. } => "protected_action",
            Self::HardBlock { .. } => "hard_block",
            Self::Restricted { .. } => "restricted",
        }
    }

    fn scope(&self) -> Scope {
        match self {
            Self::Restricted { .. } => Scope::Payload,
            _ => Scope::PayloadAndOutput,
        }
    }

    fn find(&self, texts: &ScannedText) -> Option<RuleMatch> {
        let tokens = texts.tokens(self.scope());
        match self {
            Self::ProtectedAction { actions, resources } => {
                let action = first_match(actions, tokens)?;
                let found: Vec<String> = resources
                    .iter()
                    .filter(|t| t.matches(tokens))
                    .map(|t| t.text.clone())
                    .collect();
                if found.is_empty() {
                    return None;
                }
                Some(RuleMatch { block: Some(action), resources: found })
            }
            Self::HardBlock { terms } | Self::Restricted { terms } => {
                first_match(terms, tokens).map(|t| RuleMatch { block: Some(t), resources: Vec::new() })
            }
        }
    }
}

/// A lowercase term, pre-split into tokens.
#[derive(Clone, Debug, PartialEq)]
pub struct Term {
    pub text: String,
    tokens: Vec<String>,
}

impl Term {
    pub fn new(text: &str) -> Self {
        Self { text: text.trim().to_lowercase(), tokens: tokenize(text) }
    }

    fn matches(&self, haystack: &[String]) -> bool {
        let n = self.tokens.len();
        n > 0 && haystack.windows(n).any(|w| w == self.tokens.as_slice())
    }
}

fn terms(list: &[String]) -> Vec<Term> {
    list.iter().map(|t| Term::new(t)).filter(|t| !t.tokens.is_empty()).collect()
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn first_match(terms: &[Term], tokens: &[String]) -> Option<String> {
    terms.iter().find(|t| t.matches(tokens)).map(|t| t.text.clone())
}

#[derive(Debug, PartialEq)]
struct RuleMatch {
    block: Option<String>,
    /// Every protected resource present, in config order.
    resources: Vec<String>,
}

/// Token streams for each scope. Texts are kept apart by an empty-token
/// barrier so a multi-word term cannot straddle two texts.
struct ScannedText {
    payload: Vec<String>,
    all: Vec<String>,
}

impl ScannedText {
    fn new(payload: &str, outputs: &[&str]) -> Self {
        let payload_tokens = tokenize(payload);
        let mut all = payload_tokens.clone();
        for text in outputs {
            all.push(String::new());
            all.extend(tokenize(text));
        }
        Self { payload: payload_tokens, all }
    }

    fn tokens(&self, scope: Scope) -> &[String] {
        match scope {
            Scope::Payload => &self.payload,
            Scope::PayloadAndOutput => &self.all,
        }
    }
}

/// The ordered rule list plus the SYSTEM override settings.
#[derive(Clone, Debug)]
pub struct PolicyTable {
    pub rules: Vec<PolicyRule>,
    pub system_allowlist: Vec<Term>,
    pub system_override: SystemOverride,
}

impl PolicyTable {
    /// Most specific rule first: protected actions, hard blocks, restricted terms.
    pub fn from_config(config: &ConsentConfig) -> Self {
        Self {
            rules: vec![
                PolicyRule::ProtectedAction {
                    actions: terms(&config.hard_block_terms),
                    resources: terms(&config.protected_resource_terms),
                },
                PolicyRule::HardBlock { terms: terms(&config.hard_block_terms) },
                PolicyRule::Restricted { terms: terms(&config.restricted_terms) },
            ],
            system_allowlist: terms(&config.system_allowlist),
            system_override: config.system_override,
        }
    }

    /// First matched resource that the SYSTEM allowlist does not cover.
    fn unlisted<'a>(&self, found: &'a RuleMatch) -> Option<&'a String> {
        found
            .resources
            .iter()
            .find(|r| !self.system_allowlist.iter().any(|a| &a.text == *r))
    }

    /// Whether a SYSTEM caller may pass `rule` for this match.
    fn system_bypasses(&self, rule: &PolicyRule, found: &RuleMatch) -> bool {
        match self.system_override {
            SystemOverride::Disabled => false,
            SystemOverride::All => true,
            SystemOverride::HardBlocksOnly => match rule {
                PolicyRule::ProtectedAction { .. } => self.unlisted(found).is_none(),
                PolicyRule::HardBlock { .. } | PolicyRule::Restricted { .. } => true,
            },
        }
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::from_config(&ConsentConfig::default())
    }
}

/// Outcome of evaluating the table, before it is timestamped.
#[derive(Clone, Debug, PartialEq)]
pub struct PolicyOutcome {
    pub authorized: bool,
    pub rule: Option<&'static str>,
    pub matched_block: Option<String>,
    pub matched_resource: Option<String>,
    pub override_reason: Option<String>,
}

pub struct ConsentGate {
    policy: PolicyTable,
    spine: Arc<TemporalSpine>,
}

impl ConsentGate {
    pub fn new(policy: PolicyTable, spine: Arc<TemporalSpine>) -> Self {
        Self { policy, spine }
    }

    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    /// Decide on a request and its candidate output.
    pub fn authorize(&self, request: &ConnectionRequest, verdict: &HarmonizedVerdict) -> ConsentDecision {
        let mut outputs = vec![verdict.final_content.as_str()];
        if let Some(insights) = verdict.enhancement.as_ref().and_then(|e| e.insights.as_deref()) {
            outputs.push(insights);
        }
        self.decide(request, &outputs)
    }

    /// Decide on a request and raw engine output that never went through
    /// harmonization.
    pub fn authorize_text(&self, request: &ConnectionRequest, output: &str) -> ConsentDecision {
        self.decide(request, &[output])
    }

    /// Decide on a request payload alone, before any output exists.
    pub fn screen(&self, request: &ConnectionRequest) -> ConsentDecision {
        self.decide(request, &[])
    }

    /// Pure evaluation of the policy table.
    pub fn evaluate(&self, request: &ConnectionRequest, outputs: &[&str]) -> PolicyOutcome {
        let texts = ScannedText::new(&request.payload, outputs);
        let system = request.is_system();
        let mut override_reason = None;

        for rule in &self.policy.rules {
            let Some(found) = rule.find(&texts) else { continue };

            if system && self.policy.system_bypasses(rule, &found) {
                if override_reason.is_none() {
                    override_reason = Some(format!(
                        "SYSTEM source bypassed {} rule ({})",
                        rule.name(),
                        describe(&found)
                    ));
                }
                continue;
            }

            let unlisted = if system { self.policy.unlisted(&found) } else { None };
            let resource = unlisted.or(found.resources.first()).cloned();
            return PolicyOutcome {
                authorized: false,
                rule: Some(rule.name()),
                matched_block: found.block,
                matched_resource: resource,
                override_reason: None,
            };
        }

        PolicyOutcome {
            authorized: true,
            rule: None,
            matched_block: None,
            matched_resource: None,
            override_reason,
        }
    }

    fn decide(&self, request: &ConnectionRequest, outputs: &[&str]) -> ConsentDecision {
        let outcome = self.evaluate(request, outputs);
        let decided_at = self.spine.pulse();

        if !outcome.authorized {
            warn!(
                "Consent escalation [{}]: denied request {} from {} by {} rule (block={:?}, resource={:?})",
                decided_at.epoch_label,
                request.request_id,
                request.platform,
                outcome.rule.unwrap_or("unknown"),
                outcome.matched_block,
                outcome.matched_resource
            );
        } else if let Some(reason) = &outcome.override_reason {
            warn!(
                "Consent escalation [{}]: request {} authorized by override: {}",
                decided_at.epoch_label, request.request_id, reason
            );
        }

        ConsentDecision {
            authorized: outcome.authorized,
            matched_block: outcome.matched_block,
            matched_resource: outcome.matched_resource,
            override_reason: outcome.override_reason,
            decided_at,
        }
    }
}

fn describe(found: &RuleMatch) -> String {
    let resources = found.resources.join("', '");
    match (&found.block, resources.is_empty()) {
        (Some(b), false) => format!("'{}' on '{}'", b, resources),
        (Some(b), true) => format!("'{}'", b),
        (None, false) => format!("'{}'", resources),
        (None, true) => String::new(),
    }
}
