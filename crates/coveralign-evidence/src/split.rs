//! Canonical split resolver.
//!
//! `resolve_split` is the only entry point that may declare a coverage's
//! canonical sub-codes *decided*. It runs the scope detector over the
//! supplied policy spans and unions the results, but only behind the
//! evidence gate:
//!
//! - no spans supplied, or no span contributes → **undecided**, carrying a
//!   name-derived [`NameHint`] with confidence `unknown`,
//! - one or more spans contribute → **decided**, carrying the folded codes
//!   and a pointer to every contributing span.
//!
//! [`DecidedSplit`] cannot be constructed without contributing spans;
//! [`UndecidedSplit`] cannot carry decided codes at all. The hint is
//! advisory and must never be substituted for decided codes downstream.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use coveralign_core::{normalize_name, CancerSubtype, CanonicalCode};

use crate::{
    classify_evidence, mentioned_subtypes, EvidencePattern, EvidenceSpanRefV1,
    PolicyEvidenceSpanV1, ScopeEvidence,
};

pub const SPLIT_RESULT_VERSION_V1: u32 = 1;

// ============================================================================
// Name hints (advisory only)
// ============================================================================

/// Hit-or-miss keyword mentions in the raw coverage name alone.
///
/// A hint is what we are allowed to say about a coverage when no policy text
/// was supplied. It routes human review; it never decides anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameHint {
    pub mentions_general: bool,
    pub mentions_similar: bool,
    pub mentions_in_situ: bool,
    pub mentions_borderline: bool,
    pub mentions_exclusion: bool,
}

impl NameHint {
    pub fn from_raw_name(raw_name: &str) -> Self {
        let normalized = normalize_name(raw_name);
        NameHint {
            mentions_general: normalized.contains("general cancer")
                || normalized.contains("general-cancer"),
            mentions_similar: normalized.contains("similar cancer")
                || normalized.contains("similar-cancer"),
            mentions_in_situ: normalized.contains("in situ") || normalized.contains("in-situ"),
            mentions_borderline: normalized.contains("borderline"),
            mentions_exclusion: normalized.contains("excluded")
                || normalized.contains("excluding")
                || normalized.contains("except"),
        }
    }

    /// Sub-type codes the name alone gestures at. Advisory: used to fill
    /// the *recalled* side of a coverage decision, never the decided side.
    pub fn recalled_codes(&self) -> BTreeSet<CanonicalCode> {
        let mut out = BTreeSet::new();
        if self.mentions_general {
            out.insert(CancerSubtype::General.code());
        }
        if self.mentions_similar {
            out.insert(CancerSubtype::Similar.code());
        }
        if self.mentions_in_situ {
            out.insert(CancerSubtype::InSitu.code());
        }
        if self.mentions_borderline {
            out.insert(CancerSubtype::Borderline.code());
        }
        out
    }
}

// ============================================================================
// Split outcomes
// ============================================================================

/// How a split was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMethod {
    PolicyEvidence,
    Undecided,
}

/// Confidence attached to a split result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitConfidence {
    /// Two or more policy spans contributed.
    High,
    /// Exactly one policy span contributed.
    Medium,
    /// No policy evidence; nothing is decided.
    Unknown,
}

/// A decided split. Constructible only from scope evidence with at least one
/// contributing span; the compiler and an assertion both enforce the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecidedSplit {
    codes: BTreeSet<CanonicalCode>,
    evidence: ScopeEvidence,
    confidence: SplitConfidence,
}

impl DecidedSplit {
    /// Contract: `evidence` must carry at least one contributing span.
    fn new(evidence: ScopeEvidence) -> Self {
        assert!(
            evidence.has_contributions(),
            "decided split constructed without contributing evidence spans"
        );
        let confidence = if evidence.spans.len() >= 2 {
            SplitConfidence::High
        } else {
            SplitConfidence::Medium
        };
        DecidedSplit {
            codes: evidence.included_codes(),
            evidence,
            confidence,
        }
    }

    pub fn codes(&self) -> &BTreeSet<CanonicalCode> {
        &self.codes
    }

    pub fn evidence_spans(&self) -> &[EvidenceSpanRefV1] {
        &self.evidence.spans
    }

    pub fn confidence(&self) -> SplitConfidence {
        self.confidence
    }

    /// The single applicable sub-code by precedence.
    pub fn canonical_code(&self) -> Option<CanonicalCode> {
        self.evidence.canonical_code()
    }
}

/// An undecided split: a hint and nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndecidedSplit {
    pub hint: NameHint,
}

/// Outcome of canonical split resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitOutcome {
    Decided(DecidedSplit),
    Undecided(UndecidedSplit),
}

impl SplitOutcome {
    pub fn method(&self) -> SplitMethod {
        match self {
            SplitOutcome::Decided(_) => SplitMethod::PolicyEvidence,
            SplitOutcome::Undecided(_) => SplitMethod::Undecided,
        }
    }

    pub fn is_decided(&self) -> bool {
        matches!(self, SplitOutcome::Decided(_))
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve the canonical split for one coverage name.
///
/// The evidence gate lives here: `policy_spans` absent or empty short-circuits
/// to undecided before any detection runs.
pub fn resolve_split(
    raw_name: &str,
    policy_spans: Option<&[PolicyEvidenceSpanV1]>,
    patterns: &[EvidencePattern],
) -> SplitOutcome {
    let hint = NameHint::from_raw_name(raw_name);

    let Some(spans) = policy_spans else {
        return SplitOutcome::Undecided(UndecidedSplit { hint });
    };
    if spans.is_empty() {
        return SplitOutcome::Undecided(UndecidedSplit { hint });
    }

    // Fold spans left to right so narrowing rules see prior state.
    let mut folded = ScopeEvidence::default();
    for span in spans {
        let Some(typed) = classify_evidence(&span.text, patterns) else {
            continue;
        };
        let mentions = mentioned_subtypes(&span.text);
        folded.apply(typed.evidence_type, &mentions, EvidenceSpanRefV1::from_span(span));
    }

    if !folded.has_contributions() {
        // Spans were supplied but none qualified; that is still no evidence.
        tracing::debug!(raw_name, span_count = spans.len(), "no policy span qualified");
        return SplitOutcome::Undecided(UndecidedSplit { hint });
    }

    SplitOutcome::Decided(DecidedSplit::new(folded))
}

// ============================================================================
// Wire record
// ============================================================================

/// Evidence block attached to a split wire record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitEvidenceV1 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<NameHint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_spans: Option<Vec<EvidenceSpanRefV1>>,
    pub confidence: SplitConfidence,
}

/// Wire record for one split resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalSplitResultV1 {
    pub version: u32,
    pub original_name: String,
    /// Sorted; empty whenever `split_method` is `undecided`.
    pub decided_codes: Vec<CanonicalCode>,
    pub split_method: SplitMethod,
    pub evidence: SplitEvidenceV1,
}

/// Lower a split outcome to its wire record.
pub fn split_to_wire(raw_name: &str, outcome: &SplitOutcome) -> CanonicalSplitResultV1 {
    match outcome {
        SplitOutcome::Decided(decided) => CanonicalSplitResultV1 {
            version: SPLIT_RESULT_VERSION_V1,
            original_name: raw_name.to_string(),
            decided_codes: decided.codes().iter().cloned().collect(),
            split_method: SplitMethod::PolicyEvidence,
            evidence: SplitEvidenceV1 {
                hint: None,
                evidence_spans: Some(decided.evidence_spans().to_vec()),
                confidence: decided.confidence(),
            },
        },
        SplitOutcome::Undecided(undecided) => CanonicalSplitResultV1 {
            version: SPLIT_RESULT_VERSION_V1,
            original_name: raw_name.to_string(),
            decided_codes: Vec::new(),
            split_method: SplitMethod::Undecided,
            evidence: SplitEvidenceV1 {
                hint: Some(undecided.hint),
                evidence_spans: None,
                confidence: SplitConfidence::Unknown,
            },
        },
    }
}
