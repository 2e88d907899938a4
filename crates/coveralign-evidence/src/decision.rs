//! Per-coverage canonical decisions and the comparison choke point.
//!
//! A coverage accumulates two very different kinds of canonical codes:
//! *recalled* codes (gestured at by the name alone) and *decided* codes
//! (backed by policy evidence). Comparisons may only ever see the decided
//! side, and only when the decision status is DECIDED. That single accessor,
//! [`CoverageDecision::codes_for_compare`], is the choke point that keeps
//! hinted candidates out of financial comparisons.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use coveralign_core::CanonicalCode;

use crate::{EvidenceSpanRefV1, NameHint, SplitOutcome};

/// Whether a coverage's canonical split has been decided by evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Decided,
    Undecided,
}

/// Canonical-code decision for one (coverage, insurer) pair.
///
/// Fields are private so the only way to read codes out of a decision is
/// through the status-checked accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageDecision {
    scope_id: String,
    coverage_name: String,
    status: DecisionStatus,
    /// Name-hinted candidates. Advisory; shown to administrators, never
    /// compared.
    recalled_codes: BTreeSet<CanonicalCode>,
    /// Evidence-backed codes. Populated only when `status` is `Decided`.
    decided_codes: BTreeSet<CanonicalCode>,
    /// Spans that backed the decision. Empty iff `status` is `Undecided`.
    evidence_spans: Vec<EvidenceSpanRefV1>,
}

impl CoverageDecision {
    /// Build a decision from a split outcome. The split's own gate already
    /// guarantees decided codes exist only behind policy evidence.
    pub fn from_split(
        scope_id: impl Into<String>,
        coverage_name: impl Into<String>,
        outcome: &SplitOutcome,
    ) -> Self {
        let coverage_name = coverage_name.into();
        match outcome {
            SplitOutcome::Decided(decided) => CoverageDecision {
                scope_id: scope_id.into(),
                recalled_codes: NameHint::from_raw_name(&coverage_name).recalled_codes(),
                coverage_name,
                status: DecisionStatus::Decided,
                decided_codes: decided.codes().clone(),
                evidence_spans: decided.evidence_spans().to_vec(),
            },
            SplitOutcome::Undecided(undecided) => CoverageDecision {
                scope_id: scope_id.into(),
                recalled_codes: undecided.hint.recalled_codes(),
                coverage_name,
                status: DecisionStatus::Undecided,
                decided_codes: BTreeSet::new(),
                evidence_spans: Vec::new(),
            },
        }
    }

    pub fn scope_id(&self) -> &str {
        &self.scope_id
    }

    pub fn coverage_name(&self) -> &str {
        &self.coverage_name
    }

    pub fn status(&self) -> DecisionStatus {
        self.status
    }

    /// Advisory candidates for administrator review.
    pub fn recalled_codes(&self) -> &BTreeSet<CanonicalCode> {
        &self.recalled_codes
    }

    /// Spans that backed a decided split; empty when undecided.
    pub fn evidence_spans(&self) -> &[EvidenceSpanRefV1] {
        &self.evidence_spans
    }

    /// Codes a comparison is allowed to use: the decided set when DECIDED,
    /// otherwise empty. Never falls back to recalled codes.
    pub fn codes_for_compare(&self) -> BTreeSet<CanonicalCode> {
        match self.status {
            DecisionStatus::Decided => self.decided_codes.clone(),
            DecisionStatus::Undecided => BTreeSet::new(),
        }
    }
}

/// All canonical decisions available to one comparison request, keyed by
/// (scope, normalized coverage name).
#[derive(Debug, Clone, Default)]
pub struct CompareContext {
    decisions: BTreeMap<(String, String), CoverageDecision>,
}

impl CompareContext {
    pub fn insert(&mut self, decision: CoverageDecision) {
        let key = (
            decision.scope_id().to_string(),
            coveralign_core::normalize_name(decision.coverage_name()),
        );
        self.decisions.insert(key, decision);
    }

    pub fn decision(&self, scope_id: &str, coverage_name: &str) -> Option<&CoverageDecision> {
        let key = (
            scope_id.to_string(),
            coveralign_core::normalize_name(coverage_name),
        );
        self.decisions.get(&key)
    }

    /// Comparison-safe codes for one coverage; empty when unknown or
    /// undecided.
    pub fn codes_for_compare(&self, scope_id: &str, coverage_name: &str) -> BTreeSet<CanonicalCode> {
        self.decision(scope_id, coverage_name)
            .map(|d| d.codes_for_compare())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }
}
