//! The comparison surface: request in, verdict + explanation out.
//!
//! This is the one place the full chain runs: universe lock → canonical
//! mapping → evidence-gated split resolution → comparison → explanation.
//! The surface owns no state of its own; it borrows the reference snapshot,
//! the policy-span store and the rule tables, and every call is a pure
//! function of those plus the request.
//!
//! `comparison_result` and `next_action` are the only response fields a UI
//! may branch on. `debug` is informational and may be dropped.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use coveralign_core::{
    classify_row, map_coverage_row, LockClass, MetaRowRules, ReferenceSnapshot,
};
use coveralign_evidence::{
    resolve_split, CompareContext, CoverageDecision, EvidencePattern, PolicyEvidenceSpanV1,
};

use crate::{
    compare, explain, CompareOptions, ComparisonAxes, ComparisonResultV1, ExplanationV1,
    FactRowV1, InsurerEvidenceV1, InsurerUniverse, LimitationReasonV1, PrimeState, UniverseRowV1,
};

pub const COMPARE_RESPONSE_VERSION_V1: u32 = 1;

// ============================================================================
// Request / response shapes
// ============================================================================

/// One extracted row plus the proposal facts that ride along with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRowV1 {
    #[serde(flatten)]
    pub row: coveralign_core::CoverageRow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premium: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_term_years: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maturity_years: Option<u32>,
}

impl ExtractedRowV1 {
    pub fn axes(&self) -> ComparisonAxes {
        ComparisonAxes {
            amount: self.row.amount,
            premium: self.premium,
            payment_term_years: self.payment_term_years,
            maturity_years: self.maturity_years,
        }
    }
}

/// Policy spans per insurer scope, as delivered by the policy-document
/// extractor. Read-mostly; swapped atomically by the operator, never edited
/// in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStore {
    pub spans_by_scope: BTreeMap<String, Vec<PolicyEvidenceSpanV1>>,
}

impl PolicyStore {
    pub fn insert(&mut self, scope_id: impl Into<String>, spans: Vec<PolicyEvidenceSpanV1>) {
        self.spans_by_scope.insert(scope_id.into(), spans);
    }

    pub fn spans(&self, scope_id: &str) -> Option<&[PolicyEvidenceSpanV1]> {
        self.spans_by_scope.get(scope_id).map(Vec::as_slice)
    }
}

/// A comparison request from the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareRequestV1 {
    pub query: String,
    pub insurer_a: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurer_b: Option<String>,
    #[serde(default)]
    pub include_policy_evidence: bool,
}

/// What the UI should do next. Closed enumeration; the UI branches on this
/// and on `comparison_result` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    ShowComparison,
    RequestMoreInfo,
    EscalateAmbiguity,
}

/// Informational extras; never branch on this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareDebugV1 {
    pub state_summary: BTreeMap<String, PrimeState>,
    pub effective_query: String,
}

/// The full response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareResponseV1 {
    pub version: u32,
    pub comparison_result: ComparisonResultV1,
    pub next_action: NextAction,
    /// The single matched fact row per insurer, when exactly one matched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_a: Option<FactRowV1>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_b: Option<FactRowV1>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_evidence_a: Option<InsurerEvidenceV1>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_evidence_b: Option<InsurerEvidenceV1>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<CompareDebugV1>,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Everything a comparison request needs, borrowed as read-only snapshots.
pub struct ComparePipeline<'a> {
    pub reference: &'a ReferenceSnapshot,
    pub policy: &'a PolicyStore,
    pub meta_rules: &'a MetaRowRules,
    pub evidence_patterns: &'a [EvidencePattern],
    pub forbidden_phrases: &'a [String],
    pub options: CompareOptions,
}

impl<'a> ComparePipeline<'a> {
    /// Build one insurer's universe slice: lock rows, keep universe
    /// coverage, map each against the insurer's reference slice.
    fn build_universe(&self, scope_id: &str, rows: &[ExtractedRowV1]) -> InsurerUniverse {
        let scoped = self.reference.scope(scope_id);
        let mut seen = std::collections::BTreeSet::new();
        let mut universe_rows = Vec::new();

        for extracted in rows.iter().filter(|r| r.row.scope_id == scope_id) {
            if !seen.insert(extracted.row.content_hash.clone()) {
                continue;
            }
            let (class, _) = classify_row(&extracted.row.raw_name, extracted.row.amount, self.meta_rules);
            if class != LockClass::UniverseCoverage {
                continue;
            }

            let mapping = map_coverage_row(&scoped, &extracted.row);
            universe_rows.push(UniverseRowV1 {
                row_ref: extracted.row.content_hash.clone(),
                coverage_name: extracted.row.raw_name.clone(),
                mapping_status: mapping.status,
                canonical_code: mapping.canonical_code,
                axes: extracted.axes(),
                source_page: extracted.row.source_page,
            });
        }

        InsurerUniverse {
            scope_id: scope_id.to_string(),
            rows: universe_rows,
        }
    }

    /// Resolve canonical splits for every universe row, behind the evidence
    /// gate: scopes without policy spans get undecided hints only.
    fn build_context(&self, universes: &[InsurerUniverse]) -> CompareContext {
        let mut context = CompareContext::default();
        for universe in universes {
            let spans = self.policy.spans(&universe.scope_id);
            for row in &universe.rows {
                let outcome = resolve_split(&row.coverage_name, spans, self.evidence_patterns);
                context.insert(CoverageDecision::from_split(
                    &universe.scope_id,
                    &row.coverage_name,
                    &outcome,
                ));
            }
        }
        context
    }

    /// Run the full chain for one request.
    pub fn handle(
        &self,
        request: &CompareRequestV1,
        rows: &[ExtractedRowV1],
    ) -> Result<CompareResponseV1> {
        let mut scopes = vec![request.insurer_a.clone()];
        if let Some(insurer_b) = &request.insurer_b {
            scopes.push(insurer_b.clone());
        }

        let universes: Vec<InsurerUniverse> = scopes
            .iter()
            .map(|scope| self.build_universe(scope, rows))
            .collect();
        let context = self.build_context(&universes);

        let result = compare(&universes, &request.query, &context, &self.options);
        let explanation = explain(&result, self.forbidden_phrases)
            .context("explanation failed template-safety validation")?;

        let next_action = select_next_action(&result);

        let coverage_a = single_fact_row(&result, &request.insurer_a);
        let coverage_b = request
            .insurer_b
            .as_deref()
            .and_then(|insurer| single_fact_row(&result, insurer));

        let (policy_evidence_a, policy_evidence_b) = if request.include_policy_evidence {
            (
                result.evidence_block.insurers.get(&request.insurer_a).cloned(),
                request
                    .insurer_b
                    .as_deref()
                    .and_then(|insurer| result.evidence_block.insurers.get(insurer).cloned()),
            )
        } else {
            (None, None)
        };

        let message = render_message(&explanation);
        let debug = Some(CompareDebugV1 {
            state_summary: result.state_summary.clone(),
            effective_query: result.effective_query.clone(),
        });

        Ok(CompareResponseV1 {
            version: COMPARE_RESPONSE_VERSION_V1,
            comparison_result: result,
            next_action,
            coverage_a,
            coverage_b,
            policy_evidence_a,
            policy_evidence_b,
            message,
            debug,
        })
    }
}

fn single_fact_row(result: &ComparisonResultV1, insurer: &str) -> Option<FactRowV1> {
    let mut rows = result.table.iter().filter(|row| row.insurer == insurer);
    let first = rows.next()?;
    // More than one match: no selection is permitted, so no single row.
    rows.next().is_none().then(|| first.clone())
}

/// Pick the UI's next action from the verdict alone.
fn select_next_action(result: &ComparisonResultV1) -> NextAction {
    if !result.comparison_possible {
        return NextAction::RequestMoreInfo;
    }
    if result
        .state_summary
        .values()
        .any(|state| *state == PrimeState::InUniverseComparable)
    {
        return NextAction::ShowComparison;
    }
    let has_ambiguity = result.limitation_reasons.iter().any(|reason| {
        matches!(
            reason,
            LimitationReasonV1::UnmappedPresent { .. }
                | LimitationReasonV1::MultipleCandidatesNoInference { .. }
        )
    });
    if has_ambiguity {
        NextAction::EscalateAmbiguity
    } else {
        NextAction::ShowComparison
    }
}

fn render_message(explanation: &ExplanationV1) -> String {
    let mut lines = vec![explanation.summary.clone()];
    lines.extend(explanation.per_insurer.values().cloned());
    lines.join("\n")
}
