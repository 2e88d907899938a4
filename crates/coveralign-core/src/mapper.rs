//! Canonical mapper: (scope, raw name) → canonical code.
//!
//! Matching is exact over normalized names within a single insurer scope.
//! There is deliberately no fuzzy fallback and no cross-scope fallback;
//! both are the historical source of false ambiguity in this domain, so the
//! mapper's input boundary only accepts a [`ScopedReference`] that was
//! filtered before matching began.
//!
//! Zero, one, or many candidates map to Unmapped / Mapped / Ambiguous. All
//! three are results for the caller, not errors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{normalize_name, CanonicalCode, CoverageRow, ScopedReference};

pub const MAPPING_REPORT_VERSION_V1: u32 = 1;

/// Match basis recorded on every wire record, so a snapshot diff catches any
/// future change to the matching rule.
pub const MATCH_BASIS_EXACT_NORMALIZED: &str = "exact-normalized";

// ============================================================================
// Outcome
// ============================================================================

/// In-memory mapping outcome. The candidate-count invariants are part of the
/// type: `Mapped` holds exactly one code, `Ambiguous` at least two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingOutcome {
    Mapped { code: CanonicalCode },
    Ambiguous { candidates: Vec<CanonicalCode> },
    Unmapped,
}

impl MappingOutcome {
    /// Build an outcome from a scope-filtered candidate list.
    pub fn from_candidates(mut candidates: Vec<CanonicalCode>) -> Self {
        candidates.sort();
        candidates.dedup();
        match candidates.len() {
            0 => MappingOutcome::Unmapped,
            1 => MappingOutcome::Mapped {
                code: candidates.into_iter().next().expect("one candidate"),
            },
            _ => MappingOutcome::Ambiguous { candidates },
        }
    }

    pub fn status(&self) -> MappingStatus {
        match self {
            MappingOutcome::Mapped { .. } => MappingStatus::Mapped,
            MappingOutcome::Ambiguous { .. } => MappingStatus::Ambiguous,
            MappingOutcome::Unmapped => MappingStatus::Unmapped,
        }
    }
}

/// Wire-level mapping status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingStatus {
    Mapped,
    Ambiguous,
    Unmapped,
}

/// Wire record for one row's mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalMappingV1 {
    pub scope_id: String,
    pub row_ref: String,
    pub status: MappingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_code: Option<CanonicalCode>,
    /// Scope-filtered candidates, sorted. Length agrees with `status`.
    pub candidate_codes: Vec<CanonicalCode>,
    pub basis: String,
}

// ============================================================================
// Mapping
// ============================================================================

/// Map one raw name against one insurer's slice of the reference table.
pub fn map_coverage(reference: &ScopedReference<'_>, raw_name: &str) -> MappingOutcome {
    let normalized = normalize_name(raw_name);
    MappingOutcome::from_candidates(reference.candidates(&normalized))
}

/// Lower an outcome to the wire record for one row.
pub fn mapping_to_wire(
    scope_id: &str,
    row_ref: &str,
    outcome: &MappingOutcome,
) -> CanonicalMappingV1 {
    let (canonical_code, candidate_codes) = match outcome {
        MappingOutcome::Mapped { code } => (Some(code.clone()), vec![code.clone()]),
        MappingOutcome::Ambiguous { candidates } => {
            debug_assert!(candidates.len() >= 2, "ambiguous outcome with <2 candidates");
            (None, candidates.clone())
        }
        MappingOutcome::Unmapped => (None, Vec::new()),
    };

    CanonicalMappingV1 {
        scope_id: scope_id.to_string(),
        row_ref: row_ref.to_string(),
        status: outcome.status(),
        canonical_code,
        candidate_codes,
        basis: MATCH_BASIS_EXACT_NORMALIZED.to_string(),
    }
}

/// Map one [`CoverageRow`] end to end.
pub fn map_coverage_row(
    reference: &ScopedReference<'_>,
    row: &CoverageRow,
) -> CanonicalMappingV1 {
    let outcome = map_coverage(reference, &row.raw_name);
    mapping_to_wire(reference.scope_id(), row.row_ref(), &outcome)
}

// ============================================================================
// Batch report
// ============================================================================

/// Per-scope mapping tallies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeMappingSummaryV1 {
    pub mapped: usize,
    pub ambiguous: usize,
    pub unmapped: usize,
}

/// Result of mapping one batch of universe rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingReportV1 {
    pub version: u32,
    /// ISO-8601 timestamp, filled by the caller; excluded from snapshot
    /// comparison.
    pub generated_at: String,
    pub scopes: BTreeMap<String, ScopeMappingSummaryV1>,
    pub mappings: Vec<CanonicalMappingV1>,
}

/// Map a batch of rows, each against its own scope's reference slice.
///
/// Input order is preserved so the report is byte-stable across runs.
pub fn map_rows(
    snapshot: &crate::ReferenceSnapshot,
    rows: &[CoverageRow],
    generated_at: String,
) -> MappingReportV1 {
    let mut scopes: BTreeMap<String, ScopeMappingSummaryV1> = BTreeMap::new();
    let mut mappings = Vec::with_capacity(rows.len());

    for row in rows {
        let scoped = snapshot.scope(&row.scope_id);
        let mapping = map_coverage_row(&scoped, row);
        let summary = scopes.entry(row.scope_id.clone()).or_default();
        match mapping.status {
            MappingStatus::Mapped => summary.mapped += 1,
            MappingStatus::Ambiguous => summary.ambiguous += 1,
            MappingStatus::Unmapped => summary.unmapped += 1,
        }
        mappings.push(mapping);
    }

    MappingReportV1 {
        version: MAPPING_REPORT_VERSION_V1,
        generated_at,
        scopes,
        mappings,
    }
}
