//! The comparison engine.
//!
//! For each insurer the engine classifies the (query, universe) pair into
//! one of four states:
//!
//! - `in_universe_comparable`: exactly one matching row, mapped, all four
//!   comparison axes on record,
//! - `in_universe_with_gaps`: matching row(s) exist but an axis is missing,
//!   or more than one row matches (selection among candidates is banned),
//! - `in_universe_unmapped`: exactly one matching row but no canonical
//!   mapping,
//! - `out_of_universe`: nothing matches.
//!
//! When *every* insurer is out of universe, a deterministic query-variant
//! step may retry with a whitespace-inserted form of the query built from a
//! fixed suffix list. The first variant with any in-universe hit wins and is
//! annotated with a fixed limitation reason. No synonym or semantic
//! expansion happens at any point.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use coveralign_core::{normalize_name, CanonicalCode, MappingStatus};
use coveralign_evidence::CompareContext;

pub const COMPARISON_RESULT_VERSION_V1: u32 = 1;

/// Fixed suffix list for the query-variant retry. Inserting a space before
/// (or inside) one of these is the only transform the engine may apply.
pub const QUERY_VARIANT_SUFFIXES: &[&str] = &[
    "diagnosis benefit",
    "surgery benefit",
    "hospitalization benefit",
];

// ============================================================================
// Inputs
// ============================================================================

/// The four core comparison axes. A comparable verdict requires all four.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonAxes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premium: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_term_years: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maturity_years: Option<u32>,
}

impl ComparisonAxes {
    /// Missing axis names, in fixed order.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.amount.is_none() {
            out.push("amount");
        }
        if self.premium.is_none() {
            out.push("premium");
        }
        if self.payment_term_years.is_none() {
            out.push("payment_term");
        }
        if self.maturity_years.is_none() {
            out.push("maturity");
        }
        out
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}

/// One universe row as the engine sees it: the locked coverage line plus its
/// mapping and axes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseRowV1 {
    pub row_ref: String,
    pub coverage_name: String,
    pub mapping_status: MappingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_code: Option<CanonicalCode>,
    pub axes: ComparisonAxes,
    pub source_page: u32,
}

/// One insurer's universe slice for a comparison request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsurerUniverse {
    pub scope_id: String,
    pub rows: Vec<UniverseRowV1>,
}

/// Engine options. Defaults match production behavior.
#[derive(Debug, Clone)]
pub struct CompareOptions {
    /// Allow the whitespace-insertion retry when every insurer is out of
    /// universe.
    pub enable_query_variants: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        CompareOptions {
            enable_query_variants: true,
        }
    }
}

// ============================================================================
// Outputs
// ============================================================================

/// Per-(query, insurer) comparison state. Recomputed fresh each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimeState {
    InUniverseComparable,
    InUniverseWithGaps,
    InUniverseUnmapped,
    OutOfUniverse,
}

/// Machine-readable reason why a comparison is limited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum LimitationReasonV1 {
    /// `count` matched rows have no canonical mapping.
    UnmappedPresent { count: usize },
    /// These insurers had two or more matching rows; no row was selected.
    MultipleCandidatesNoInference { insurers: Vec<String> },
    /// This insurer's single matching row is missing comparison axes.
    MissingAxes {
        insurer: String,
        axes: Vec<String>,
    },
    /// These insurers had no matching universe row.
    OutOfUniverse { insurers: Vec<String> },
    /// The whitespace-insertion retry produced the hits; the original query
    /// matched nothing anywhere.
    QueryVariantApplied { variant: String },
}

/// One fact row in the comparison table. Facts only, no judgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactRowV1 {
    pub insurer: String,
    pub coverage_name: String,
    pub mapping_status: MappingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_code: Option<CanonicalCode>,
    pub axes: ComparisonAxes,
    pub source_page: u32,
}

/// Evidence attached to the comparison for one insurer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsurerEvidenceV1 {
    pub decision_status: coveralign_evidence::DecisionStatus,
    pub decided_codes: Vec<CanonicalCode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_spans: Vec<coveralign_evidence::EvidenceSpanRefV1>,
}

/// Per-insurer evidence block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceBlockV1 {
    pub insurers: BTreeMap<String, InsurerEvidenceV1>,
}

/// The full comparison verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonResultV1 {
    pub version: u32,
    /// The query actually used for matching (the variant, if one applied).
    pub effective_query: String,
    pub table: Vec<FactRowV1>,
    pub comparison_possible: bool,
    pub limitation_reasons: Vec<LimitationReasonV1>,
    pub evidence_block: EvidenceBlockV1,
    pub state_summary: BTreeMap<String, PrimeState>,
}

// ============================================================================
// Matching
// ============================================================================

fn matching_rows<'a>(universe: &'a InsurerUniverse, normalized_query: &str) -> Vec<&'a UniverseRowV1> {
    universe
        .rows
        .iter()
        .filter(|row| normalize_name(&row.coverage_name).contains(normalized_query))
        .collect()
}

fn classify_insurer(hits: &[&UniverseRowV1]) -> PrimeState {
    match hits {
        [] => PrimeState::OutOfUniverse,
        [row] => {
            if row.mapping_status == MappingStatus::Unmapped {
                PrimeState::InUniverseUnmapped
            } else if row.axes.is_complete() {
                PrimeState::InUniverseComparable
            } else {
                PrimeState::InUniverseWithGaps
            }
        }
        // Two or more candidates: selection is banned, gaps are forced.
        _ => PrimeState::InUniverseWithGaps,
    }
}

/// Deterministic whitespace-inserted variants of a normalized query, in
/// fixed suffix-list order. Two forms per suffix: a space inserted before
/// the suffix ("cancerdiagnosis benefit" stays as-is, "cancer diagnosis
/// benefit" glued to the prior word gets split), and the suffix's own
/// internal space restored ("diagnosisbenefit" → "diagnosis benefit").
pub fn query_variants(normalized_query: &str) -> Vec<String> {
    let mut variants = Vec::new();

    for suffix in QUERY_VARIANT_SUFFIXES {
        // "…xdiagnosis benefit" → "…x diagnosis benefit"
        if let Some(prefix) = normalized_query.strip_suffix(suffix) {
            if !prefix.is_empty() && !prefix.ends_with(' ') {
                variants.push(format!("{} {}", prefix, suffix));
            }
        }

        // "…diagnosisbenefit" → "… diagnosis benefit"
        let fused: String = suffix.split_whitespace().collect();
        if let Some(prefix) = normalized_query.strip_suffix(&fused) {
            let variant = if prefix.is_empty() || prefix.ends_with(' ') {
                format!("{}{}", prefix, suffix)
            } else {
                format!("{} {}", prefix, suffix)
            };
            variants.push(variant);
        }
    }

    variants.retain(|v| v != normalized_query);
    variants.dedup();
    variants
}

// ============================================================================
// Comparison
// ============================================================================

/// Compare a query across insurers. Pure: same inputs, same verdict.
pub fn compare(
    universes: &[InsurerUniverse],
    query: &str,
    context: &CompareContext,
    options: &CompareOptions,
) -> ComparisonResultV1 {
    let normalized = normalize_name(query);

    let (effective_query, variant_applied) = {
        let original_hits: usize = universes
            .iter()
            .map(|u| matching_rows(u, &normalized).len())
            .sum();

        if original_hits > 0 || !options.enable_query_variants {
            (normalized.clone(), None)
        } else {
            // All insurers out of universe: try the fixed variant list.
            let mut chosen = None;
            for variant in query_variants(&normalized) {
                let hits: usize = universes
                    .iter()
                    .map(|u| matching_rows(u, &variant).len())
                    .sum();
                if hits > 0 {
                    chosen = Some(variant);
                    break;
                }
            }
            match chosen {
                Some(variant) => (variant.clone(), Some(variant)),
                None => (normalized.clone(), None),
            }
        }
    };

    let mut table = Vec::new();
    let mut state_summary = BTreeMap::new();
    let mut unmapped_count = 0usize;
    let mut multi_candidate_insurers = Vec::new();
    let mut missing_axes: Vec<(String, Vec<String>)> = Vec::new();
    let mut out_of_universe_insurers = Vec::new();
    let mut evidence_block = EvidenceBlockV1::default();

    for universe in universes {
        let hits = matching_rows(universe, &effective_query);
        let state = classify_insurer(&hits);
        tracing::debug!(
            scope = %universe.scope_id,
            hits = hits.len(),
            ?state,
            "classified insurer"
        );
        state_summary.insert(universe.scope_id.clone(), state);

        match state {
            PrimeState::OutOfUniverse => {
                out_of_universe_insurers.push(universe.scope_id.clone());
            }
            PrimeState::InUniverseUnmapped => {
                unmapped_count += 1;
            }
            PrimeState::InUniverseWithGaps if hits.len() >= 2 => {
                multi_candidate_insurers.push(universe.scope_id.clone());
                unmapped_count += hits
                    .iter()
                    .filter(|r| r.mapping_status == MappingStatus::Unmapped)
                    .count();
            }
            PrimeState::InUniverseWithGaps => {
                let axes = hits[0]
                    .axes
                    .missing()
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                missing_axes.push((universe.scope_id.clone(), axes));
            }
            PrimeState::InUniverseComparable => {}
        }

        // Every hit goes into the table; the engine never selects among
        // them. Where a canonical decision exists for a hit, its
        // evidence-backed facts ride along in the evidence block.
        for row in &hits {
            table.push(FactRowV1 {
                insurer: universe.scope_id.clone(),
                coverage_name: row.coverage_name.clone(),
                mapping_status: row.mapping_status,
                canonical_code: row.canonical_code.clone(),
                axes: row.axes,
                source_page: row.source_page,
            });

            if let Some(decision) = context.decision(&universe.scope_id, &row.coverage_name) {
                evidence_block
                    .insurers
                    .entry(universe.scope_id.clone())
                    .or_insert_with(|| InsurerEvidenceV1 {
                        decision_status: decision.status(),
                        decided_codes: decision.codes_for_compare().into_iter().collect(),
                        evidence_spans: decision.evidence_spans().to_vec(),
                    });
            }
        }
    }

    let comparison_possible = state_summary
        .values()
        .any(|state| *state != PrimeState::OutOfUniverse);

    // Fixed emission order keeps the reason list byte-stable across runs.
    let mut limitation_reasons = Vec::new();
    if unmapped_count > 0 {
        limitation_reasons.push(LimitationReasonV1::UnmappedPresent {
            count: unmapped_count,
        });
    }
    if !multi_candidate_insurers.is_empty() {
        multi_candidate_insurers.sort();
        limitation_reasons.push(LimitationReasonV1::MultipleCandidatesNoInference {
            insurers: multi_candidate_insurers,
        });
    }
    missing_axes.sort_by(|a, b| a.0.cmp(&b.0));
    for (insurer, axes) in missing_axes {
        limitation_reasons.push(LimitationReasonV1::MissingAxes { insurer, axes });
    }
    if !out_of_universe_insurers.is_empty() {
        out_of_universe_insurers.sort();
        limitation_reasons.push(LimitationReasonV1::OutOfUniverse {
            insurers: out_of_universe_insurers,
        });
    }
    if let Some(variant) = variant_applied {
        limitation_reasons.push(LimitationReasonV1::QueryVariantApplied { variant });
    }

    ComparisonResultV1 {
        version: COMPARISON_RESULT_VERSION_V1,
        effective_query,
        table,
        comparison_possible,
        limitation_reasons,
        evidence_block,
        state_summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, status: MappingStatus, axes: ComparisonAxes) -> UniverseRowV1 {
        UniverseRowV1 {
            row_ref: format!("ref::{name}"),
            coverage_name: name.to_string(),
            mapping_status: status,
            canonical_code: match status {
                MappingStatus::Mapped => Some(CanonicalCode::new("CA-GEN-DX")),
                _ => None,
            },
            axes,
            source_page: 1,
        }
    }

    fn complete_axes() -> ComparisonAxes {
        ComparisonAxes {
            amount: Some(30_000_000),
            premium: Some(12_000),
            payment_term_years: Some(20),
            maturity_years: Some(80),
        }
    }

    fn universe(scope: &str, rows: Vec<UniverseRowV1>) -> InsurerUniverse {
        InsurerUniverse {
            scope_id: scope.to_string(),
            rows,
        }
    }

    #[test]
    fn two_mapped_complete_insurers_are_comparable_with_no_reasons() {
        let universes = vec![
            universe(
                "ins_a",
                vec![row("general cancer diagnosis benefit", MappingStatus::Mapped, complete_axes())],
            ),
            universe(
                "ins_b",
                vec![row("general cancer diagnosis benefit", MappingStatus::Mapped, complete_axes())],
            ),
        ];

        let result = compare(
            &universes,
            "general cancer diagnosis benefit",
            &CompareContext::default(),
            &CompareOptions::default(),
        );

        assert!(result.comparison_possible);
        assert!(result.limitation_reasons.is_empty());
        assert_eq!(result.state_summary["ins_a"], PrimeState::InUniverseComparable);
        assert_eq!(result.state_summary["ins_b"], PrimeState::InUniverseComparable);
        assert_eq!(result.table.len(), 2);
    }

    #[test]
    fn two_matching_rows_force_gaps_and_a_no_inference_reason() {
        let universes = vec![universe(
            "ins_a",
            vec![
                row("cancer diagnosis benefit", MappingStatus::Mapped, complete_axes()),
                row("similar cancer diagnosis benefit", MappingStatus::Mapped, complete_axes()),
            ],
        )];

        let result = compare(
            &universes,
            "cancer diagnosis benefit",
            &CompareContext::default(),
            &CompareOptions::default(),
        );

        assert_eq!(result.state_summary["ins_a"], PrimeState::InUniverseWithGaps);
        assert!(result
            .limitation_reasons
            .iter()
            .any(|r| matches!(r, LimitationReasonV1::MultipleCandidatesNoInference { insurers }
                if insurers == &vec!["ins_a".to_string()])));
        // Both rows are in the table; neither was chosen.
        assert_eq!(result.table.len(), 2);
    }

    #[test]
    fn unmapped_single_hit_is_reported_not_compared() {
        let universes = vec![universe(
            "ins_a",
            vec![row("mystery rider benefit", MappingStatus::Unmapped, complete_axes())],
        )];

        let result = compare(
            &universes,
            "mystery rider",
            &CompareContext::default(),
            &CompareOptions::default(),
        );

        assert_eq!(result.state_summary["ins_a"], PrimeState::InUniverseUnmapped);
        assert!(result
            .limitation_reasons
            .iter()
            .any(|r| matches!(r, LimitationReasonV1::UnmappedPresent { count: 1 })));
    }

    #[test]
    fn missing_axes_are_named_in_fixed_order() {
        let axes = ComparisonAxes {
            amount: Some(1),
            premium: None,
            payment_term_years: None,
            maturity_years: Some(80),
        };
        let universes = vec![universe(
            "ins_a",
            vec![row("cancer diagnosis benefit", MappingStatus::Mapped, axes)],
        )];

        let result = compare(
            &universes,
            "cancer diagnosis benefit",
            &CompareContext::default(),
            &CompareOptions::default(),
        );

        assert_eq!(result.state_summary["ins_a"], PrimeState::InUniverseWithGaps);
        assert!(result.limitation_reasons.iter().any(|r| matches!(
            r,
            LimitationReasonV1::MissingAxes { insurer, axes }
                if insurer == "ins_a" && axes == &vec!["premium".to_string(), "payment_term".to_string()]
        )));
    }

    #[test]
    fn absent_coverage_is_out_of_universe_and_blocks_comparison_when_universal() {
        let universes = vec![
            universe("ins_a", vec![row("fire damage benefit", MappingStatus::Mapped, complete_axes())]),
            universe("ins_b", Vec::new()),
        ];

        let result = compare(
            &universes,
            "flood damage benefit",
            &CompareContext::default(),
            &CompareOptions { enable_query_variants: false },
        );

        assert!(!result.comparison_possible);
        assert_eq!(result.state_summary["ins_a"], PrimeState::OutOfUniverse);
        assert_eq!(result.state_summary["ins_b"], PrimeState::OutOfUniverse);
        assert!(result.table.is_empty());
    }

    #[test]
    fn variant_retry_runs_only_when_everything_is_out_of_universe() {
        let universes = vec![universe(
            "ins_a",
            vec![row("general cancer diagnosis benefit", MappingStatus::Mapped, complete_axes())],
        )];

        // Fused suffix: no direct hit, the variant restores the space.
        let result = compare(
            &universes,
            "general cancer diagnosisbenefit",
            &CompareContext::default(),
            &CompareOptions::default(),
        );

        assert!(result.comparison_possible);
        assert_eq!(result.effective_query, "general cancer diagnosis benefit");
        assert!(result
            .limitation_reasons
            .iter()
            .any(|r| matches!(r, LimitationReasonV1::QueryVariantApplied { variant }
                if variant == "general cancer diagnosis benefit")));
    }

    #[test]
    fn variant_retry_never_preempts_a_direct_hit() {
        // ins_a matches the raw query; the variant step must not run even
        // though a variant would also match.
        let universes = vec![universe(
            "ins_a",
            vec![
                row("general cancer diagnosisbenefit", MappingStatus::Mapped, complete_axes()),
                row("general cancer diagnosis benefit", MappingStatus::Mapped, complete_axes()),
            ],
        )];

        let result = compare(
            &universes,
            "general cancer diagnosisbenefit",
            &CompareContext::default(),
            &CompareOptions::default(),
        );

        assert_eq!(result.effective_query, "general cancer diagnosisbenefit");
        assert!(!result
            .limitation_reasons
            .iter()
            .any(|r| matches!(r, LimitationReasonV1::QueryVariantApplied { .. })));
    }

    #[test]
    fn query_variants_are_deterministic_and_suffix_bound() {
        assert_eq!(
            query_variants("general cancer diagnosisbenefit"),
            vec!["general cancer diagnosis benefit".to_string()]
        );
        assert_eq!(
            query_variants("cancer surgerybenefit"),
            vec!["cancer surgery benefit".to_string()]
        );
        // No suffix involved: no variants at all.
        assert!(query_variants("whole life annuity").is_empty());
    }

    proptest::proptest! {
        // Variants stay inside the suffix-bound transform: every variant
        // still ends with a listed suffix and is already normalized.
        #[test]
        fn variants_are_suffix_bound_and_normalized(query in "[a-z ]{0,40}") {
            let normalized = coveralign_core::normalize_name(&query);
            for variant in query_variants(&normalized) {
                proptest::prop_assert!(QUERY_VARIANT_SUFFIXES
                    .iter()
                    .any(|suffix| variant.ends_with(suffix)));
                proptest::prop_assert_eq!(coveralign_core::normalize_name(&variant), variant.clone());
                proptest::prop_assert_ne!(variant, normalized.clone());
            }
        }
    }

    #[test]
    fn repeated_runs_are_byte_identical() {
        let universes = vec![
            universe(
                "ins_a",
                vec![
                    row("cancer diagnosis benefit", MappingStatus::Mapped, complete_axes()),
                    row("similar cancer diagnosis benefit", MappingStatus::Unmapped, ComparisonAxes::default()),
                ],
            ),
            universe("ins_b", Vec::new()),
        ];

        let run = || {
            serde_json::to_string(&compare(
                &universes,
                "cancer diagnosis benefit",
                &CompareContext::default(),
                &CompareOptions::default(),
            ))
            .expect("json")
        };
        assert_eq!(run(), run());
    }
}
