//! Explanation layer: comparison verdicts → fixed, auditable text.
//!
//! Every PRIME state renders through exactly one template per insurer,
//! parameterized only by facts the engine already computed. The rendered
//! output is then validated against a deny list of evaluative phrases; a hit
//! is a hard failure that blocks the output. Template authors are not
//! trusted; the validator is the guarantee.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::{ComparisonResultV1, FactRowV1, LimitationReasonV1, PrimeState};

pub const EXPLANATION_VERSION_V1: u32 = 1;

/// Rendered explanation for one comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplanationV1 {
    pub version: u32,
    /// One rendered template per insurer, keyed by scope id.
    pub per_insurer: BTreeMap<String, String>,
    /// One-line factual summary of the whole verdict.
    pub summary: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExplainError {
    /// A rendered message contained an evaluative phrase from the deny list.
    #[error("explanation for `{insurer}` contains forbidden phrase `{phrase}`")]
    ForbiddenPhrase { insurer: String, phrase: String },
}

/// Evaluative phrases that must never appear in rendered output. The
/// comparison states facts; judgment belongs to the reader.
pub fn default_forbidden_phrases() -> Vec<String> {
    [
        "practically the same",
        "essentially the same",
        "recommended",
        "we recommend",
        "more favorable",
        "less favorable",
        "better deal",
        "best choice",
        "superior",
        "inferior",
        "you should choose",
        "clearly better",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

// ============================================================================
// Templates
// ============================================================================

fn axes_phrase(row: &FactRowV1) -> String {
    let missing = row.axes.missing();
    if missing.is_empty() {
        "amount, premium, payment term and maturity are all on record".to_string()
    } else {
        format!("missing: {}", missing.join(", "))
    }
}

fn render_insurer(
    insurer: &str,
    state: PrimeState,
    query: &str,
    rows: &[&FactRowV1],
) -> String {
    match state {
        PrimeState::InUniverseComparable => {
            let row = rows.first().expect("comparable state has a row");
            let code = row
                .canonical_code
                .as_ref()
                .map(|c| c.as_str().to_string())
                .unwrap_or_else(|| "-".to_string());
            format!(
                "{insurer}: `{name}` is in the comparison universe (canonical code {code}); {axes}.",
                name = row.coverage_name,
                axes = axes_phrase(row),
            )
        }
        PrimeState::InUniverseWithGaps => {
            if rows.len() >= 2 {
                format!(
                    "{insurer}: {count} rows match `{query}`; no single row was selected, all are listed as facts.",
                    count = rows.len(),
                )
            } else {
                let row = rows.first().expect("gap state has a row");
                format!(
                    "{insurer}: `{name}` is in the comparison universe but {axes}.",
                    name = row.coverage_name,
                    axes = axes_phrase(row),
                )
            }
        }
        PrimeState::InUniverseUnmapped => {
            let row = rows.first().expect("unmapped state has a row");
            format!(
                "{insurer}: `{name}` is in the comparison universe but has no canonical mapping; the comparison is withheld pending mapping review.",
                name = row.coverage_name,
            )
        }
        PrimeState::OutOfUniverse => {
            format!("{insurer}: no universe row matches `{query}`.")
        }
    }
}

fn render_summary(result: &ComparisonResultV1) -> String {
    let variant_note = result
        .limitation_reasons
        .iter()
        .find_map(|r| match r {
            LimitationReasonV1::QueryVariantApplied { variant } => {
                Some(format!(" Query matched via whitespace variant `{variant}`."))
            }
            _ => None,
        })
        .unwrap_or_default();

    if result.comparison_possible {
        format!(
            "Comparison for `{query}`: {rows} fact row(s), {reasons} limitation reason(s).{variant_note}",
            query = result.effective_query,
            rows = result.table.len(),
            reasons = result.limitation_reasons.len(),
        )
    } else {
        format!(
            "No insurer has `{query}` in its comparison universe; more information is needed.{variant_note}",
            query = result.effective_query,
        )
    }
}

// ============================================================================
// Rendering + validation
// ============================================================================

/// Validate rendered text against the deny list. Case-insensitive substring
/// match; the first hit fails the whole explanation.
pub fn validate_phrases(
    insurer: &str,
    text: &str,
    forbidden: &[String],
) -> Result<(), ExplainError> {
    let lower = text.to_lowercase();
    for phrase in forbidden {
        if lower.contains(&phrase.to_lowercase()) {
            return Err(ExplainError::ForbiddenPhrase {
                insurer: insurer.to_string(),
                phrase: phrase.clone(),
            });
        }
    }
    Ok(())
}

/// Render one fixed template per insurer and validate every message.
pub fn explain(
    result: &ComparisonResultV1,
    forbidden: &[String],
) -> Result<ExplanationV1, ExplainError> {
    let mut per_insurer = BTreeMap::new();

    for (insurer, state) in &result.state_summary {
        let rows: Vec<&FactRowV1> = result
            .table
            .iter()
            .filter(|row| &row.insurer == insurer)
            .collect();
        let message = render_insurer(insurer, *state, &result.effective_query, &rows);
        validate_phrases(insurer, &message, forbidden)?;
        per_insurer.insert(insurer.clone(), message);
    }

    let summary = render_summary(result);
    validate_phrases("summary", &summary, forbidden)?;

    Ok(ExplanationV1 {
        version: EXPLANATION_VERSION_V1,
        per_insurer,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compare, CompareOptions, ComparisonAxes, InsurerUniverse, UniverseRowV1};
    use coveralign_core::{CanonicalCode, MappingStatus};
    use coveralign_evidence::CompareContext;

    fn result_for(rows: Vec<(&str, Vec<UniverseRowV1>)>, query: &str) -> ComparisonResultV1 {
        let universes: Vec<InsurerUniverse> = rows
            .into_iter()
            .map(|(scope, rows)| InsurerUniverse {
                scope_id: scope.to_string(),
                rows,
            })
            .collect();
        compare(
            &universes,
            query,
            &CompareContext::default(),
            &CompareOptions::default(),
        )
    }

    fn row(name: &str, status: MappingStatus, axes: ComparisonAxes) -> UniverseRowV1 {
        UniverseRowV1 {
            row_ref: format!("ref::{name}"),
            coverage_name: name.to_string(),
            mapping_status: status,
            canonical_code: matches!(status, MappingStatus::Mapped)
                .then(|| CanonicalCode::new("CA-GEN-DX")),
            axes,
            source_page: 4,
        }
    }

    fn complete_axes() -> ComparisonAxes {
        ComparisonAxes {
            amount: Some(10),
            premium: Some(10),
            payment_term_years: Some(10),
            maturity_years: Some(10),
        }
    }

    #[test]
    fn every_state_renders_and_passes_the_deny_list() {
        let result = result_for(
            vec![
                ("ins_a", vec![row("cancer diagnosis benefit", MappingStatus::Mapped, complete_axes())]),
                ("ins_b", vec![row("cancer diagnosis benefit", MappingStatus::Mapped, ComparisonAxes::default())]),
                ("ins_c", vec![row("cancer diagnosis benefit", MappingStatus::Unmapped, complete_axes())]),
                ("ins_d", Vec::new()),
            ],
            "cancer diagnosis benefit",
        );

        let explanation = explain(&result, &default_forbidden_phrases()).expect("valid");
        assert_eq!(explanation.per_insurer.len(), 4);
        assert!(explanation.per_insurer["ins_a"].contains("CA-GEN-DX"));
        assert!(explanation.per_insurer["ins_b"].contains("missing"));
        assert!(explanation.per_insurer["ins_c"].contains("no canonical mapping"));
        assert!(explanation.per_insurer["ins_d"].contains("no universe row"));
    }

    #[test]
    fn multi_candidate_state_reports_counts_never_a_selection() {
        let result = result_for(
            vec![(
                "ins_a",
                vec![
                    row("cancer diagnosis benefit", MappingStatus::Mapped, complete_axes()),
                    row("similar cancer diagnosis benefit", MappingStatus::Mapped, complete_axes()),
                ],
            )],
            "cancer diagnosis benefit",
        );

        let explanation = explain(&result, &default_forbidden_phrases()).expect("valid");
        assert!(explanation.per_insurer["ins_a"].contains("2 rows match"));
        assert!(explanation.per_insurer["ins_a"].contains("no single row was selected"));
    }

    #[test]
    fn forbidden_phrase_is_a_hard_failure() {
        let result = result_for(
            vec![("ins_a", vec![row("cancer diagnosis benefit", MappingStatus::Mapped, complete_axes())])],
            "cancer diagnosis benefit",
        );

        // A poisoned deny list entry that matches our own template proves the
        // validator fires on output, not on intent.
        let deny = vec!["comparison universe".to_string()];
        let err = explain(&result, &deny).unwrap_err();
        assert!(matches!(err, ExplainError::ForbiddenPhrase { .. }));
    }

    #[test]
    fn validation_is_case_insensitive() {
        let err = validate_phrases("ins_a", "This one is RECOMMENDED.", &default_forbidden_phrases())
            .unwrap_err();
        assert_eq!(
            err,
            ExplainError::ForbiddenPhrase {
                insurer: "ins_a".to_string(),
                phrase: "recommended".to_string(),
            }
        );
    }

    #[test]
    fn summary_counts_facts_not_judgments() {
        let result = result_for(
            vec![("ins_a", Vec::new()), ("ins_b", Vec::new())],
            "flood damage benefit",
        );
        let explanation = explain(&result, &default_forbidden_phrases()).expect("valid");
        assert!(explanation.summary.contains("more information is needed"));
    }
}
