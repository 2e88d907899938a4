//! Row classifier: the "universe lock".
//!
//! Every raw extracted row is labeled before anything downstream may touch
//! it. The label decides whether a row belongs to the *universe* (the set of
//! genuine, comparable coverage line items) or is table furniture (totals,
//! customer-info headers, payment schedules) that must never be compared.
//!
//! The classification is a total, priority-ordered function of
//! `(raw_name, amount presence)` alone. It never looks at a second row and
//! never consults semantic content, so two runs over the same batch always
//! produce the same labels.

use serde::{Deserialize, Serialize};

use crate::{normalize_name, CoverageRow};
use std::collections::BTreeMap;

pub const UNIVERSE_REPORT_VERSION_V1: u32 = 1;

/// Universe-lock label for one raw row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockClass {
    /// A genuine coverage line item; eligible for mapping and comparison.
    UniverseCoverage,
    /// Table meta content (totals, headers, customer info); never compared.
    NonUniverseMeta,
    /// A named row without an amount; parked for human review.
    Unclassified,
}

/// One classification per row per processing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockClassificationV1 {
    /// `content_hash` of the classified row.
    pub row_ref: String,
    pub class: LockClass,
    /// Fixed, human-readable audit text for why the label was chosen.
    pub reason: String,
}

// ============================================================================
// Meta-row rules
// ============================================================================

/// Keyword set marking meta/header/summary rows.
///
/// Matched as case-folded substrings of the normalized row name. The table is
/// immutable configuration: build it once (usually via [`default_meta_rules`])
/// and pass it into every classification call.
#[derive(Debug, Clone)]
pub struct MetaRowRules {
    keywords: Vec<String>,
}

impl MetaRowRules {
    pub fn new(keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        MetaRowRules {
            keywords: keywords.into_iter().map(|k| normalize_name(&k.into())).collect(),
        }
    }

    /// First keyword contained in `normalized_name`, if any.
    fn first_match(&self, normalized_name: &str) -> Option<&str> {
        self.keywords
            .iter()
            .find(|kw| normalized_name.contains(kw.as_str()))
            .map(|kw| kw.as_str())
    }
}

/// The keyword set observed across insurer proposal layouts.
pub fn default_meta_rules() -> MetaRowRules {
    MetaRowRules::new([
        "total premium",
        "premium total",
        "sum insured total",
        "subtotal",
        "grand total",
        "customer information",
        "policyholder",
        "insured person",
        "payment schedule",
        "plan summary",
        "product summary",
        "notes and disclaimers",
        "disclaimer",
    ])
}

// ============================================================================
// Classification
// ============================================================================

/// Classify one row. Priority order, first match wins:
///
/// 1. name matches a meta keyword → [`LockClass::NonUniverseMeta`]
/// 2. amount present and name non-empty → [`LockClass::UniverseCoverage`]
/// 3. name non-empty, no amount → [`LockClass::Unclassified`]
/// 4. empty name → [`LockClass::NonUniverseMeta`]
pub fn classify_row(raw_name: &str, amount: Option<i64>, rules: &MetaRowRules) -> (LockClass, String) {
    let normalized = normalize_name(raw_name);

    if !normalized.is_empty() {
        if let Some(kw) = rules.first_match(&normalized) {
            return (
                LockClass::NonUniverseMeta,
                format!("matched meta keyword `{}`", kw),
            );
        }
    }

    match (normalized.is_empty(), amount) {
        (false, Some(_)) => (
            LockClass::UniverseCoverage,
            "amount present and name non-empty".to_string(),
        ),
        (false, None) => (
            LockClass::Unclassified,
            "name present but amount missing".to_string(),
        ),
        (true, _) => (LockClass::NonUniverseMeta, "empty raw name".to_string()),
    }
}

/// Classify one [`CoverageRow`] into a wire record.
pub fn classify_coverage_row(row: &CoverageRow, rules: &MetaRowRules) -> LockClassificationV1 {
    let (class, reason) = classify_row(&row.raw_name, row.amount, rules);
    LockClassificationV1 {
        row_ref: row.content_hash.clone(),
        class,
        reason,
    }
}

// ============================================================================
// Batch report
// ============================================================================

/// Per-scope tallies of a classification run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeUniverseSummaryV1 {
    pub universe_coverage: usize,
    pub non_universe_meta: usize,
    pub unclassified: usize,
}

/// Result of classifying one extracted batch.
///
/// `classifications` preserves input order (minus dropped duplicates) so the
/// report is byte-stable across runs and usable as a regression snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseReportV1 {
    pub version: u32,
    /// ISO-8601 timestamp, filled by the caller; excluded from snapshot
    /// comparison.
    pub generated_at: String,
    pub scopes: BTreeMap<String, ScopeUniverseSummaryV1>,
    pub classifications: Vec<LockClassificationV1>,
    /// Rows dropped because an earlier row carried the same `content_hash`.
    pub duplicates_dropped: usize,
}

/// Classify a batch of rows.
///
/// Duplicate `content_hash` rows are dropped deterministically (first
/// occurrence wins) and counted, so re-extracting overlapping page ranges
/// cannot double-count a coverage.
pub fn classify_rows(
    rows: &[CoverageRow],
    rules: &MetaRowRules,
    generated_at: String,
) -> UniverseReportV1 {
    let mut seen = std::collections::BTreeSet::new();
    let mut scopes: BTreeMap<String, ScopeUniverseSummaryV1> = BTreeMap::new();
    let mut classifications = Vec::new();
    let mut duplicates_dropped = 0usize;

    for row in rows {
        if !seen.insert(row.content_hash.clone()) {
            duplicates_dropped += 1;
            continue;
        }

        let classification = classify_coverage_row(row, rules);
        let summary = scopes.entry(row.scope_id.clone()).or_default();
        match classification.class {
            LockClass::UniverseCoverage => summary.universe_coverage += 1,
            LockClass::NonUniverseMeta => summary.non_universe_meta += 1,
            LockClass::Unclassified => summary.unclassified += 1,
        }
        classifications.push(classification);
    }

    UniverseReportV1 {
        version: UNIVERSE_REPORT_VERSION_V1,
        generated_at,
        scopes,
        classifications,
        duplicates_dropped,
    }
}
