//! Coverage data model, universe lock and canonical mapping
//!
//! Coveralign turns raw coverage rows extracted from insurer sales proposals
//! into fact-based comparison verdicts. This crate owns the first half of
//! that pipeline:
//!
//! - the shared data model (coverage rows, canonical codes, wire records),
//! - the row classifier ("universe lock") deciding which extracted rows are
//!   genuine, comparable coverage line items,
//! - the canonical mapper aligning a (scope, raw name) pair with the
//!   reference table under strict ambiguity rules.
//!
//! Everything here is a pure function over immutable inputs plus a read-only
//! reference snapshot. Ambiguous and unmapped outcomes are ordinary values,
//! never errors: they propagate to the caller for explicit follow-up instead
//! of being auto-resolved.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod classifier;
pub mod mapper;
pub mod reference;

pub use classifier::*;
pub use mapper::*;
pub use reference::*;

// ============================================================================
// Canonical codes
// ============================================================================

/// A canonical coverage code, used to align the same coverage concept across
/// insurers (e.g. `CA-GEN-DX` for a general cancer diagnosis benefit).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalCode(pub String);

impl CanonicalCode {
    pub fn new(code: impl Into<String>) -> Self {
        CanonicalCode(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CanonicalCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cancer coverage sub-types distinguished by the canonical split stage.
///
/// The payout and underwriting treatment of these four differ enough that a
/// comparison mixing them up is financially wrong, which is why deciding
/// between them requires policy-text evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancerSubtype {
    /// General (invasive) cancer.
    General,
    /// "Similar cancer" group: thyroid, other low-severity diagnoses paid at
    /// a reduced rate.
    Similar,
    /// Carcinoma in situ.
    InSitu,
    /// Borderline malignancy.
    Borderline,
}

impl CancerSubtype {
    pub const ALL: [CancerSubtype; 4] = [
        Self::General,
        Self::Similar,
        Self::InSitu,
        Self::Borderline,
    ];

    /// The canonical code for this sub-type.
    pub fn code(self) -> CanonicalCode {
        CanonicalCode::new(match self {
            Self::General => "CA-GEN",
            Self::Similar => "CA-SIM",
            Self::InSitu => "CA-CIS",
            Self::Borderline => "CA-BDL",
        })
    }
}

// ============================================================================
// Coverage rows
// ============================================================================

/// A raw coverage row handed to us by the proposal/table extractor.
///
/// Immutable once extracted; `content_hash` is the de-duplication key and the
/// stable reference other records use to point back at the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageRow {
    /// Insurer scope this row was extracted for.
    pub scope_id: String,
    /// Verbatim coverage name as printed in the proposal.
    pub raw_name: String,
    /// Insured amount, if the extractor found one on the row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// 1-based page in the source proposal document.
    pub source_page: u32,
    pub content_hash: String,
}

impl CoverageRow {
    /// Build a row, computing its content hash from the identifying fields.
    pub fn new(
        scope_id: impl Into<String>,
        raw_name: impl Into<String>,
        amount: Option<i64>,
        currency: Option<String>,
        source_page: u32,
    ) -> Self {
        let scope_id = scope_id.into();
        let raw_name = raw_name.into();
        let content_hash = row_content_hash(&scope_id, &raw_name, amount, source_page);
        CoverageRow {
            scope_id,
            raw_name,
            amount,
            currency,
            source_page,
            content_hash,
        }
    }

    /// Stable reference used by downstream records to point at this row.
    pub fn row_ref(&self) -> &str {
        &self.content_hash
    }
}

/// Content hash over the identifying fields of a row.
///
/// The extractor and the core both compute this, so the fields and separator
/// are part of the collaborator contract.
pub fn row_content_hash(
    scope_id: &str,
    raw_name: &str,
    amount: Option<i64>,
    source_page: u32,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(scope_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(raw_name.as_bytes());
    hasher.update(b"\n");
    if let Some(amount) = amount {
        hasher.update(amount.to_string().as_bytes());
    }
    hasher.update(b"\n");
    hasher.update(source_page.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Name normalization
// ============================================================================

/// Normalize a coverage name for matching: case-fold and collapse internal
/// whitespace. Parentheses and punctuation are kept as-is: in this domain
/// `(in-situ)` vs no qualifier changes the meaning of the row, so stripping
/// them would silently merge distinct coverages.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ============================================================================
// Snapshot serialization
// ============================================================================

/// Canonical JSON for golden-snapshot regression tests.
///
/// All wire records keep their maps in `BTreeMap`s and their lists sorted or
/// input-ordered, so pretty-printing is already byte-stable; this helper is
/// the single place tests and the CLI go through, in case the canonical form
/// ever needs to change.
pub fn to_canonical_json<T: serde::Serialize>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_and_sensitive_to_each_field() {
        let a = row_content_hash("ins_a", "general cancer diagnosis", Some(1000), 3);
        let b = row_content_hash("ins_a", "general cancer diagnosis", Some(1000), 3);
        assert_eq!(a, b);

        assert_ne!(a, row_content_hash("ins_b", "general cancer diagnosis", Some(1000), 3));
        assert_ne!(a, row_content_hash("ins_a", "general cancer surgery", Some(1000), 3));
        assert_ne!(a, row_content_hash("ins_a", "general cancer diagnosis", None, 3));
        assert_ne!(a, row_content_hash("ins_a", "general cancer diagnosis", Some(1000), 4));
    }

    #[test]
    fn normalize_collapses_whitespace_but_keeps_punctuation() {
        assert_eq!(
            normalize_name("  Similar-Cancer   Benefit (In-Situ) "),
            "similar-cancer benefit (in-situ)"
        );
    }

    #[test]
    fn cancer_subtype_codes_are_distinct() {
        let codes: std::collections::BTreeSet<_> =
            CancerSubtype::ALL.iter().map(|s| s.code()).collect();
        assert_eq!(codes.len(), 4);
    }
}
