//! Canonical reference table snapshots.
//!
//! The reference table is loaded by a spreadsheet-import collaborator and
//! handed to us as plain rows `{scope_id, raw_name, canonical_code}`. We
//! index it once into an immutable snapshot; refreshing the snapshot is an
//! operational concern outside the core, and readers only ever see a whole
//! table.
//!
//! Malformed rows are skipped with a logged reason and recorded in the load
//! report. A bad row must never crash the batch, and must never silently
//! match anything.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::warn;

use crate::{normalize_name, CanonicalCode};

/// One row of the canonical reference table, as imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRowV1 {
    pub scope_id: String,
    pub raw_name: String,
    pub canonical_code: String,
}

/// A reference row that failed shape validation and was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedReferenceRowV1 {
    /// 0-based index in the imported row list.
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("reference table payload is not a JSON array")]
    NotAnArray,
    #[error("reference table JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Snapshot
// ============================================================================

/// Immutable, scope-partitioned index over the reference table.
///
/// Keys are normalized names; values are the canonical codes registered for
/// that name within one scope. Several codes under one name is a legitimate
/// state; the mapper reports it as ambiguity rather than picking one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSnapshot {
    by_scope: BTreeMap<String, BTreeMap<String, BTreeSet<CanonicalCode>>>,
}

/// Snapshot plus the audit trail of what the loader dropped.
#[derive(Debug, Clone)]
pub struct ReferenceLoadReport {
    pub snapshot: ReferenceSnapshot,
    pub skipped: Vec<SkippedReferenceRowV1>,
}

fn row_shape_error(row: &ReferenceRowV1) -> Option<&'static str> {
    if row.scope_id.trim().is_empty() {
        Some("empty scope_id")
    } else if normalize_name(&row.raw_name).is_empty() {
        Some("empty raw_name")
    } else if row.canonical_code.trim().is_empty() {
        Some("empty canonical_code")
    } else {
        None
    }
}

impl ReferenceSnapshot {
    /// Index validated rows. Rows with an empty scope, name or code are
    /// skipped and logged; exact duplicates collapse into one entry.
    pub fn from_rows(rows: &[ReferenceRowV1]) -> ReferenceLoadReport {
        let mut snapshot = ReferenceSnapshot::default();
        let mut skipped = Vec::new();

        for (index, row) in rows.iter().enumerate() {
            if let Some(reason) = row_shape_error(row) {
                warn!(index, reason, "skipping malformed reference row");
                skipped.push(SkippedReferenceRowV1 {
                    index,
                    reason: reason.to_string(),
                });
                continue;
            }
            snapshot.insert(row);
        }

        ReferenceLoadReport { snapshot, skipped }
    }

    /// Parse and index a JSON array of reference rows.
    ///
    /// Rows that fail to deserialize are skipped individually, so one corrupt
    /// cell does not take down the rest of the table. Indices in the report
    /// refer to the original array.
    pub fn from_json(payload: &str) -> Result<ReferenceLoadReport, ReferenceError> {
        let values: serde_json::Value = serde_json::from_str(payload)?;
        let serde_json::Value::Array(items) = values else {
            return Err(ReferenceError::NotAnArray);
        };

        let mut snapshot = ReferenceSnapshot::default();
        let mut skipped = Vec::new();
        for (index, item) in items.into_iter().enumerate() {
            let row = match serde_json::from_value::<ReferenceRowV1>(item) {
                Ok(row) => row,
                Err(err) => {
                    warn!(index, %err, "skipping undeserializable reference row");
                    skipped.push(SkippedReferenceRowV1 {
                        index,
                        reason: format!("deserialize: {err}"),
                    });
                    continue;
                }
            };

            if let Some(reason) = row_shape_error(&row) {
                warn!(index, reason, "skipping malformed reference row");
                skipped.push(SkippedReferenceRowV1 {
                    index,
                    reason: reason.to_string(),
                });
                continue;
            }

            snapshot.insert(&row);
        }

        Ok(ReferenceLoadReport { snapshot, skipped })
    }

    fn insert(&mut self, row: &ReferenceRowV1) {
        self.by_scope
            .entry(row.scope_id.trim().to_string())
            .or_default()
            .entry(normalize_name(&row.raw_name))
            .or_default()
            .insert(CanonicalCode::new(row.canonical_code.trim()));
    }

    /// View of one insurer's slice of the table.
    ///
    /// This is the mapper's input boundary: candidates are scope-filtered
    /// here, before any matching happens, so a name collision across two
    /// insurers can never be reported as ambiguity.
    pub fn scope(&self, scope_id: &str) -> ScopedReference<'_> {
        ScopedReference {
            scope_id: scope_id.to_string(),
            by_name: self.by_scope.get(scope_id),
        }
    }

    pub fn scope_ids(&self) -> impl Iterator<Item = &str> {
        self.by_scope.keys().map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.by_scope.is_empty()
    }
}

/// One insurer's slice of the reference snapshot.
#[derive(Debug, Clone)]
pub struct ScopedReference<'a> {
    scope_id: String,
    by_name: Option<&'a BTreeMap<String, BTreeSet<CanonicalCode>>>,
}

impl<'a> ScopedReference<'a> {
    pub fn scope_id(&self) -> &str {
        &self.scope_id
    }

    /// Candidate codes for a normalized name, in stable (sorted) order.
    pub fn candidates(&self, normalized_name: &str) -> Vec<CanonicalCode> {
        self.by_name
            .and_then(|by_name| by_name.get(normalized_name))
            .map(|codes| codes.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ref_row(scope: &str, name: &str, code: &str) -> ReferenceRowV1 {
        ReferenceRowV1 {
            scope_id: scope.to_string(),
            raw_name: name.to_string(),
            canonical_code: code.to_string(),
        }
    }

    #[test]
    fn malformed_rows_are_skipped_with_reasons_not_dropped_silently() {
        let rows = vec![
            ref_row("ins_a", "general cancer diagnosis benefit", "CA-GEN-DX"),
            ref_row("", "orphan row", "CA-GEN-DX"),
            ref_row("ins_a", "   ", "CA-GEN-DX"),
            ref_row("ins_a", "no code row", ""),
        ];
        let report = ReferenceSnapshot::from_rows(&rows);
        assert_eq!(report.skipped.len(), 3);
        assert_eq!(report.skipped[0].reason, "empty scope_id");
        assert_eq!(report.skipped[1].reason, "empty raw_name");
        assert_eq!(report.skipped[2].reason, "empty canonical_code");

        let scoped = report.snapshot.scope("ins_a");
        assert_eq!(
            scoped.candidates("general cancer diagnosis benefit"),
            vec![CanonicalCode::new("CA-GEN-DX")]
        );
    }

    #[test]
    fn duplicate_rows_collapse_but_conflicting_codes_stay() {
        let rows = vec![
            ref_row("ins_a", "Cancer Benefit", "CA-GEN-DX"),
            ref_row("ins_a", "cancer   benefit", "CA-GEN-DX"),
            ref_row("ins_a", "cancer benefit", "CA-SIM-DX"),
        ];
        let report = ReferenceSnapshot::from_rows(&rows);
        assert!(report.skipped.is_empty());
        let candidates = report.snapshot.scope("ins_a").candidates("cancer benefit");
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn scopes_are_isolated() {
        let rows = vec![
            ref_row("ins_a", "cancer benefit", "CA-GEN-DX"),
            ref_row("ins_b", "cancer benefit", "CA-SIM-DX"),
        ];
        let report = ReferenceSnapshot::from_rows(&rows);
        assert_eq!(
            report.snapshot.scope("ins_a").candidates("cancer benefit"),
            vec![CanonicalCode::new("CA-GEN-DX")]
        );
        assert_eq!(
            report.snapshot.scope("ins_b").candidates("cancer benefit"),
            vec![CanonicalCode::new("CA-SIM-DX")]
        );
        assert!(report
            .snapshot
            .scope("ins_c")
            .candidates("cancer benefit")
            .is_empty());
    }

    #[test]
    fn from_json_skips_undeserializable_entries() {
        let payload = r#"[
            {"scope_id": "ins_a", "raw_name": "cancer benefit", "canonical_code": "CA-GEN-DX"},
            {"scope_id": 42},
            "not an object"
        ]"#;
        let report = ReferenceSnapshot::from_json(payload).expect("parse");
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(
            report.snapshot.scope("ins_a").candidates("cancer benefit"),
            vec![CanonicalCode::new("CA-GEN-DX")]
        );
    }

    #[test]
    fn from_json_rejects_non_array_payloads() {
        let err = ReferenceSnapshot::from_json(r#"{"rows": []}"#).unwrap_err();
        assert!(matches!(err, ReferenceError::NotAnArray));
    }
}
