//! Scope detector: typed spans → sub-type inclusion flags.
//!
//! Each qualifying span moves the four sub-type flags according to its
//! semantic role:
//!
//! - **definition-included** sets the mentioned sub-flags true (and the
//!   general flag, since the clause defines the general benefit's scope)
//!   without touching siblings,
//! - **separate-benefit** sets only the named sub-flags true and clears all
//!   siblings, establishing exclusivity,
//! - **exclusion** sets the named sub-flags false and leaves the general
//!   flag true.
//!
//! Spans fold left to right; a later, more specific span may narrow the
//! flags, but a fold never moves a flag back to "unknown": every transition
//! is an explicit rule above.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use coveralign_core::{CancerSubtype, CanonicalCode};

use crate::{classify_evidence, EvidencePattern, EvidenceType, PolicyEvidenceSpanV1};

/// Pointer to a span that contributed to a decision.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EvidenceSpanRefV1 {
    pub doc_id: String,
    /// 1-based page in the policy document.
    pub page: u32,
    pub span_text: String,
}

impl EvidenceSpanRefV1 {
    pub fn from_span(span: &PolicyEvidenceSpanV1) -> Self {
        EvidenceSpanRefV1 {
            doc_id: span.document_id.clone(),
            page: span.page,
            span_text: span.text.clone(),
        }
    }
}

// ============================================================================
// Sub-type mention detection
// ============================================================================

/// Sub-type keywords as they appear in policy wording and coverage names.
pub fn mentioned_subtypes(text: &str) -> BTreeSet<CancerSubtype> {
    let lower = text.to_lowercase();
    let mut out = BTreeSet::new();

    if lower.contains("general cancer") || lower.contains("invasive cancer") {
        out.insert(CancerSubtype::General);
    }
    if lower.contains("similar cancer") || lower.contains("similar-cancer") {
        out.insert(CancerSubtype::Similar);
    }
    if lower.contains("in situ") || lower.contains("in-situ") {
        out.insert(CancerSubtype::InSitu);
    }
    if lower.contains("borderline") {
        out.insert(CancerSubtype::Borderline);
    }

    out
}

// ============================================================================
// Scope evidence
// ============================================================================

/// Accumulated inclusion flags for one coverage, plus the spans that put
/// them there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeEvidence {
    pub includes_general: bool,
    pub includes_similar: bool,
    pub includes_in_situ: bool,
    pub includes_borderline: bool,
    pub spans: Vec<EvidenceSpanRefV1>,
}

impl ScopeEvidence {
    /// Apply one typed span. Returns `false` (and changes nothing) when the
    /// span names no sub-type; such a span contributes no evidence.
    pub fn apply(
        &mut self,
        evidence_type: EvidenceType,
        mentions: &BTreeSet<CancerSubtype>,
        span: EvidenceSpanRefV1,
    ) -> bool {
        if mentions.is_empty() {
            return false;
        }

        match evidence_type {
            EvidenceType::DefinitionIncluded => {
                self.includes_general = true;
                for subtype in mentions {
                    self.set(*subtype, true);
                }
            }
            EvidenceType::SeparateBenefit => {
                for subtype in CancerSubtype::ALL {
                    self.set(subtype, mentions.contains(&subtype));
                }
            }
            EvidenceType::Exclusion => {
                for subtype in mentions {
                    self.set(*subtype, false);
                }
                self.includes_general = true;
            }
        }

        self.spans.push(span);
        true
    }

    fn set(&mut self, subtype: CancerSubtype, value: bool) {
        match subtype {
            CancerSubtype::General => self.includes_general = value,
            CancerSubtype::Similar => self.includes_similar = value,
            CancerSubtype::InSitu => self.includes_in_situ = value,
            CancerSubtype::Borderline => self.includes_borderline = value,
        }
    }

    fn flag(&self, subtype: CancerSubtype) -> bool {
        match subtype {
            CancerSubtype::General => self.includes_general,
            CancerSubtype::Similar => self.includes_similar,
            CancerSubtype::InSitu => self.includes_in_situ,
            CancerSubtype::Borderline => self.includes_borderline,
        }
    }

    /// All sub-type codes whose flag is set.
    pub fn included_codes(&self) -> BTreeSet<CanonicalCode> {
        CancerSubtype::ALL
            .iter()
            .filter(|s| self.flag(**s))
            .map(|s| s.code())
            .collect()
    }

    /// The single applicable canonical sub-code, by fixed precedence:
    /// general > similar > in-situ > borderline. `None` when no flag is set.
    pub fn canonical_code(&self) -> Option<CanonicalCode> {
        CancerSubtype::ALL
            .iter()
            .find(|s| self.flag(**s))
            .map(|s| s.code())
    }

    pub fn has_contributions(&self) -> bool {
        !self.spans.is_empty()
    }
}

/// Detect scope evidence in a single span: type it, scan for sub-type
/// mentions, and fold the result into a fresh [`ScopeEvidence`].
///
/// Returns `None` when the span matches no typer rule or names no sub-type.
pub fn detect_scope(
    span: &PolicyEvidenceSpanV1,
    patterns: &[EvidencePattern],
) -> Option<ScopeEvidence> {
    let typed = classify_evidence(&span.text, patterns)?;
    let mentions = mentioned_subtypes(&span.text);

    let mut evidence = ScopeEvidence::default();
    evidence
        .apply(typed.evidence_type, &mentions, EvidenceSpanRefV1::from_span(span))
        .then_some(evidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::default_evidence_patterns;

    fn span(doc: &str, page: u32, text: &str) -> PolicyEvidenceSpanV1 {
        PolicyEvidenceSpanV1 {
            document_id: doc.to_string(),
            page,
            text: text.to_string(),
            section: None,
        }
    }

    #[test]
    fn definition_inclusion_keeps_general_and_adds_subtype() {
        let patterns = default_evidence_patterns();
        let evidence = detect_scope(
            &span("pol_a", 12, "Carcinoma in situ is included in the definition of cancer."),
            &patterns,
        )
        .expect("evidence");

        assert!(evidence.includes_general);
        assert!(evidence.includes_in_situ);
        assert!(!evidence.includes_similar);
        assert_eq!(evidence.canonical_code(), Some(CancerSubtype::General.code()));
    }

    #[test]
    fn separate_benefit_establishes_exclusivity() {
        let patterns = default_evidence_patterns();
        let evidence = detect_scope(
            &span("pol_a", 14, "Carcinoma in situ is paid separately at 20% of the sum insured."),
            &patterns,
        )
        .expect("evidence");

        assert!(!evidence.includes_general);
        assert!(evidence.includes_in_situ);
        assert_eq!(evidence.canonical_code(), Some(CancerSubtype::InSitu.code()));
    }

    #[test]
    fn exclusion_clears_subtype_but_keeps_general() {
        let patterns = default_evidence_patterns();
        let evidence = detect_scope(
            &span("pol_a", 15, "Borderline tumors are excluded from the cancer benefit."),
            &patterns,
        )
        .expect("evidence");

        assert!(evidence.includes_general);
        assert!(!evidence.includes_borderline);
        assert_eq!(evidence.canonical_code(), Some(CancerSubtype::General.code()));
    }

    #[test]
    fn later_spans_narrow_earlier_ones_in_a_fold() {
        let patterns = default_evidence_patterns();
        let mut folded = detect_scope(
            &span("pol_a", 12, "Similar cancer is included in the definition of cancer."),
            &patterns,
        )
        .expect("evidence");

        // A later payment clause narrows the similar sub-type to exclusive.
        let second = span("pol_a", 19, "Similar cancer is paid separately from the cancer benefit.");
        let typed = classify_evidence(&second.text, &patterns).expect("typed");
        let mentions = mentioned_subtypes(&second.text);
        assert!(folded.apply(typed.evidence_type, &mentions, EvidenceSpanRefV1::from_span(&second)));

        assert!(!folded.includes_general);
        assert!(folded.includes_similar);
        assert_eq!(folded.spans.len(), 2);
        assert_eq!(folded.canonical_code(), Some(CancerSubtype::Similar.code()));
    }

    #[test]
    fn span_without_subtype_mentions_contributes_nothing() {
        let patterns = default_evidence_patterns();
        assert_eq!(
            detect_scope(
                &span("pol_a", 3, "Benefits are paid separately to the designated beneficiary."),
                &patterns,
            ),
            None
        );
    }

    #[test]
    fn precedence_is_general_over_similar_over_in_situ_over_borderline() {
        let mut evidence = ScopeEvidence::default();
        evidence.includes_borderline = true;
        assert_eq!(evidence.canonical_code(), Some(CancerSubtype::Borderline.code()));
        evidence.includes_in_situ = true;
        assert_eq!(evidence.canonical_code(), Some(CancerSubtype::InSitu.code()));
        evidence.includes_similar = true;
        assert_eq!(evidence.canonical_code(), Some(CancerSubtype::Similar.code()));
        evidence.includes_general = true;
        assert_eq!(evidence.canonical_code(), Some(CancerSubtype::General.code()));
    }
}
