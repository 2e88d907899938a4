//! Evidence typer: policy text span → semantic role.
//!
//! Policy documents phrase sub-type treatment in three recognizable ways:
//! definition clauses ("carcinoma in situ is included in the definition of
//! cancer"), payment clauses ("paid as a separate benefit"), and exclusion
//! clauses ("no benefit is payable for borderline tumors"). The typer is a
//! fixed, ordered rule table over those phrasings; the first matching rule
//! wins and unmatched text yields no result at all. The caller must treat
//! that as "no evidence", never as a weak match.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Semantic role of a policy text span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    /// The sub-type is part of the broader benefit's definition.
    DefinitionIncluded,
    /// The sub-type is paid separately/independently from the broader benefit.
    SeparateBenefit,
    /// The sub-type is excluded from the broader benefit.
    Exclusion,
}

/// Result of typing one span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceTypeResult {
    pub evidence_type: EvidenceType,
    /// Name of the rule that matched, for audit output.
    pub matched_pattern: String,
}

/// One rule in the typer table.
#[derive(Debug, Clone)]
pub struct EvidencePattern {
    pub name: String,
    pub evidence_type: EvidenceType,
    pub regex: Regex,
}

impl EvidencePattern {
    fn new(name: &str, evidence_type: EvidenceType, pattern: &str) -> Self {
        EvidencePattern {
            name: name.to_string(),
            evidence_type,
            // Patterns are fixed at build time; a bad one is a programming
            // error, not a data error.
            regex: Regex::new(pattern).expect("valid evidence pattern"),
        }
    }
}

/// The default, ordered typer table.
///
/// Order matters: a combined clause like "excluded from the cancer benefit
/// and instead paid as a separate benefit" is a payment clause, so
/// separate-benefit rules are checked before exclusion rules.
pub fn default_evidence_patterns() -> Vec<EvidencePattern> {
    vec![
        // -----------------------------------------------------------------
        // Definition-inclusion clauses
        // -----------------------------------------------------------------
        EvidencePattern::new(
            "definition_includes",
            EvidenceType::DefinitionIncluded,
            r"(?i)\bincluded\s+(?:in|within)\s+the\s+definition\s+of\b",
        ),
        EvidencePattern::new(
            "definition_lists",
            EvidenceType::DefinitionIncluded,
            r"(?i)\bdefinition\s+of\s+[^.]{0,60}\bincludes\b",
        ),
        EvidencePattern::new(
            "deemed_to_constitute",
            EvidenceType::DefinitionIncluded,
            r"(?i)\b(?:is|are|shall\s+be)\s+deemed\s+to\s+(?:constitute|be)\b",
        ),
        // -----------------------------------------------------------------
        // Separate-benefit (payment) clauses
        // -----------------------------------------------------------------
        EvidencePattern::new(
            "paid_separately",
            EvidenceType::SeparateBenefit,
            r"(?i)\b(?:paid|payable)\s+(?:separately|independently)\b",
        ),
        EvidencePattern::new(
            "separate_benefit",
            EvidenceType::SeparateBenefit,
            r"(?i)\b(?:as\s+a|under\s+a|constitutes?\s+a)\s+separate\s+benefit\b",
        ),
        EvidencePattern::new(
            "independent_benefit",
            EvidenceType::SeparateBenefit,
            r"(?i)\bindependent\s+benefit\b",
        ),
        // -----------------------------------------------------------------
        // Exclusion clauses
        // -----------------------------------------------------------------
        EvidencePattern::new(
            "excluded_from",
            EvidenceType::Exclusion,
            r"(?i)\b(?:is|are)\s+excluded\s+from\b",
        ),
        EvidencePattern::new(
            "does_not_cover",
            EvidenceType::Exclusion,
            r"(?i)\bdoes\s+not\s+(?:cover|include)\b",
        ),
        EvidencePattern::new(
            "no_benefit_payable",
            EvidenceType::Exclusion,
            r"(?i)\bno\s+benefit\s+(?:is|shall\s+be)\s+(?:paid|payable)\s+for\b",
        ),
    ]
}

/// Type one span of policy text. First matching rule wins; `None` means the
/// span carries no recognizable evidence.
pub fn classify_evidence(text: &str, patterns: &[EvidencePattern]) -> Option<EvidenceTypeResult> {
    patterns
        .iter()
        .find(|p| p.regex.is_match(text))
        .map(|p| EvidenceTypeResult {
            evidence_type: p.evidence_type,
            matched_pattern: p.name.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_clause_is_typed_definition_included() {
        let patterns = default_evidence_patterns();
        let result = classify_evidence(
            "Carcinoma in situ is included in the definition of cancer under this rider.",
            &patterns,
        )
        .expect("typed");
        assert_eq!(result.evidence_type, EvidenceType::DefinitionIncluded);
        assert_eq!(result.matched_pattern, "definition_includes");
    }

    #[test]
    fn payment_clause_is_typed_separate_benefit() {
        let patterns = default_evidence_patterns();
        let result = classify_evidence(
            "Similar cancer diagnoses are paid separately at 20% of the sum insured.",
            &patterns,
        )
        .expect("typed");
        assert_eq!(result.evidence_type, EvidenceType::SeparateBenefit);
    }

    #[test]
    fn exclusion_clause_is_typed_exclusion() {
        let patterns = default_evidence_patterns();
        let result = classify_evidence(
            "Borderline tumors are excluded from the general cancer benefit.",
            &patterns,
        )
        .expect("typed");
        assert_eq!(result.evidence_type, EvidenceType::Exclusion);
    }

    #[test]
    fn combined_exclusion_plus_payment_clause_reads_as_separate_benefit() {
        let patterns = default_evidence_patterns();
        let result = classify_evidence(
            "In-situ carcinoma is excluded from the cancer benefit and instead paid separately.",
            &patterns,
        )
        .expect("typed");
        assert_eq!(result.evidence_type, EvidenceType::SeparateBenefit);
    }

    #[test]
    fn unrelated_text_yields_no_result() {
        let patterns = default_evidence_patterns();
        assert_eq!(
            classify_evidence("The policyholder may cancel within 30 days.", &patterns),
            None
        );
    }

    #[test]
    fn typing_is_stateless_across_calls() {
        let patterns = default_evidence_patterns();
        let text = "Thyroid cancer is included in the definition of similar cancer.";
        let first = classify_evidence(text, &patterns);
        let _ = classify_evidence("no benefit is payable for anything", &patterns);
        let second = classify_evidence(text, &patterns);
        assert_eq!(first, second);
    }
}
