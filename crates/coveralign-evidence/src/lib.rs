//! Policy-evidence typing and canonical split resolution
//!
//! Some coverage names are honest about what they cover; many are not. A row
//! called "cancer diagnosis benefit" may or may not pay out for carcinoma in
//! situ, and only the policy wording can say. This crate owns that
//! resolution:
//!
//! - the **evidence typer** classifies a policy text span into one of three
//!   semantic roles (definition-inclusion, separate-benefit, exclusion),
//! - the **scope detector** folds typed spans into per-sub-type inclusion
//!   flags and derives the applicable canonical sub-code,
//! - the **split resolver** gates the whole thing: without qualifying policy
//!   spans the result is *undecided*, carrying only a non-authoritative
//!   name-derived hint.
//!
//! The gate is the system's core safety invariant. A plausible-looking name
//! must never, by itself, produce a decided split, so the decided variant is
//! constructible only from a non-empty list of contributing spans.

use serde::{Deserialize, Serialize};

pub mod decision;
pub mod scope;
pub mod split;
pub mod typer;

pub use decision::*;
pub use scope::*;
pub use split::*;
pub use typer::*;

/// A verbatim span of policy wording, as delivered by the policy-document
/// text extractor. Append-only; one span may support multiple decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEvidenceSpanV1 {
    pub document_id: String,
    /// 1-based page in the policy document.
    pub page: u32,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}
