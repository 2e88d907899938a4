//! Deterministic coverage comparison and explanation
//!
//! The comparison engine consumes universe-locked, canonically-mapped rows
//! per insurer and a user coverage query, and emits one of four states per
//! insurer plus machine-readable limitation reasons. Two hard rules shape
//! everything here:
//!
//! - **No inference.** Matching is substring-exact over normalized names.
//!   When two rows match a query, the engine refuses to pick one; when a
//!   mapping is missing, the comparison is withheld, not guessed.
//! - **Reproducibility.** Two runs over identical input produce
//!   byte-identical results. Every collection that reaches output is sorted
//!   or order-preserving, and limitation reasons are emitted in a fixed
//!   order.
//!
//! The explanation layer renders each state into a fixed template and
//! validates the rendered text against a forbidden-phrase deny list; an
//! evaluative phrase in output is a hard failure, not a style issue.

pub mod api;
pub mod engine;
pub mod explain;

pub use api::*;
pub use engine::*;
pub use explain::*;
