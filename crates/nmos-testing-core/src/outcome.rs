// crates/nmos-testing-core/src/outcome.rs
// ============================================================================
// Module: Test Outcomes
// Description: Verdicts and outcome records produced by every check.
// Purpose: Provide the unit the engine reports in.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`TestOutcome`] is produced exactly once per check and never mutated
//! afterwards. Verdicts keep "nothing to test" ([`Verdict::NotApplicable`])
//! and "cannot be checked mechanically" ([`Verdict::Manual`]) apart from
//! [`Verdict::Fail`] so reports never conflate them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Verdict
// ============================================================================

/// Result classification for a single check.
///
/// # Invariants
/// - Variants and their labels are stable for report consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// The implementation behaved as required.
    Pass,
    /// The implementation violated a requirement.
    Fail,
    /// A recommendation was not followed; never blocks a pass.
    Warning,
    /// No test data was available to exercise the check.
    NotApplicable,
    /// The check could not reach a conclusion.
    Unclear,
    /// The check must be performed by a person.
    Manual,
}

impl Verdict {
    /// Returns a stable label for the verdict.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Warning => "WARNING",
            Self::NotApplicable => "NOT_APPLICABLE",
            Self::Unclear => "UNCLEAR",
            Self::Manual => "MANUAL",
        }
    }

    /// Returns true when the verdict represents non-conformance.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Fail)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Outcome of one named check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Check name, usually `METHOD /x-nmos/<api>/<version><path>`.
    pub name: String,
    /// Verdict reached.
    pub verdict: Verdict,
    /// Human-readable detail; empty for plain passes.
    pub message: String,
    /// Optional reference link (used by warnings).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl TestOutcome {
    /// Builds an outcome with an explicit verdict.
    #[must_use]
    pub fn new(name: impl Into<String>, verdict: Verdict, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            verdict,
            message: message.into(),
            link: None,
        }
    }

    /// Builds a passing outcome.
    #[must_use]
    pub fn pass(name: impl Into<String>) -> Self {
        Self::new(name, Verdict::Pass, "")
    }

    /// Builds a failing outcome.
    #[must_use]
    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Verdict::Fail, message)
    }

    /// Builds a warning outcome with a reference link.
    #[must_use]
    pub fn warning(
        name: impl Into<String>,
        message: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        Self {
            link: Some(link.into()),
            ..Self::new(name, Verdict::Warning, message)
        }
    }

    /// Builds a not-applicable outcome.
    #[must_use]
    pub fn not_applicable(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Verdict::NotApplicable, message)
    }

    /// Builds an unclear outcome.
    #[must_use]
    pub fn unclear(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Verdict::Unclear, message)
    }

    /// Builds a manual outcome.
    #[must_use]
    pub fn manual(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Verdict::Manual, message)
    }
}

/// Counts outcomes per verdict.
#[must_use]
pub fn summarize(outcomes: &[TestOutcome]) -> BTreeMap<Verdict, usize> {
    let mut counts = BTreeMap::new();
    for outcome in outcomes {
        *counts.entry(outcome.verdict).or_insert(0) += 1;
    }
    counts
}
