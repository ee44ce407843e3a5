//! Pass/fail verdicts and their validating parse step.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{MasteryError, Result};

/// Phrases that name no concept and therefore do not count as gaps.
const GENERIC_GAPS: &[&str] = &[
    "needs more practice",
    "more practice",
    "needs improvement",
    "review the lesson",
    "review the material",
    "study more",
    "everything",
    "all concepts",
    "all of it",
    "general understanding",
];

/// The evaluator's decision for one attempt.
///
/// Invariant: `passed` is `true` exactly when `gaps` is empty. Deserialization
/// goes through the same checks as [`Verdict::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawVerdict")]
pub struct Verdict {
    passed: bool,
    gaps: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    passed: Option<bool>,
    #[serde(default)]
    gaps: Option<Vec<String>>,
}

impl Verdict {
    /// A passing verdict.
    #[must_use]
    pub const fn pass() -> Self {
        Self {
            passed: true,
            gaps: Vec::new(),
        }
    }

    /// A failing verdict with the given gaps.
    ///
    /// # Errors
    ///
    /// Returns `MasteryError::InvalidVerdict` if `gaps` is empty, contains
    /// blank or duplicate entries, or contains generic filler.
    pub fn fail(gaps: Vec<String>) -> Result<Self> {
        let gaps = validate_gaps(gaps)?;
        if gaps.is_empty() {
            return Err(MasteryError::invalid_verdict(
                "passed is false but no gaps were named",
            ));
        }
        Ok(Self {
            passed: false,
            gaps,
        })
    }

    /// Validates an evaluator document and turns it into a verdict.
    ///
    /// # Errors
    ///
    /// Returns `MasteryError::InvalidVerdict` if `passed` is missing, the
    /// `passed` ⇔ empty-gaps invariant is broken, or the gaps are unusable.
    pub fn parse(document: serde_json::Value) -> Result<Self> {
        let raw: RawVerdict = serde_json::from_value(document)
            .map_err(|e| MasteryError::invalid_verdict(format!("unexpected verdict shape: {e}")))?;
        Self::try_from(raw)
    }

    /// Whether the learner met every mastery criterion.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.passed
    }

    /// Specific concepts the learner missed, in evaluator order.
    #[must_use]
    pub fn gaps(&self) -> &[String] {
        &self.gaps
    }
}

impl TryFrom<RawVerdict> for Verdict {
    type Error = MasteryError;

    fn try_from(raw: RawVerdict) -> Result<Self> {
        let passed = raw
            .passed
            .ok_or_else(|| MasteryError::invalid_verdict("missing 'passed' field"))?;
        let gaps = raw.gaps.unwrap_or_default();

        if passed {
            if !gaps.is_empty() {
                return Err(MasteryError::invalid_verdict(format!(
                    "passed is true but {} gaps were listed",
                    gaps.len()
                )));
            }
            return Ok(Self::pass());
        }

        Self::fail(gaps)
    }
}

/// Matches a generic phrase on its own or leading a longer gap
/// ("needs more practice with photosynthesis").
fn is_generic(normalized: &str) -> bool {
    GENERIC_GAPS.iter().any(|generic| {
        normalized
            .strip_prefix(generic)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(' '))
    })
}

fn validate_gaps(gaps: Vec<String>) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(gaps.len());

    for gap in gaps {
        let gap = gap.trim().to_string();
        if gap.is_empty() {
            return Err(MasteryError::invalid_verdict("gap entry is blank"));
        }

        let normalized = gap.to_lowercase();
        let normalized = normalized.trim_end_matches('.');
        if is_generic(normalized) {
            return Err(MasteryError::invalid_verdict(format!(
                "gap '{gap}' does not name a specific concept"
            )));
        }
        if !seen.insert(normalized.to_string()) {
            return Err(MasteryError::invalid_verdict(format!(
                "gap '{gap}' is listed more than once"
            )));
        }
        out.push(gap);
    }

    Ok(out)
}
