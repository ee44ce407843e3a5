//! Exercise battery types and the validating parse step.
//!
//! A battery is generated fresh for every attempt. The generation service
//! returns an arbitrary JSON document; [`ExerciseBattery::parse`] is the only
//! way to turn it into a battery, and it fails with
//! `MasteryError::MalformedBattery` instead of filling in defaults.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{MasteryError, Result};

/// Marker pattern for cloze blanks: `[[blank_id]]`.
static CLOZE_MARKER: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\[\[([A-Za-z0-9_\-]+)\]\]").expect("cloze marker pattern is valid")
});

// ============================================================================
// ExerciseSlot
// ============================================================================

/// The six named exercise kinds of a battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExerciseSlot {
    /// Multiple-choice / true-false questions.
    MultipleChoice,
    /// Term ↔ definition cards.
    TermDefinition,
    /// Sorting items into two buckets.
    Categorize,
    /// Matching left items to right items.
    Pairing,
    /// Fill-in-the-blank paragraph.
    Cloze,
    /// Open-ended explanation in the learner's own words.
    Explain,
}

impl ExerciseSlot {
    /// All slots in presentation order.
    pub const ALL: [Self; 6] = [
        Self::MultipleChoice,
        Self::TermDefinition,
        Self::Categorize,
        Self::Pairing,
        Self::Cloze,
        Self::Explain,
    ];
}

impl std::fmt::Display for ExerciseSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MultipleChoice => write!(f, "multipleChoice"),
            Self::TermDefinition => write!(f, "termDefinition"),
            Self::Categorize => write!(f, "categorize"),
            Self::Pairing => write!(f, "pairing"),
            Self::Cloze => write!(f, "cloze"),
            Self::Explain => write!(f, "explain"),
        }
    }
}

// ============================================================================
// Item types
// ============================================================================

/// A multiple-choice or true/false question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipleChoiceQuestion {
    /// Question text.
    pub question: String,
    /// Answer options (at least two).
    pub options: Vec<String>,
    /// Index into `options` of the correct answer.
    pub correct_option_index: usize,
}

/// A term and its definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermDefinition {
    /// The term shown to the learner.
    pub term: String,
    /// The expected definition.
    pub definition: String,
}

/// A categorization exercise with exactly two buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Categorize {
    /// The two bucket labels.
    pub buckets: Vec<String>,
    /// Items to sort.
    pub items: Vec<CategorizeItem>,
}

/// One item of a categorization exercise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorizeItem {
    /// Item text.
    pub text: String,
    /// Index into `buckets` of the correct bucket.
    pub correct_bucket_index: usize,
}

/// A left/right pair; `right` is the correct match for `left`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pair {
    /// Left-hand concept.
    pub left: String,
    /// Right-hand match.
    pub right: String,
}

/// A cloze paragraph with `[[id]]` markers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cloze {
    /// Paragraph text containing one marker per blank.
    pub text: String,
    /// Blanks and their answers.
    pub blanks: Vec<ClozeBlank>,
}

/// One blank of a cloze paragraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClozeBlank {
    /// Identifier used in the `[[id]]` marker.
    pub id: String,
    /// Expected answer.
    pub answer: String,
}

impl Cloze {
    /// Returns the blank ids referenced by markers in `text`, in order of appearance.
    #[must_use]
    pub fn marker_ids(&self) -> Vec<String> {
        CLOZE_MARKER
            .captures_iter(&self.text)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }

    /// Renders the paragraph with each marker replaced by a numbered gap.
    #[must_use]
    pub fn render_with_gaps(&self) -> String {
        CLOZE_MARKER.replace_all(&self.text, "____ ($1)").into_owned()
    }
}

/// The single open-ended explanation prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplainPrompt {
    /// Prompt targeting one core concept.
    pub prompt: String,
}

// ============================================================================
// ExerciseBattery
// ============================================================================

/// The full set of generated exercises for one mastery attempt.
///
/// `multiple_choice` and `explain` are mandatory; the other slots are
/// expected but may be omitted by the generator. Deserialization applies the
/// same validation as [`ExerciseBattery::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawBattery")]
pub struct ExerciseBattery {
    /// Multiple-choice questions (non-empty).
    pub multiple_choice: Vec<MultipleChoiceQuestion>,

    /// Term/definition pairs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term_definition: Option<Vec<TermDefinition>>,

    /// Categorization exercise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categorize: Option<Categorize>,

    /// Pairing exercise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairing: Option<Vec<Pair>>,

    /// Cloze paragraph.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloze: Option<Cloze>,

    /// Explanation prompt.
    pub explain: ExplainPrompt,
}

/// Loosely-typed shape of the generator's document, before validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBattery {
    #[serde(default)]
    multiple_choice: Option<Vec<MultipleChoiceQuestion>>,
    #[serde(default)]
    term_definition: Option<Vec<TermDefinition>>,
    #[serde(default)]
    categorize: Option<Categorize>,
    #[serde(default)]
    pairing: Option<Vec<Pair>>,
    #[serde(default)]
    cloze: Option<Cloze>,
    #[serde(default)]
    explain: Option<ExplainPrompt>,
}

impl ExerciseBattery {
    /// Validates a generated document and turns it into a battery.
    ///
    /// # Errors
    ///
    /// Returns `MasteryError::MalformedBattery` if a mandatory slot is missing,
    /// a slot has the wrong shape, or any item fails validation.
    pub fn parse(document: serde_json::Value) -> Result<Self> {
        if !document.is_object() {
            return Err(MasteryError::malformed_battery(
                "expected a JSON object with exercise slots",
            ));
        }

        let raw: RawBattery = serde_json::from_value(document)
            .map_err(|e| MasteryError::malformed_battery(format!("unexpected slot shape: {e}")))?;
        Self::try_from(raw)
    }

    /// Returns the slots present in this battery, in presentation order.
    #[must_use]
    pub fn slots(&self) -> Vec<ExerciseSlot> {
        ExerciseSlot::ALL
            .into_iter()
            .filter(|slot| self.has_slot(*slot))
            .collect()
    }

    /// Returns `true` if the battery carries the given slot.
    #[must_use]
    pub const fn has_slot(&self, slot: ExerciseSlot) -> bool {
        match slot {
            ExerciseSlot::MultipleChoice | ExerciseSlot::Explain => true,
            ExerciseSlot::TermDefinition => self.term_definition.is_some(),
            ExerciseSlot::Categorize => self.categorize.is_some(),
            ExerciseSlot::Pairing => self.pairing.is_some(),
            ExerciseSlot::Cloze => self.cloze.is_some(),
        }
    }

    /// Number of items the battery asks the learner to answer.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.multiple_choice.len()
            + self.term_definition.as_ref().map_or(0, Vec::len)
            + self.categorize.as_ref().map_or(0, |c| c.items.len())
            + self.pairing.as_ref().map_or(0, Vec::len)
            + self.cloze.as_ref().map_or(0, |c| c.blanks.len())
            + 1
    }

    /// Every answer key in the battery, as plain strings.
    ///
    /// Used to check that generated answers are traceable to the lesson text.
    #[must_use]
    pub fn answer_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for q in &self.multiple_choice {
            if let Some(option) = q.options.get(q.correct_option_index) {
                keys.push(option.clone());
            }
        }
        if let Some(cards) = &self.term_definition {
            keys.extend(cards.iter().map(|c| c.definition.clone()));
        }
        if let Some(categorize) = &self.categorize {
            keys.extend(
                categorize
                    .items
                    .iter()
                    .filter_map(|i| categorize.buckets.get(i.correct_bucket_index).cloned()),
            );
        }
        if let Some(pairs) = &self.pairing {
            keys.extend(pairs.iter().map(|p| p.right.clone()));
        }
        if let Some(cloze) = &self.cloze {
            keys.extend(cloze.blanks.iter().map(|b| b.answer.clone()));
        }
        keys
    }

    fn validate(&self) -> Result<()> {
        if self.multiple_choice.is_empty() {
            return Err(MasteryError::malformed_battery("'multipleChoice' has no questions"));
        }
        for (i, q) in self.multiple_choice.iter().enumerate() {
            if q.question.trim().is_empty() {
                return Err(MasteryError::malformed_battery(format!(
                    "multipleChoice[{i}] has an empty question"
                )));
            }
            if q.options.len() < 2 {
                return Err(MasteryError::malformed_battery(format!(
                    "multipleChoice[{i}] needs at least 2 options, found {}",
                    q.options.len()
                )));
            }
            if q.correct_option_index >= q.options.len() {
                return Err(MasteryError::malformed_battery(format!(
                    "multipleChoice[{i}] correctOptionIndex {} is out of range",
                    q.correct_option_index
                )));
            }
        }

        if self.explain.prompt.trim().is_empty() {
            return Err(MasteryError::malformed_battery("'explain' prompt is empty"));
        }

        if let Some(cards) = &self.term_definition {
            if let Some(i) = cards
                .iter()
                .position(|c| c.term.trim().is_empty() || c.definition.trim().is_empty())
            {
                return Err(MasteryError::malformed_battery(format!(
                    "termDefinition[{i}] has an empty term or definition"
                )));
            }
        }

        if let Some(categorize) = &self.categorize {
            if categorize.buckets.len() != 2 {
                return Err(MasteryError::malformed_battery(format!(
                    "categorize needs exactly 2 buckets, found {}",
                    categorize.buckets.len()
                )));
            }
            if categorize.items.is_empty() {
                return Err(MasteryError::malformed_battery("categorize has no items"));
            }
            if let Some(i) = categorize
                .items
                .iter()
                .position(|item| item.correct_bucket_index >= categorize.buckets.len())
            {
                return Err(MasteryError::malformed_battery(format!(
                    "categorize.items[{i}] correctBucketIndex is out of range"
                )));
            }
        }

        if let Some(pairs) = &self.pairing {
            if pairs.is_empty() {
                return Err(MasteryError::malformed_battery("pairing has no pairs"));
            }
            if let Some(i) = pairs
                .iter()
                .position(|p| p.left.trim().is_empty() || p.right.trim().is_empty())
            {
                return Err(MasteryError::malformed_battery(format!(
                    "pairing[{i}] has an empty side"
                )));
            }
        }

        if let Some(cloze) = &self.cloze {
            if cloze.blanks.is_empty() {
                return Err(MasteryError::malformed_battery("cloze has no blanks"));
            }
            let markers: HashSet<String> = cloze.marker_ids().into_iter().collect();
            let mut seen = HashSet::new();
            for blank in &cloze.blanks {
                if blank.id.trim().is_empty() || blank.answer.trim().is_empty() {
                    return Err(MasteryError::malformed_battery(
                        "cloze blank has an empty id or answer",
                    ));
                }
                if !seen.insert(blank.id.as_str()) {
                    return Err(MasteryError::malformed_battery(format!(
                        "cloze blank id '{}' is duplicated",
                        blank.id
                    )));
                }
                if !markers.contains(&blank.id) {
                    return Err(MasteryError::malformed_battery(format!(
                        "cloze text has no [[{}]] marker",
                        blank.id
                    )));
                }
            }
        }

        Ok(())
    }
}

impl TryFrom<RawBattery> for ExerciseBattery {
    type Error = MasteryError;

    fn try_from(raw: RawBattery) -> Result<Self> {
        let multiple_choice = raw
            .multiple_choice
            .ok_or_else(|| MasteryError::malformed_battery("missing required slot 'multipleChoice'"))?;
        let explain = raw
            .explain
            .ok_or_else(|| MasteryError::malformed_battery("missing required slot 'explain'"))?;

        let battery = Self {
            multiple_choice,
            term_definition: raw.term_definition,
            categorize: raw.categorize,
            pairing: raw.pairing,
            cloze: raw.cloze,
            explain,
        };
        battery.validate()?;
        Ok(battery)
    }
}
