//! Learner answers for one battery, and the review document sent for grading.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::battery::{ExerciseBattery, ExerciseSlot};
use crate::error::{MasteryError, Result};

const OPERATION: &str = "submit_answers";

/// Learner-supplied answers, mirroring the slots of an [`ExerciseBattery`].
///
/// A missing slot means "not attempted": it counts against mastery but is
/// not an error. Within a slot, `None` entries are skipped items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSet {
    /// Selected option index per multiple-choice question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiple_choice: Option<Vec<Option<usize>>>,

    /// Learner's definition per term, in battery order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_definition: Option<Vec<String>>,

    /// Chosen bucket index per categorize item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categorize: Option<Vec<Option<usize>>>,

    /// Chosen right-hand index per left-hand pairing item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairing: Option<Vec<Option<usize>>>,

    /// Learner text per cloze blank id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloze: Option<BTreeMap<String, String>>,

    /// Free-text explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explain: Option<String>,
}

impl AnswerSet {
    /// Creates an empty answer set (nothing attempted).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the multiple-choice selections.
    #[must_use]
    pub fn with_multiple_choice(mut self, selections: Vec<Option<usize>>) -> Self {
        self.multiple_choice = Some(selections);
        self
    }

    /// Sets the term definitions.
    #[must_use]
    pub fn with_term_definitions(mut self, definitions: Vec<String>) -> Self {
        self.term_definition = Some(definitions);
        self
    }

    /// Sets the categorize bucket choices.
    #[must_use]
    pub fn with_categorize(mut self, buckets: Vec<Option<usize>>) -> Self {
        self.categorize = Some(buckets);
        self
    }

    /// Sets the pairing choices.
    #[must_use]
    pub fn with_pairing(mut self, matches: Vec<Option<usize>>) -> Self {
        self.pairing = Some(matches);
        self
    }

    /// Sets the cloze answers.
    #[must_use]
    pub fn with_cloze(mut self, answers: BTreeMap<String, String>) -> Self {
        self.cloze = Some(answers);
        self
    }

    /// Sets the free-text explanation.
    #[must_use]
    pub fn with_explanation(mut self, text: impl Into<String>) -> Self {
        self.explain = Some(text.into());
        self
    }

    /// Slots the learner supplied answers for.
    #[must_use]
    pub fn attempted_slots(&self) -> Vec<ExerciseSlot> {
        ExerciseSlot::ALL
            .into_iter()
            .filter(|slot| match slot {
                ExerciseSlot::MultipleChoice => self.multiple_choice.is_some(),
                ExerciseSlot::TermDefinition => self.term_definition.is_some(),
                ExerciseSlot::Categorize => self.categorize.is_some(),
                ExerciseSlot::Pairing => self.pairing.is_some(),
                ExerciseSlot::Cloze => self.cloze.is_some(),
                ExerciseSlot::Explain => self.explain.is_some(),
            })
            .collect()
    }

    /// Checks that every answer is keyed to an item of `battery`.
    ///
    /// # Errors
    ///
    /// Returns `MasteryError::Precondition` for answers to slots the battery
    /// lacks, more answers than items, out-of-range indices, or unknown cloze ids.
    pub fn check_against(&self, battery: &ExerciseBattery) -> Result<()> {
        for slot in self.attempted_slots() {
            if !battery.has_slot(slot) {
                return Err(MasteryError::precondition(
                    OPERATION,
                    format!("answers supplied for '{slot}', which the battery does not contain"),
                ));
            }
        }

        if let Some(selections) = &self.multiple_choice {
            check_len(ExerciseSlot::MultipleChoice, selections.len(), battery.multiple_choice.len())?;
            for (i, (selection, question)) in selections.iter().zip(&battery.multiple_choice).enumerate() {
                check_index(ExerciseSlot::MultipleChoice, i, *selection, question.options.len())?;
            }
        }

        if let (Some(definitions), Some(cards)) = (&self.term_definition, &battery.term_definition) {
            check_len(ExerciseSlot::TermDefinition, definitions.len(), cards.len())?;
        }

        if let (Some(choices), Some(categorize)) = (&self.categorize, &battery.categorize) {
            check_len(ExerciseSlot::Categorize, choices.len(), categorize.items.len())?;
            for (i, choice) in choices.iter().enumerate() {
                check_index(ExerciseSlot::Categorize, i, *choice, categorize.buckets.len())?;
            }
        }

        if let (Some(matches), Some(pairs)) = (&self.pairing, &battery.pairing) {
            check_len(ExerciseSlot::Pairing, matches.len(), pairs.len())?;
            for (i, choice) in matches.iter().enumerate() {
                check_index(ExerciseSlot::Pairing, i, *choice, pairs.len())?;
            }
        }

        if let (Some(answers), Some(cloze)) = (&self.cloze, &battery.cloze) {
            if let Some(unknown) = answers
                .keys()
                .find(|id| !cloze.blanks.iter().any(|b| &b.id == *id))
            {
                return Err(MasteryError::precondition(
                    OPERATION,
                    format!("cloze answer for unknown blank '{unknown}'"),
                ));
            }
        }

        Ok(())
    }

    /// Joins every battery item with the learner's response.
    ///
    /// Answer keys are included as context for the evaluator; grading itself
    /// is a holistic judgment, not a local tally.
    #[must_use]
    pub fn review_document(&self, battery: &ExerciseBattery) -> Value {
        let mut doc = serde_json::Map::new();

        let mc: Vec<Value> = battery
            .multiple_choice
            .iter()
            .enumerate()
            .map(|(i, q)| {
                let selected = self
                    .multiple_choice
                    .as_ref()
                    .and_then(|s| s.get(i).copied().flatten());
                json!({
                    "question": q.question,
                    "options": q.options,
                    "selected_index": selected,
                    "selected_option": selected.and_then(|s| q.options.get(s)),
                    "correct_index": q.correct_option_index,
                    "correct_option": q.options.get(q.correct_option_index),
                })
            })
            .collect();
        doc.insert(
            "multipleChoice".into(),
            slot_entry(self.multiple_choice.is_some(), mc),
        );

        if let Some(cards) = &battery.term_definition {
            let responses: Vec<Value> = cards
                .iter()
                .enumerate()
                .map(|(i, card)| {
                    json!({
                        "term": card.term,
                        "expected_definition": card.definition,
                        "learner_definition": self.term_definition.as_ref().and_then(|d| d.get(i)),
                    })
                })
                .collect();
            doc.insert(
                "termDefinition".into(),
                slot_entry(self.term_definition.is_some(), responses),
            );
        }

        if let Some(categorize) = &battery.categorize {
            let responses: Vec<Value> = categorize
                .items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let chosen = self
                        .categorize
                        .as_ref()
                        .and_then(|c| c.get(i).copied().flatten());
                    json!({
                        "item": item.text,
                        "learner_bucket": chosen.and_then(|b| categorize.buckets.get(b)),
                        "correct_bucket": categorize.buckets.get(item.correct_bucket_index),
                    })
                })
                .collect();
            doc.insert(
                "categorize".into(),
                slot_entry(self.categorize.is_some(), responses),
            );
        }

        if let Some(pairs) = &battery.pairing {
            let responses: Vec<Value> = pairs
                .iter()
                .enumerate()
                .map(|(i, pair)| {
                    let chosen = self
                        .pairing
                        .as_ref()
                        .and_then(|p| p.get(i).copied().flatten());
                    json!({
                        "left": pair.left,
                        "learner_match": chosen.and_then(|c| pairs.get(c)).map(|p| &p.right),
                        "correct_match": pair.right,
                    })
                })
                .collect();
            doc.insert(
                "pairing".into(),
                slot_entry(self.pairing.is_some(), responses),
            );
        }

        if let Some(cloze) = &battery.cloze {
            let responses: Vec<Value> = cloze
                .blanks
                .iter()
                .map(|blank| {
                    json!({
                        "id": blank.id,
                        "learner_input": self.cloze.as_ref().and_then(|c| c.get(&blank.id)),
                        "correct_answer": blank.answer,
                    })
                })
                .collect();
            let mut entry = slot_entry(self.cloze.is_some(), responses);
            entry["text"] = json!(cloze.text);
            doc.insert("cloze".into(), entry);
        }

        doc.insert(
            "explain".into(),
            json!({
                "attempted": self.explain.is_some(),
                "prompt": battery.explain.prompt,
                "learner_explanation": self.explain,
            }),
        );

        Value::Object(doc)
    }
}

fn slot_entry(attempted: bool, responses: Vec<Value>) -> Value {
    json!({ "attempted": attempted, "responses": responses })
}

fn check_len(slot: ExerciseSlot, answers: usize, items: usize) -> Result<()> {
    if answers > items {
        return Err(MasteryError::precondition(
            OPERATION,
            format!("{answers} answers supplied for '{slot}', which has {items} items"),
        ));
    }
    Ok(())
}

fn check_index(slot: ExerciseSlot, item: usize, choice: Option<usize>, bound: usize) -> Result<()> {
    match choice {
        Some(c) if c >= bound => Err(MasteryError::precondition(
            OPERATION,
            format!("'{slot}' item {item}: selection {c} is out of range (0..{bound})"),
        )),
        _ => Ok(()),
    }
}
