//! Response evaluator.
//!
//! Grading is a holistic judgment per mastery criterion, delegated to the
//! generation service. Answer keys are shared with the evaluator as context;
//! no local tally decides the outcome.

use serde_json::json;
use tracing::{debug, info, warn};

use crate::answers::AnswerSet;
use crate::battery::ExerciseBattery;
use crate::error::{MasteryError, Result};
use crate::generation::{ContentGenerator, GenerationPurpose, GenerationRequest};
use crate::prompts::EVALUATOR_PROMPT;
use crate::verdict::Verdict;

/// Grades `answers` against `criteria` and returns a validated verdict.
///
/// `answers` must be keyed to slots of `battery`, the battery that produced it.
///
/// # Errors
///
/// - `MasteryError::Precondition` if `criteria` is empty or `answers` does
///   not fit `battery` (no request is issued)
/// - `MasteryError::Transport` / `MasteryError::MalformedResponse` from the generator
/// - `MasteryError::InvalidVerdict` if the response breaks the verdict invariant
pub async fn evaluate<G>(
    generator: &G,
    criteria: &[String],
    answers: &AnswerSet,
    battery: &ExerciseBattery,
) -> Result<Verdict>
where
    G: ContentGenerator + ?Sized,
{
    if criteria.is_empty() {
        return Err(MasteryError::precondition(
            "evaluate",
            "at least one mastery criterion is required",
        ));
    }
    answers.check_against(battery)?;

    let context = json!({
        "mastery_criteria": criteria,
        "user_answers": answers.review_document(battery),
    });
    debug!(
        criteria = criteria.len(),
        attempted = answers.attempted_slots().len(),
        "Requesting evaluation"
    );

    let document = generator
        .generate(GenerationRequest::json(
            GenerationPurpose::Evaluate,
            EVALUATOR_PROMPT,
            context,
        ))
        .await?
        .into_json()?;

    let verdict = Verdict::parse(document).map_err(|e| {
        warn!(error = %e, "Evaluator returned an invalid verdict");
        e
    })?;

    info!(
        passed = verdict.passed(),
        gaps = verdict.gaps().len(),
        "Evaluation complete"
    );
    Ok(verdict)
}
