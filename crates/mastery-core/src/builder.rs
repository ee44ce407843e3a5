//! Exercise battery builder.

use serde_json::json;
use tracing::{debug, info, warn};

use crate::battery::ExerciseBattery;
use crate::error::Result;
use crate::generation::{ContentGenerator, GenerationPurpose, GenerationRequest};
use crate::lesson::LessonContext;
use crate::prompts::BATTERY_BUILDER_PROMPT;

/// Generates a fresh exercise battery for `lesson`.
///
/// Issues exactly one request to the generator. The response is validated at
/// the boundary; nothing is defaulted or repaired.
///
/// # Errors
///
/// - `MasteryError::Precondition` if the lesson has no content or an invalid
///   number of mastery criteria (no request is issued)
/// - `MasteryError::Transport` / `MasteryError::MalformedResponse` from the generator
/// - `MasteryError::MalformedBattery` if mandatory slots are missing or items are invalid
pub async fn build_battery<G>(generator: &G, lesson: &LessonContext) -> Result<ExerciseBattery>
where
    G: ContentGenerator + ?Sized,
{
    lesson.validate()?;

    let context = json!({
        "title": lesson.title,
        "content_text": lesson.content_text,
        "mastery_criteria": lesson.mastery_criteria,
    });
    debug!(
        title = %lesson.title,
        content_chars = lesson.content_text.len(),
        criteria = lesson.mastery_criteria.len(),
        "Requesting exercise battery"
    );

    let document = generator
        .generate(GenerationRequest::json(
            GenerationPurpose::BuildBattery,
            BATTERY_BUILDER_PROMPT,
            context,
        ))
        .await?
        .into_json()?;

    let battery = ExerciseBattery::parse(document).map_err(|e| {
        warn!(error = %e, "Generated battery failed validation");
        e
    })?;

    info!(
        slots = battery.slots().len(),
        items = battery.item_count(),
        "Exercise battery ready"
    );
    Ok(battery)
}
