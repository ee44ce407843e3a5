//! Remediation synthesizer.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::error::{MasteryError, Result};
use crate::generation::{ContentGenerator, GenerationPurpose, GenerationRequest};
use crate::lesson::LessonContext;
use crate::prompts::REMEDIATOR_PROMPT;

/// Targeted re-teaching produced after a failed attempt.
///
/// Never persisted by the loop; the caller decides whether to store or show it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationContent {
    /// Attempt whose failure this remediation addresses.
    pub attempt: u32,
    /// Gaps the remediation is scoped to.
    pub gaps: Vec<String>,
    /// Markdown text from the generator.
    pub markdown: String,
}

/// Produces remediation for `gaps`, using `lesson` as the original context.
///
/// # Errors
///
/// - `MasteryError::Precondition` if `gaps` is empty (no request is issued)
/// - `MasteryError::Transport` from the generator
/// - `MasteryError::MalformedResponse` if the generator returned blank text
pub async fn remediate<G>(
    generator: &G,
    lesson: &LessonContext,
    gaps: &[String],
    attempt: u32,
) -> Result<RemediationContent>
where
    G: ContentGenerator + ?Sized,
{
    if gaps.is_empty() {
        return Err(MasteryError::precondition(
            "remediate",
            "no gaps to remediate; the learner passed",
        ));
    }

    let context = json!({
        "original_lesson": lesson,
        "identified_gaps": gaps,
    });
    debug!(attempt, gaps = gaps.len(), "Requesting remediation");

    let markdown = generator
        .generate(GenerationRequest::text(
            GenerationPurpose::Remediate,
            REMEDIATOR_PROMPT,
            context,
        ))
        .await?
        .into_text();

    if markdown.trim().is_empty() {
        return Err(MasteryError::malformed_response(
            "remediation text is empty",
        ));
    }

    info!(attempt, chars = markdown.len(), "Remediation ready");
    Ok(RemediationContent {
        attempt,
        gaps: gaps.to_vec(),
        markdown,
    })
}
