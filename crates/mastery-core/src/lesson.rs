//! Lesson context handed to the mastery loop.
//!
//! A lesson is produced upstream by the lesson generator and is immutable for
//! the duration of a mastery attempt. After a failed attempt the controller
//! derives an augmented copy via [`LessonContext::with_remediation`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MasteryError, Result};
use crate::remediation::RemediationContent;

/// Maximum allowed lesson file size in bytes (100KB).
pub const MAX_LESSON_SIZE: u64 = 100 * 1024;

/// Maximum number of mastery criteria a lesson may carry.
pub const MAX_MASTERY_CRITERIA: usize = 5;

/// The taught material and the bar the learner must clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonContext {
    /// Lesson title.
    pub title: String,

    /// The taught material; the only source of truth for generated exercises.
    pub content_text: String,

    /// Ordered competency statements the learner must demonstrate.
    pub mastery_criteria: Vec<String>,
}

impl LessonContext {
    /// Creates a new lesson context.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        content_text: impl Into<String>,
        mastery_criteria: Vec<String>,
    ) -> Self {
        Self {
            title: title.into(),
            content_text: content_text.into(),
            mastery_criteria,
        }
    }

    /// The introductory photosynthesis lesson used by the dry run and tests.
    #[must_use]
    pub fn sample() -> Self {
        Self::new(
            "Introduction to Photosynthesis",
            "Photosynthesis is the process by which plants use sunlight, water, and carbon \
             dioxide to create oxygen and energy in the form of sugar. It takes place in the \
             chloroplasts, which contain chlorophyll.",
            vec![
                "Define the inputs and outputs of photosynthesis".to_string(),
                "Identify where photosynthesis occurs in the cell".to_string(),
            ],
        )
    }

    /// Loads a lesson from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `MasteryError::LessonNotFound` if the file doesn't exist,
    /// `MasteryError::LessonParseError` if it is too large or not a lesson
    /// document, and the validation error from [`LessonContext::validate`]
    /// if its content is unusable.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let metadata = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MasteryError::lesson_not_found(path)
            } else {
                MasteryError::Io(e)
            }
        })?;

        if metadata.len() > MAX_LESSON_SIZE {
            return Err(MasteryError::lesson_parse(
                path,
                format!(
                    "file is {}KB, limit is {}KB",
                    metadata.len() / 1024,
                    MAX_LESSON_SIZE / 1024
                ),
            ));
        }

        let contents = std::fs::read_to_string(path)?;
        let lesson: Self = serde_json::from_str(&contents)
            .map_err(|e| MasteryError::lesson_parse(path, e.to_string()))?;
        lesson.validate()?;
        Ok(lesson)
    }

    /// Checks the input constraints of the battery builder.
    ///
    /// - `content_text` must not be blank
    /// - `mastery_criteria` must have between 1 and 5 non-blank entries
    ///
    /// # Errors
    ///
    /// Returns `MasteryError::Precondition` describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.content_text.trim().is_empty() {
            return Err(MasteryError::precondition(
                "build_battery",
                "lesson content_text must not be empty",
            ));
        }

        let count = self.mastery_criteria.len();
        if count == 0 || count > MAX_MASTERY_CRITERIA {
            return Err(MasteryError::precondition(
                "build_battery",
                format!("lesson must have 1-{MAX_MASTERY_CRITERIA} mastery criteria, found {count}"),
            ));
        }

        if let Some(index) = self
            .mastery_criteria
            .iter()
            .position(|c| c.trim().is_empty())
        {
            return Err(MasteryError::precondition(
                "build_battery",
                format!("mastery criterion {index} is blank"),
            ));
        }

        Ok(())
    }

    /// Returns a copy whose `content_text` is extended with remediation material.
    ///
    /// Title and criteria are kept; the original text stays as a prefix.
    #[must_use]
    pub fn with_remediation(&self, remediation: &RemediationContent) -> Self {
        let mut content_text = self.content_text.clone();
        content_text.push_str(&format!(
            "\n\n---\n\n## Remediation (attempt {})\n\n{}",
            remediation.attempt,
            remediation.markdown.trim()
        ));

        Self {
            title: self.title.clone(),
            content_text,
            mastery_criteria: self.mastery_criteria.clone(),
        }
    }
}
