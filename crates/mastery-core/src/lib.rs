//! Mastery verification loop.
//!
//! Turns lesson content into a battery of exercises, grades a learner's
//! answers against the lesson's mastery criteria, and on failure produces
//! targeted remediation and re-tests until the learner passes.

pub mod answers;
pub mod battery;
pub mod builder;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod generation;
pub mod lesson;
pub mod loop_state;
pub mod mastery_loop;
pub mod prompts;
pub mod remediation;
pub mod verdict;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]
mod test_support;

pub use answers::AnswerSet;
pub use battery::{
    Categorize, CategorizeItem, Cloze, ClozeBlank, ExerciseBattery, ExerciseSlot, ExplainPrompt,
    MultipleChoiceQuestion, Pair, TermDefinition,
};
pub use builder::build_battery;
pub use config::{Config, RetryConfig, SearchConfig};
pub use error::{MasteryError, Result, TransportErrorKind};
pub use evaluator::evaluate;
pub use events::{EventBroadcaster, MasteryEvent};
pub use generation::{ContentGenerator, GeneratedDocument, GenerationPurpose, GenerationRequest};
pub use lesson::{LessonContext, MAX_LESSON_SIZE, MAX_MASTERY_CRITERIA};
pub use loop_state::{AttemptRecord, LoopState, SessionStatus};
pub use mastery_loop::{run_to_mastery, Learner, MasteryLoop, MasteryOutcome};
pub use remediation::{remediate, RemediationContent};
pub use verdict::Verdict;
