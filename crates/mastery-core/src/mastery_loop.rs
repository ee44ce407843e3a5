//! The mastery loop controller.
//!
//! [`MasteryLoop`] sequences build -> answer -> evaluate -> remediate until the
//! learner passes or the caller aborts. It holds no session data itself:
//! every call takes the caller-owned [`LoopState`], and a transition is
//! committed only after all of its collaborator calls succeeded. A failed
//! call leaves the state untouched, so the same transition can be retried.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::answers::AnswerSet;
use crate::battery::ExerciseBattery;
use crate::builder::build_battery;
use crate::error::{MasteryError, Result};
use crate::evaluator::evaluate;
use crate::events::{EventBroadcaster, MasteryEvent};
use crate::generation::ContentGenerator;
use crate::lesson::LessonContext;
use crate::loop_state::{AttemptRecord, LoopState, SessionStatus};
use crate::remediation::{remediate, RemediationContent};
use crate::verdict::Verdict;

/// Drives mastery sessions against a content generator.
pub struct MasteryLoop<G> {
    generator: G,
    events: Option<EventBroadcaster>,
}

impl<G: ContentGenerator> MasteryLoop<G> {
    /// Creates a loop that talks to `generator`.
    #[must_use]
    pub const fn new(generator: G) -> Self {
        Self {
            generator,
            events: None,
        }
    }

    /// Emits session events on `broadcaster`.
    #[must_use]
    pub fn with_events(mut self, broadcaster: EventBroadcaster) -> Self {
        self.events = Some(broadcaster);
        self
    }

    /// The underlying generator.
    #[must_use]
    pub const fn generator(&self) -> &G {
        &self.generator
    }

    fn emit(&self, event: MasteryEvent) {
        if let Some(events) = &self.events {
            events.send(event);
        }
    }

    /// Creates a session for `lesson` and builds its first battery.
    ///
    /// The returned state is in `AwaitingAnswers` with an attempt count of 1.
    ///
    /// # Errors
    ///
    /// Propagates builder errors unchanged; no session is created.
    pub async fn start_session(
        &self,
        lesson: LessonContext,
    ) -> Result<(LoopState, ExerciseBattery)> {
        let mut state = LoopState::new(lesson);
        let battery = build_battery(&self.generator, state.current_lesson()).await?;

        let lesson = state.current_lesson().clone();
        state.commit_battery(lesson, battery.clone())?;

        info!(
            title = %state.original_lesson().title,
            attempt = state.attempt_count(),
            status = %state.status(),
            "Mastery session started"
        );
        self.emit(MasteryEvent::session_started(
            &state.original_lesson().title,
            state.original_lesson().mastery_criteria.len(),
        ));
        self.emit(MasteryEvent::battery_ready(
            state.attempt_count(),
            battery.item_count(),
        ));
        Ok((state, battery))
    }

    /// Grades `answers` for the current battery.
    ///
    /// On a failing verdict, remediation for this attempt's gaps is produced
    /// in the same transition and the session moves to `Remediating`; on a
    /// pass it moves to `Passed`.
    ///
    /// # Errors
    ///
    /// - `MasteryError::Precondition` unless the session is `AwaitingAnswers`,
    ///   or if `answers` does not fit the battery
    /// - Evaluator and remediator errors, unchanged
    ///
    /// On error the state is left as it was.
    pub async fn submit_answers(
        &self,
        state: &mut LoopState,
        answers: &AnswerSet,
    ) -> Result<Verdict> {
        warn_on_precondition(state.require("submit_answers", SessionStatus::AwaitingAnswers))?;
        let battery = state.current_battery().ok_or_else(|| {
            MasteryError::precondition("submit_answers", "session has no battery")
        })?;

        let verdict = evaluate(
            &self.generator,
            &state.original_lesson().mastery_criteria,
            answers,
            battery,
        )
        .await?;

        let remediation = if verdict.passed() {
            None
        } else {
            Some(
                remediate(
                    &self.generator,
                    state.original_lesson(),
                    verdict.gaps(),
                    state.attempt_count(),
                )
                .await?,
            )
        };

        state.commit_verdict(verdict.clone(), remediation)?;

        let attempt = state.attempt_count();
        info!(
            attempt,
            status = %state.status(),
            passed = verdict.passed(),
            gaps = verdict.gaps().len(),
            "Attempt graded"
        );
        self.emit(MasteryEvent::verdict(
            attempt,
            verdict.passed(),
            verdict.gaps().to_vec(),
        ));
        if verdict.passed() {
            self.emit(MasteryEvent::session_complete(attempt));
        } else {
            self.emit(MasteryEvent::remediation_ready(
                attempt,
                verdict.gaps().to_vec(),
            ));
        }
        Ok(verdict)
    }

    /// Returns the remediation for the last failed attempt.
    ///
    /// `None` while the session is not (yet) remediating.
    ///
    /// # Errors
    ///
    /// Returns `MasteryError::Precondition` once the session is `Passed` or `Aborted`.
    pub fn get_remediation<'a>(
        &self,
        state: &'a LoopState,
    ) -> Result<Option<&'a RemediationContent>> {
        match state.status() {
            SessionStatus::Remediating => Ok(state.remediation()),
            status if status.is_terminal() => warn_on_precondition(Err(
                MasteryError::precondition(
                    "get_remediation",
                    format!("session is '{status}'; remediation is only available while remediating"),
                ),
            )),
            _ => Ok(None),
        }
    }

    /// Builds the next battery from the remediated lesson.
    ///
    /// The current lesson is extended (never replaced) with the remediation
    /// text, then a fresh battery is built from it.
    ///
    /// # Errors
    ///
    /// - `MasteryError::Precondition` unless the session is `Remediating`
    /// - Builder errors, unchanged; the session stays `Remediating`
    pub async fn retry(&self, state: &mut LoopState) -> Result<ExerciseBattery> {
        warn_on_precondition(state.require("retry", SessionStatus::Remediating))?;
        let remediation = state.remediation().ok_or_else(|| {
            MasteryError::precondition("retry", "session has no remediation to build on")
        })?;

        let lesson = state.current_lesson().with_remediation(remediation);
        let battery = build_battery(&self.generator, &lesson).await?;
        state.commit_battery(lesson, battery.clone())?;

        info!(
            attempt = state.attempt_count(),
            status = %state.status(),
            content_chars = state.current_lesson().content_text.len(),
            "Retrying with remediated lesson"
        );
        self.emit(MasteryEvent::battery_ready(
            state.attempt_count(),
            battery.item_count(),
        ));
        Ok(battery)
    }

    /// Stops the session, e.g. at a caller-imposed attempt ceiling.
    ///
    /// # Errors
    ///
    /// Returns `MasteryError::Precondition` if the session is already terminal.
    pub fn abort(&self, state: &mut LoopState, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        warn_on_precondition(state.commit_abort(reason.clone()))?;

        info!(
            attempt = state.attempt_count(),
            status = %state.status(),
            reason = %reason,
            "Mastery session aborted"
        );
        self.emit(MasteryEvent::session_aborted(reason, state.attempt_count()));
        Ok(())
    }
}

fn warn_on_precondition<T>(result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        if e.is_precondition() {
            warn!(error = %e, "Rejected call");
        }
    }
    result
}

// ============================================================================
// Autonomous driver
// ============================================================================

/// A learner that can answer inline, for driving a whole session.
#[async_trait]
pub trait Learner: Send {
    /// Answers a battery.
    ///
    /// # Errors
    ///
    /// Any error aborts the run and is returned from [`run_to_mastery`].
    async fn answer(&mut self, battery: &ExerciseBattery) -> Result<AnswerSet>;

    /// Studies remediation before the next attempt.
    ///
    /// # Errors
    ///
    /// Any error aborts the run and is returned from [`run_to_mastery`].
    async fn review(&mut self, _remediation: &RemediationContent) -> Result<()> {
        Ok(())
    }
}

/// How a driven session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasteryOutcome {
    /// Whether the learner reached mastery.
    pub passed: bool,
    /// Batteries built.
    pub attempts: u32,
    /// The final verdict.
    pub verdict: Verdict,
    /// Every graded attempt.
    pub history: Vec<AttemptRecord>,
    /// Set when the session stopped at the attempt ceiling.
    pub aborted_reason: Option<String>,
}

/// Runs a session until `learner` passes, or until `max_attempts` failures.
///
/// With `max_attempts = None` there is no ceiling.
///
/// # Errors
///
/// Returns the first error from the loop or the learner.
pub async fn run_to_mastery<G, L>(
    mastery: &MasteryLoop<G>,
    lesson: LessonContext,
    learner: &mut L,
    max_attempts: Option<u32>,
) -> Result<MasteryOutcome>
where
    G: ContentGenerator,
    L: Learner + ?Sized,
{
    let (mut state, mut battery) = mastery.start_session(lesson).await?;

    loop {
        let answers = learner.answer(&battery).await?;
        let verdict = mastery.submit_answers(&mut state, &answers).await?;

        if verdict.passed() {
            return Ok(MasteryOutcome {
                passed: true,
                attempts: state.attempt_count(),
                verdict,
                history: state.history().to_vec(),
                aborted_reason: None,
            });
        }

        if let Some(remediation) = mastery.get_remediation(&state)? {
            learner.review(remediation).await?;
        }

        if let Some(max) = max_attempts {
            if state.ceiling_reached(max) {
                let reason = format!("attempt ceiling of {max} reached without mastery");
                mastery.abort(&mut state, reason.clone())?;
                return Ok(MasteryOutcome {
                    passed: false,
                    attempts: state.attempt_count(),
                    verdict,
                    history: state.history().to_vec(),
                    aborted_reason: Some(reason),
                });
            }
        }

        battery = mastery.retry(&mut state).await?;
    }
}
