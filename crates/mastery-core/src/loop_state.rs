//! Session state for the mastery loop.
//!
//! A [`LoopState`] is owned by the caller and threaded through every
//! transition of [`crate::MasteryLoop`]. Fields are read through accessors;
//! only the loop itself moves a session between states, and only after the
//! collaborator calls for that transition have succeeded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::battery::ExerciseBattery;
use crate::error::{MasteryError, Result};
use crate::lesson::LessonContext;
use crate::remediation::RemediationContent;
use crate::verdict::Verdict;

// ============================================================================
// SessionStatus
// ============================================================================

/// Where a mastery session currently is.
///
/// - `Start` -> `BatteryReady` -> `AwaitingAnswers` -> `Evaluated`
/// - From `Evaluated`:
///   - `Passed` (terminal)
///   - `Remediating` -> `BatteryReady` (retry)
/// - Any non-terminal state -> `Aborted` (terminal)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session created, no battery built yet.
    #[default]
    Start,
    /// A battery was built for the current lesson.
    BatteryReady,
    /// The battery is with the learner.
    AwaitingAnswers,
    /// Answers were graded.
    Evaluated,
    /// The learner met every criterion.
    Passed,
    /// The learner failed; remediation is available.
    Remediating,
    /// The caller stopped the session.
    Aborted,
}

impl SessionStatus {
    /// Returns `true` for `Passed` and `Aborted`.
    ///
    /// # Examples
    ///
    /// ```
    /// use mastery_core::SessionStatus;
    ///
    /// assert!(SessionStatus::Passed.is_terminal());
    /// assert!(SessionStatus::Aborted.is_terminal());
    /// assert!(!SessionStatus::Remediating.is_terminal());
    /// ```
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Aborted)
    }

    /// Returns `true` when the session is waiting on the caller.
    ///
    /// `AwaitingAnswers` waits for an answer set; `Remediating` waits for the
    /// caller to present remediation and request a retry.
    #[must_use]
    pub const fn is_waiting(&self) -> bool {
        matches!(self, Self::AwaitingAnswers | Self::Remediating)
    }

    /// Returns `true` if moving from `self` to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Start | Self::Remediating, Self::BatteryReady)
            | (Self::BatteryReady, Self::AwaitingAnswers)
            | (Self::AwaitingAnswers, Self::Evaluated)
            | (Self::Evaluated, Self::Passed | Self::Remediating) => true,
            (from, Self::Aborted) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::BatteryReady => "battery_ready",
            Self::AwaitingAnswers => "awaiting_answers",
            Self::Evaluated => "evaluated",
            Self::Passed => "passed",
            Self::Remediating => "remediating",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

// ============================================================================
// AttemptRecord
// ============================================================================

/// One graded attempt, kept for diagnostics. Never used for scoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Attempt number (1-indexed).
    pub attempt: u32,

    /// The verdict for this attempt.
    pub verdict: Verdict,

    /// When the attempt's battery was handed out.
    pub started_at: DateTime<Utc>,

    /// When the answers were graded.
    pub evaluated_at: DateTime<Utc>,
}

// ============================================================================
// LoopState
// ============================================================================

/// Working memory of one learner-lesson mastery session.
///
/// Serializable so a caller can park a session across the human-timescale
/// wait for answers. A restored session must be consistent with its status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLoopState")]
pub struct LoopState {
    status: SessionStatus,
    attempt_count: u32,
    original_lesson: LessonContext,
    current_lesson: LessonContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_battery: Option<ExerciseBattery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remediation: Option<RemediationContent>,
    history: Vec<AttemptRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    abort_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attempt_started_at: Option<DateTime<Utc>>,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Serialized form of [`LoopState`], checked before it becomes a session.
#[derive(Deserialize)]
struct RawLoopState {
    status: SessionStatus,
    attempt_count: u32,
    original_lesson: LessonContext,
    current_lesson: LessonContext,
    #[serde(default)]
    current_battery: Option<ExerciseBattery>,
    #[serde(default)]
    remediation: Option<RemediationContent>,
    #[serde(default)]
    history: Vec<AttemptRecord>,
    #[serde(default)]
    abort_reason: Option<String>,
    #[serde(default)]
    attempt_started_at: Option<DateTime<Utc>>,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RawLoopState> for LoopState {
    type Error = MasteryError;

    fn try_from(raw: RawLoopState) -> Result<Self> {
        let inconsistent = |message: String| MasteryError::precondition("restore_session", message);

        if raw.current_lesson.mastery_criteria != raw.original_lesson.mastery_criteria {
            return Err(inconsistent(
                "current lesson criteria differ from the original lesson".into(),
            ));
        }

        let mut previous = 0;
        for record in &raw.history {
            if record.attempt <= previous || record.attempt > raw.attempt_count {
                return Err(inconsistent(format!(
                    "history attempt {} is out of order for {} attempts",
                    record.attempt, raw.attempt_count
                )));
            }
            previous = record.attempt;
        }

        let last_passed = raw.history.last().map(|r| r.verdict.passed());
        let consistent = match raw.status {
            SessionStatus::Start => raw.attempt_count == 0 && raw.history.is_empty(),
            SessionStatus::BatteryReady | SessionStatus::AwaitingAnswers => {
                raw.current_battery.is_some()
            }
            SessionStatus::Evaluated => true,
            SessionStatus::Passed => last_passed == Some(true),
            SessionStatus::Remediating => raw.remediation.is_some() && last_passed == Some(false),
            SessionStatus::Aborted => raw.abort_reason.is_some(),
        };
        if !consistent {
            return Err(inconsistent(format!(
                "session data does not match status '{}'",
                raw.status
            )));
        }

        Ok(Self {
            status: raw.status,
            attempt_count: raw.attempt_count,
            original_lesson: raw.original_lesson,
            current_lesson: raw.current_lesson,
            current_battery: raw.current_battery,
            remediation: raw.remediation,
            history: raw.history,
            abort_reason: raw.abort_reason,
            attempt_started_at: raw.attempt_started_at,
            started_at: raw.started_at,
            updated_at: raw.updated_at,
        })
    }
}

impl LoopState {
    /// Creates a session in `Start` for `lesson`.
    #[must_use]
    pub fn new(lesson: LessonContext) -> Self {
        let now = Utc::now();
        Self {
            status: SessionStatus::Start,
            attempt_count: 0,
            current_lesson: lesson.clone(),
            original_lesson: lesson,
            current_battery: None,
            remediation: None,
            history: Vec::new(),
            abort_reason: None,
            attempt_started_at: None,
            started_at: now,
            updated_at: now,
        }
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// Number of batteries built so far.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// The lesson the session started with.
    #[must_use]
    pub const fn original_lesson(&self) -> &LessonContext {
        &self.original_lesson
    }

    /// The lesson the next battery is built from, including remediation so far.
    #[must_use]
    pub const fn current_lesson(&self) -> &LessonContext {
        &self.current_lesson
    }

    /// The battery for the current attempt.
    #[must_use]
    pub const fn current_battery(&self) -> Option<&ExerciseBattery> {
        self.current_battery.as_ref()
    }

    /// Remediation for the most recent failed attempt, while `Remediating`.
    #[must_use]
    pub const fn remediation(&self) -> Option<&RemediationContent> {
        self.remediation.as_ref()
    }

    /// Graded attempts, oldest first.
    #[must_use]
    pub fn history(&self) -> &[AttemptRecord] {
        &self.history
    }

    /// The most recent verdict.
    #[must_use]
    pub fn last_verdict(&self) -> Option<&Verdict> {
        self.history.last().map(|record| &record.verdict)
    }

    /// Why the session was aborted, if it was.
    #[must_use]
    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    /// Returns `true` if `max_attempts` batteries have been built.
    ///
    /// The loop imposes no ceiling itself; callers use this to decide when
    /// to abort or escalate.
    #[must_use]
    pub const fn ceiling_reached(&self, max_attempts: u32) -> bool {
        self.attempt_count >= max_attempts
    }

    /// Returns `true` if the session is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// When the session was created.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the session last changed.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the duration since the session started.
    #[must_use]
    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }

    // ------------------------------------------------------------------------
    // Transitions (applied by the loop after collaborator calls succeed)
    // ------------------------------------------------------------------------

    /// Fails with `Precondition` unless the session is in `expected`.
    pub(crate) fn require(&self, operation: &str, expected: SessionStatus) -> Result<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(MasteryError::precondition(
                operation,
                format!("session is '{}', expected '{expected}'", self.status),
            ))
        }
    }

    fn transition(&mut self, next: SessionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(MasteryError::precondition(
                "transition",
                format!("cannot move from '{}' to '{next}'", self.status),
            ));
        }
        if next == SessionStatus::BatteryReady {
            self.attempt_count += 1;
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Installs a new battery and hands it out (`BatteryReady` -> `AwaitingAnswers`).
    ///
    /// `lesson` replaces the current lesson; it is the lesson the battery was built from.
    pub(crate) fn commit_battery(
        &mut self,
        lesson: LessonContext,
        battery: ExerciseBattery,
    ) -> Result<()> {
        self.transition(SessionStatus::BatteryReady)?;
        self.current_lesson = lesson;
        self.current_battery = Some(battery);
        self.remediation = None;
        self.attempt_started_at = Some(self.updated_at);
        self.transition(SessionStatus::AwaitingAnswers)
    }

    /// Records a graded attempt (`AwaitingAnswers` -> `Evaluated` -> `Passed`/`Remediating`).
    pub(crate) fn commit_verdict(
        &mut self,
        verdict: Verdict,
        remediation: Option<RemediationContent>,
    ) -> Result<()> {
        let next = if verdict.passed() {
            SessionStatus::Passed
        } else {
            SessionStatus::Remediating
        };
        if next == SessionStatus::Remediating && remediation.is_none() {
            return Err(MasteryError::precondition(
                "submit_answers",
                "a failed attempt needs remediation before it can be recorded",
            ));
        }

        self.transition(SessionStatus::Evaluated)?;
        let evaluated_at = self.updated_at;
        self.history.push(AttemptRecord {
            attempt: self.attempt_count,
            verdict,
            started_at: self.attempt_started_at.unwrap_or(evaluated_at),
            evaluated_at,
        });
        self.remediation = remediation;
        self.transition(next)
    }

    /// Moves the session to `Aborted`.
    pub(crate) fn commit_abort(&mut self, reason: String) -> Result<()> {
        if self.status.is_terminal() {
            return Err(MasteryError::precondition(
                "abort",
                format!("session is already '{}'", self.status),
            ));
        }
        self.transition(SessionStatus::Aborted)?;
        self.abort_reason = Some(reason);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
