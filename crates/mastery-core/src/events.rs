//! Session events and broadcasting for observing the mastery loop.
//!
//! # Event Types
//!
//! - `session_started` - A session was created for a lesson
//! - `battery_ready` - A battery was handed to the learner
//! - `verdict` - An attempt was graded
//! - `remediation_ready` - Remediation was produced for a failed attempt
//! - `session_complete` - The learner passed
//! - `session_aborted` - The caller stopped the session
//!
//! # Example
//!
//! ```
//! use mastery_core::events::{EventBroadcaster, MasteryEvent};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(16);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(MasteryEvent::battery_ready(1, 9));
//!
//! if let Ok(event) = receiver.recv().await {
//!     assert_eq!(event.event_name(), "battery_ready");
//! }
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `session_started` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStartedPayload {
    /// Title of the lesson under test.
    pub lesson_title: String,
    /// Number of mastery criteria.
    pub criteria: usize,
    /// When the session started.
    pub timestamp: DateTime<Utc>,
}

/// Payload for the `battery_ready` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryReadyPayload {
    /// Attempt number (1-indexed).
    pub attempt: u32,
    /// Number of items in the battery.
    pub items: usize,
}

/// Payload for the `verdict` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictPayload {
    /// Attempt number.
    pub attempt: u32,
    /// Whether the learner passed.
    pub passed: bool,
    /// Concepts the learner missed.
    pub gaps: Vec<String>,
}

/// Payload for the `remediation_ready` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationReadyPayload {
    /// Attempt the remediation addresses.
    pub attempt: u32,
    /// Gaps the remediation covers.
    pub gaps: Vec<String>,
}

/// Payload for the `session_complete` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCompletePayload {
    /// Always `true`; completion means mastery.
    pub passed: bool,
    /// Attempts it took.
    pub attempts: u32,
}

/// Payload for the `session_aborted` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAbortedPayload {
    /// Caller-supplied reason.
    pub reason: String,
    /// Attempts made before the abort.
    pub attempts: u32,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Events emitted by the mastery loop.
///
/// Serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum MasteryEvent {
    /// A session was created.
    SessionStarted(SessionStartedPayload),
    /// A battery is with the learner.
    BatteryReady(BatteryReadyPayload),
    /// An attempt was graded.
    Verdict(VerdictPayload),
    /// Remediation is available.
    RemediationReady(RemediationReadyPayload),
    /// The learner passed.
    SessionComplete(SessionCompletePayload),
    /// The session was aborted.
    SessionAborted(SessionAbortedPayload),
}

impl MasteryEvent {
    /// Creates a `SessionStarted` event.
    #[must_use]
    pub fn session_started(lesson_title: impl Into<String>, criteria: usize) -> Self {
        Self::SessionStarted(SessionStartedPayload {
            lesson_title: lesson_title.into(),
            criteria,
            timestamp: Utc::now(),
        })
    }

    /// Creates a `BatteryReady` event.
    #[must_use]
    pub const fn battery_ready(attempt: u32, items: usize) -> Self {
        Self::BatteryReady(BatteryReadyPayload { attempt, items })
    }

    /// Creates a `Verdict` event.
    #[must_use]
    pub const fn verdict(attempt: u32, passed: bool, gaps: Vec<String>) -> Self {
        Self::Verdict(VerdictPayload {
            attempt,
            passed,
            gaps,
        })
    }

    /// Creates a `RemediationReady` event.
    #[must_use]
    pub const fn remediation_ready(attempt: u32, gaps: Vec<String>) -> Self {
        Self::RemediationReady(RemediationReadyPayload { attempt, gaps })
    }

    /// Creates a `SessionComplete` event.
    #[must_use]
    pub const fn session_complete(attempts: u32) -> Self {
        Self::SessionComplete(SessionCompletePayload {
            passed: true,
            attempts,
        })
    }

    /// Creates a `SessionAborted` event.
    #[must_use]
    pub fn session_aborted(reason: impl Into<String>, attempts: u32) -> Self {
        Self::SessionAborted(SessionAbortedPayload {
            reason: reason.into(),
            attempts,
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::SessionStarted(_) => "session_started",
            Self::BatteryReady(_) => "battery_ready",
            Self::Verdict(_) => "verdict",
            Self::RemediationReady(_) => "remediation_ready",
            Self::SessionComplete(_) => "session_complete",
            Self::SessionAborted(_) => "session_aborted",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts session events to every subscriber.
///
/// Uses a tokio broadcast channel. Events are not kept for late subscribers.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<MasteryEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster whose subscribers buffer up to `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber.
    ///
    /// A subscriber that falls behind receives a `Lagged` error and misses events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MasteryEvent> {
        self.sender.subscribe()
    }

    /// Sends an event, returning how many subscribers will receive it.
    pub fn send(&self, event: MasteryEvent) -> usize {
        // Err only means nobody is listening
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// Tests
// ============================================================================
