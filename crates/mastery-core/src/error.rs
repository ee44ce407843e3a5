//! Error types for the mastery loop.
//!
//! The taxonomy separates three failure families so callers can decide what
//! to do with each:
//!
//! - transport failures of a collaborator (retry/backoff is the caller's call),
//! - malformed collaborator responses (never repaired, always surfaced),
//! - precondition violations caused by the caller (fatal to the call only).
//!
//! Configuration and lesson-loading errors round out the set.

use std::path::PathBuf;

/// A specialized `Result` type for mastery loop operations.
pub type Result<T> = std::result::Result<T, MasteryError>;

/// Errors that can occur while building, grading, or remediating a lesson.
///
/// Variants carry actionable suggestions where the fix is on the caller's side.
#[derive(Debug, thiserror::Error)]
pub enum MasteryError {
    // ========================================================================
    // Collaborator Transport Errors
    // ========================================================================
    /// The collaborator was unreachable or answered with a non-success status.
    #[error("Transport error ({kind}): {message}\n\nSuggestion: {suggestion}")]
    Transport {
        /// Classification of the transport failure.
        kind: TransportErrorKind,
        /// Detailed message from the transport layer or the provider.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Malformed Collaborator Responses
    // ========================================================================
    /// The collaborator responded, but the payload broke the expected contract.
    #[error("Malformed response from content service: {message}")]
    MalformedResponse {
        /// What was wrong with the payload.
        message: String,
    },

    /// A generated exercise battery was missing required slots or had invalid items.
    #[error("Malformed exercise battery: {reason}")]
    MalformedBattery {
        /// Which slot or item failed validation, and why.
        reason: String,
    },

    /// A generated verdict broke the `passed` ⇔ empty `gaps` invariant.
    #[error("Invalid verdict from evaluator: {reason}")]
    InvalidVerdict {
        /// Which part of the verdict failed validation.
        reason: String,
    },

    // ========================================================================
    // Caller Misuse
    // ========================================================================
    /// An operation was invoked in a state or with inputs that do not allow it.
    #[error("Precondition failed for '{operation}': {message}")]
    Precondition {
        /// The operation that was refused.
        operation: String,
        /// Why the call was refused.
        message: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in the configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your mastery.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Lesson Loading Errors
    // ========================================================================
    /// Lesson file was not found at the specified path.
    #[error("Lesson not found: '{path}'\n\nSuggestion: Check the --lesson path or omit it to use the sample lesson")]
    LessonNotFound {
        /// Path where the lesson was expected.
        path: PathBuf,
    },

    /// Lesson file could not be parsed as a lesson document.
    #[error("Invalid lesson file '{path}': {message}\n\nSuggestion: Provide JSON with 'title', 'content_text' and 'mastery_criteria'")]
    LessonParseError {
        /// Path to the lesson file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Categories of transport failures for structured error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Authentication failure (invalid API key, expired credentials).
    Authentication,
    /// No credentials were configured for the service.
    MissingCredentials,
    /// Rate limit exceeded.
    RateLimit,
    /// Server error (5xx responses).
    Server,
    /// Network connectivity issues or timeouts.
    Network,
    /// Other unclassified non-success statuses.
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::MissingCredentials => write!(f, "missing_credentials"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Server => write!(f, "server"),
            Self::Network => write!(f, "network"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl TransportErrorKind {
    /// Classifies an HTTP status code returned by a collaborator.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }

    /// Returns a suggestion message for this error kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Authentication => "Check your API key or credentials",
            Self::MissingCredentials => "Set the service's API key in the environment",
            Self::RateLimit => "Wait and retry, or reduce request frequency",
            Self::Server => "Retry later; the content service may be experiencing issues",
            Self::Network => "Check your network connection and the configured baseUrl",
            Self::Other => "Check the content provider's status page",
        }
    }
}

impl MasteryError {
    /// Creates a new `Transport` error with an automatic suggestion based on its kind.
    #[must_use]
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            message: message.into(),
            suggestion: kind.suggestion().to_string(),
        }
    }

    /// Creates a `MissingCredentials` transport error naming the unset variable.
    #[must_use]
    pub fn missing_credentials(env_var: &str) -> Self {
        Self::Transport {
            kind: TransportErrorKind::MissingCredentials,
            message: format!("{env_var} is not set"),
            suggestion: format!("Set {env_var} in the environment"),
        }
    }

    /// Creates a new `MalformedResponse` error.
    #[must_use]
    pub fn malformed_response(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Creates a new `MalformedBattery` error.
    #[must_use]
    pub fn malformed_battery(reason: impl Into<String>) -> Self {
        Self::MalformedBattery {
            reason: reason.into(),
        }
    }

    /// Creates a new `InvalidVerdict` error.
    #[must_use]
    pub fn invalid_verdict(reason: impl Into<String>) -> Self {
        Self::InvalidVerdict {
            reason: reason.into(),
        }
    }

    /// Creates a new `Precondition` error.
    #[must_use]
    pub fn precondition(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Precondition {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `LessonNotFound` error.
    #[must_use]
    pub fn lesson_not_found(path: impl Into<PathBuf>) -> Self {
        Self::LessonNotFound { path: path.into() }
    }

    /// Creates a new `LessonParseError`.
    #[must_use]
    pub fn lesson_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::LessonParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error is transient and the same call may be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                kind: TransportErrorKind::RateLimit
                    | TransportErrorKind::Server
                    | TransportErrorKind::Network,
                ..
            }
        )
    }

    /// Returns `true` if the collaborator answered but broke its contract.
    #[must_use]
    pub const fn is_malformed_response(&self) -> bool {
        matches!(
            self,
            Self::MalformedResponse { .. } | Self::MalformedBattery { .. } | Self::InvalidVerdict { .. }
        )
    }

    /// Returns `true` if the caller invoked an operation it was not allowed to.
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition { .. })
    }
}
