//! The content-generation collaborator contract.
//!
//! Every stage of the loop talks to the generation service through
//! [`ContentGenerator`]. Implementations must keep transport failures
//! (`MasteryError::Transport`) distinct from payloads that arrived but broke
//! the contract (`MasteryError::MalformedResponse`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MasteryError, Result};

/// Which loop stage issued a generation request. Used for logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPurpose {
    /// Exercise battery construction.
    BuildBattery,
    /// Grading of an answer set.
    Evaluate,
    /// Remediation for identified gaps.
    Remediate,
}

impl std::fmt::Display for GenerationPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BuildBattery => write!(f, "build_battery"),
            Self::Evaluate => write!(f, "evaluate"),
            Self::Remediate => write!(f, "remediate"),
        }
    }
}

/// A role-tagged prompt plus its structured context.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Stage that issued the request.
    pub purpose: GenerationPurpose,
    /// System instruction for the model.
    pub system_instruction: String,
    /// Context document, sent to the model serialized as JSON.
    pub context: Value,
    /// Whether the response must be a JSON document.
    pub expect_json: bool,
}

impl GenerationRequest {
    /// Creates a request expecting a JSON document back.
    #[must_use]
    pub fn json(purpose: GenerationPurpose, system_instruction: &str, context: Value) -> Self {
        Self {
            purpose,
            system_instruction: system_instruction.to_string(),
            context,
            expect_json: true,
        }
    }

    /// Creates a request expecting free-form markdown back.
    #[must_use]
    pub fn text(purpose: GenerationPurpose, system_instruction: &str, context: Value) -> Self {
        Self {
            purpose,
            system_instruction: system_instruction.to_string(),
            context,
            expect_json: false,
        }
    }
}

/// What the generation service returned.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedDocument {
    /// A parsed JSON document.
    Json(Value),
    /// Raw text, typically markdown.
    Text(String),
}

impl GeneratedDocument {
    /// Returns the JSON document.
    ///
    /// # Errors
    ///
    /// Returns `MasteryError::MalformedResponse` if the service returned text.
    pub fn into_json(self) -> Result<Value> {
        match self {
            Self::Json(value) => Ok(value),
            Self::Text(_) => Err(MasteryError::malformed_response(
                "expected a JSON document, received text",
            )),
        }
    }

    /// Returns the document as text. JSON documents are serialized.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Json(value) => value.to_string(),
        }
    }
}

/// Client for the external content-generation service.
///
/// Calls are stateless from the caller's perspective; the loop never holds a
/// connection across the answer-collection suspension point.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Sends one request and returns the generated document.
    ///
    /// # Errors
    ///
    /// Returns `MasteryError::Transport` when the service is unreachable or
    /// answers with a non-success status, and `MasteryError::MalformedResponse`
    /// when the payload cannot be interpreted.
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedDocument>;
}

#[async_trait]
impl<T: ContentGenerator + ?Sized> ContentGenerator for std::sync::Arc<T> {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedDocument> {
        (**self).generate(request).await
    }
}
