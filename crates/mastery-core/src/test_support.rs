//! Scripted generator shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{MasteryError, Result};
use crate::generation::{ContentGenerator, GeneratedDocument, GenerationRequest};

/// Replays queued responses in order and records every request.
#[derive(Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<GeneratedDocument>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: Result<GeneratedDocument>) -> &Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn push_json(&self, value: Value) -> &Self {
        self.push(Ok(GeneratedDocument::Json(value)))
    }

    pub fn push_text(&self, text: &str) -> &Self {
        self.push(Ok(GeneratedDocument::Text(text.to_string())))
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedDocument> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(MasteryError::malformed_response("script exhausted")))
    }
}

/// A valid battery for the sample photosynthesis lesson.
pub fn photosynthesis_battery() -> Value {
    json!({
        "multipleChoice": [
            {
                "question": "Where does photosynthesis take place?",
                "options": ["Mitochondria", "Chloroplasts", "Nucleus"],
                "correctOptionIndex": 1
            },
            {
                "question": "Which gas do plants release during photosynthesis?",
                "options": ["Oxygen", "Carbon dioxide"],
                "correctOptionIndex": 0
            }
        ],
        "termDefinition": [
            {"term": "Chlorophyll", "definition": "The pigment contained in chloroplasts"}
        ],
        "categorize": {
            "buckets": ["Input", "Output"],
            "items": [
                {"text": "Water", "correctBucketIndex": 0},
                {"text": "Oxygen", "correctBucketIndex": 1}
            ]
        },
        "pairing": [
            {"left": "Sunlight", "right": "Energy source"},
            {"left": "Sugar", "right": "Stored energy"}
        ],
        "cloze": {
            "text": "Plants use [[b1]], water, and carbon dioxide to create [[b2]].",
            "blanks": [
                {"id": "b1", "answer": "sunlight"},
                {"id": "b2", "answer": "oxygen"}
            ]
        },
        "explain": {"prompt": "Explain photosynthesis in your own words."}
    })
}
