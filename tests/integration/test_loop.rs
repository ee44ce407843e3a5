//! End-to-end tests for the mastery loop.
//!
//! A deterministic tutor stands in for the content-generation service: it
//! builds batteries only from the lesson text, grades answers by fixed rules,
//! and writes remediation that names exactly the gaps it was given.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use mastery_core::{
    run_to_mastery, AnswerSet, Config, ContentGenerator, EventBroadcaster, ExerciseBattery,
    GeneratedDocument, GenerationPurpose, GenerationRequest, Learner, LessonContext, LoopState,
    MasteryError, MasteryLoop, RemediationContent, Result, SessionStatus, TransportErrorKind,
};
use serde_json::{json, Value};

const LOCATION_GAP: &str = "Where photosynthesis occurs: the chloroplasts";
const OUTPUTS_GAP: &str = "Outputs of photosynthesis: oxygen and sugar";
const GOOD_EXPLANATION: &str =
    "Plants convert sunlight, water, and CO2 into sugar and oxygen in the chloroplasts using chlorophyll";
const BAD_EXPLANATION: &str = "I don't know, magic?";

// ============================================================================
// Deterministic tutor
// ============================================================================

/// Failures the tutor can be told to produce on its next call.
enum Injection {
    Transport,
    InvalidVerdict,
    TextInsteadOfJson,
}

#[derive(Default)]
struct PhotosynthesisTutor {
    calls: AtomicUsize,
    injections: Mutex<VecDeque<Injection>>,
}

impl PhotosynthesisTutor {
    fn inject(&self, injection: Injection) {
        self.injections.lock().unwrap().push_back(injection);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn battery(content_text: &str) -> Value {
        assert!(content_text.contains("chloroplasts"));
        json!({
            "multipleChoice": [
                {
                    "question": "Where does photosynthesis take place?",
                    "options": ["mitochondria", "chloroplasts", "nucleus"],
                    "correctOptionIndex": 1
                },
                {
                    "question": "What do plants create besides sugar?",
                    "options": ["oxygen", "nitrogen"],
                    "correctOptionIndex": 0
                }
            ],
            "termDefinition": [
                {"term": "chloroplasts", "definition": "which contain chlorophyll"}
            ],
            "categorize": {
                "buckets": ["use", "create"],
                "items": [
                    {"text": "water", "correctBucketIndex": 0},
                    {"text": "oxygen", "correctBucketIndex": 1}
                ]
            },
            "pairing": [
                {"left": "energy source", "right": "sunlight"},
                {"left": "stored energy", "right": "sugar"}
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

    /// Fails a criterion on any wrong multiple-choice answer for it, or an
    /// explanation that doesn't show it.
    fn grade(review: &Value) -> Value {
        let responses = review["multipleChoice"]["responses"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        let correct = |i: usize| {
            responses
                .get(i)
                .is_some_and(|r| !r["selected_index"].is_null() && r["selected_index"] == r["correct_index"])
        };
        let explanation = review["explain"]["learner_explanation"]
            .as_str()
            .unwrap_or_default()
            .to_lowercase();

        let mut gaps = Vec::new();
        if !correct(0) || !explanation.contains("chloroplast") {
            gaps.push(LOCATION_GAP);
        }
        if !correct(1) || !(explanation.contains("oxygen") && explanation.contains("sugar")) {
            gaps.push(OUTPUTS_GAP);
        }
        json!({"passed": gaps.is_empty(), "gaps": gaps})
    }

    fn remediation(gaps: &Value) -> String {
        gaps.as_array()
            .map(|gaps| {
                gaps.iter()
                    .filter_map(Value::as_str)
                    .map(|gap| format!("## {gap}\n\nA new way to see it: a leaf is a tiny solar-powered kitchen.\n"))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl ContentGenerator for PhotosynthesisTutor {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedDocument> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(injection) = self.injections.lock().unwrap().pop_front() {
            return match injection {
                Injection::Transport => Err(MasteryError::transport(
                    TransportErrorKind::Server,
                    "HTTP 503 Service Unavailable",
                )),
                Injection::InvalidVerdict => {
                    Ok(GeneratedDocument::Json(json!({"passed": true, "gaps": ["Chlorophyll"]})))
                }
                Injection::TextInsteadOfJson => {
                    Ok(GeneratedDocument::Text("Sure! Here is your JSON".into()))
                }
            };
        }

        let context = &request.context;
        Ok(match request.purpose {
            GenerationPurpose::BuildBattery => GeneratedDocument::Json(Self::battery(
                context["content_text"].as_str().unwrap_or_default(),
            )),
            GenerationPurpose::Evaluate => {
                GeneratedDocument::Json(Self::grade(&context["user_answers"]))
            }
            GenerationPurpose::Remediate => {
                GeneratedDocument::Text(Self::remediation(&context["identified_gaps"]))
            }
        })
    }
}

fn scenario_a_answers() -> AnswerSet {
    AnswerSet::new()
        .with_multiple_choice(vec![Some(0), Some(0)])
        .with_explanation(BAD_EXPLANATION)
}

fn scenario_b_answers() -> AnswerSet {
    AnswerSet::new()
        .with_multiple_choice(vec![Some(1), Some(0)])
        .with_explanation(GOOD_EXPLANATION)
}

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(name)
}

async fn started() -> (MasteryLoop<PhotosynthesisTutor>, LoopState, ExerciseBattery) {
    let mastery = MasteryLoop::new(PhotosynthesisTutor::default());
    let (state, battery) = mastery
        .start_session(LessonContext::sample())
        .await
        .expect("session should start");
    (mastery, state, battery)
}

// ============================================================================
// Fixtures
// ============================================================================

#[test]
fn test_lesson_fixture_loads() {
    let lesson = LessonContext::load(fixture_path("lesson.json")).expect("Failed to load lesson");
    assert_eq!(lesson, LessonContext::sample());
}

#[test]
fn test_config_fixture_loads() {
    let config = Config::load_from_file(&fixture_path("mastery.json")).expect("Failed to load config");
    assert_eq!(config.max_attempts, Some(3));
    assert_eq!(config.request_timeout_secs, 30);
    assert_eq!(config.retry.max_retries, 1);
    assert_eq!(config.search.result_count, 3);
    assert_eq!(config.base_url, "https://openrouter.ai/api/v1");
}

// ============================================================================
// Scenarios
// ============================================================================

/// Wrong answer plus a non-explanation fails with gaps.
#[tokio::test]
async fn test_scenario_a_poor_answers_fail() {
    let (mastery, mut state, _) = started().await;

    let verdict = mastery
        .submit_answers(&mut state, &scenario_a_answers())
        .await
        .unwrap();

    assert!(!verdict.passed());
    assert!(!verdict.gaps().is_empty());
    assert_eq!(state.status(), SessionStatus::Remediating);
}

/// All correct plus a full explanation passes with no gaps.
#[tokio::test]
async fn test_scenario_b_strong_answers_pass() {
    let (mastery, mut state, _) = started().await;

    let verdict = mastery
        .submit_answers(&mut state, &scenario_b_answers())
        .await
        .unwrap();

    assert!(verdict.passed());
    assert!(verdict.gaps().is_empty());
    assert_eq!(state.status(), SessionStatus::Passed);
    assert_eq!(state.attempt_count(), 1);
}

/// Correct multiple choice does not rescue an unconvincing explanation.
#[tokio::test]
async fn test_weak_explanation_fails_on_its_own() {
    let (mastery, mut state, _) = started().await;
    let answers = AnswerSet::new()
        .with_multiple_choice(vec![Some(1), Some(0)])
        .with_explanation(BAD_EXPLANATION);

    let verdict = mastery.submit_answers(&mut state, &answers).await.unwrap();
    assert!(!verdict.passed());
}

/// Remediation names a gap and leaves the criterion that was met alone.
#[tokio::test]
async fn test_scenario_c_remediation_is_scoped_to_gaps() {
    let (mastery, mut state, _) = started().await;
    let answers = AnswerSet::new()
        .with_multiple_choice(vec![Some(0), Some(0)])
        .with_explanation("Plants use sunlight, water and carbon dioxide to make sugar and oxygen");

    let verdict = mastery.submit_answers(&mut state, &answers).await.unwrap();
    assert_eq!(verdict.gaps(), [LOCATION_GAP]);

    let remediation = mastery
        .get_remediation(&state)
        .unwrap()
        .expect("remediation should be available");
    assert!(remediation.markdown.contains("chloroplasts"));
    assert!(!remediation.markdown.contains(OUTPUTS_GAP));
    assert!(!remediation
        .markdown
        .contains("Define the inputs and outputs of photosynthesis"));
}

/// Retrying before remediation is a precondition error, not a new battery.
#[tokio::test]
async fn test_scenario_d_retry_before_remediating() {
    let (mastery, mut state, _) = started().await;
    let before = state.clone();
    let calls = mastery.generator().calls();

    let err = mastery.retry(&mut state).await.unwrap_err();

    assert!(matches!(err, MasteryError::Precondition { .. }));
    assert_eq!(state, before);
    assert_eq!(mastery.generator().calls(), calls);
}

// ============================================================================
// Properties
// ============================================================================

/// Every answer key of a built battery comes from the lesson text.
#[tokio::test]
async fn test_battery_answers_traceable_to_lesson() {
    let (_, state, battery) = started().await;
    let content = state.current_lesson().content_text.to_lowercase();

    for key in battery.answer_keys() {
        assert!(
            content.contains(&key.to_lowercase()),
            "answer '{key}' is not in the lesson text"
        );
    }
}

/// The same answers against the same battery give the same verdict.
#[tokio::test]
async fn test_failure_is_idempotent() {
    let (mastery, state, _) = started().await;
    let mut first = state.clone();
    let mut second = state;

    let a = mastery
        .submit_answers(&mut first, &scenario_a_answers())
        .await
        .unwrap();
    let b = mastery
        .submit_answers(&mut second, &scenario_a_answers())
        .await
        .unwrap();

    assert_eq!(a, b);
    assert_eq!(first.status(), second.status());
}

/// Attempt count goes up by exactly one per battery and never otherwise.
#[tokio::test]
async fn test_attempt_count_is_monotonic() {
    let (mastery, mut state, _) = started().await;
    assert_eq!(state.attempt_count(), 1);

    for expected in 2..=4 {
        mastery
            .submit_answers(&mut state, &scenario_a_answers())
            .await
            .unwrap();
        assert_eq!(state.attempt_count(), expected - 1);

        mastery.retry(&mut state).await.unwrap();
        assert_eq!(state.attempt_count(), expected);
    }

    let attempts: Vec<u32> = state.history().iter().map(|r| r.attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3]);
}

/// Every recorded verdict holds passed <=> no gaps.
#[tokio::test]
async fn test_verdict_invariant_across_history() {
    let (mastery, mut state, _) = started().await;

    mastery
        .submit_answers(&mut state, &scenario_a_answers())
        .await
        .unwrap();
    mastery.retry(&mut state).await.unwrap();
    mastery
        .submit_answers(&mut state, &scenario_b_answers())
        .await
        .unwrap();

    assert_eq!(state.history().len(), 2);
    for record in state.history() {
        assert_eq!(record.verdict.passed(), record.verdict.gaps().is_empty());
    }
}

/// Remediation extends the lesson; the original text is never lost.
#[tokio::test]
async fn test_retry_builds_from_extended_lesson() {
    let (mastery, mut state, _) = started().await;
    mastery
        .submit_answers(&mut state, &scenario_a_answers())
        .await
        .unwrap();
    mastery.retry(&mut state).await.unwrap();
    mastery
        .submit_answers(&mut state, &scenario_a_answers())
        .await
        .unwrap();
    mastery.retry(&mut state).await.unwrap();

    let original = &state.original_lesson().content_text;
    let current = &state.current_lesson().content_text;
    assert!(current.starts_with(original.as_str()));
    assert!(current.contains("## Remediation (attempt 1)"));
    assert!(current.contains("## Remediation (attempt 2)"));
    assert_eq!(
        state.current_lesson().mastery_criteria,
        state.original_lesson().mastery_criteria
    );
}

// ============================================================================
// Failed transitions leave state unchanged
// ============================================================================

#[tokio::test]
async fn test_transport_error_during_evaluation_leaves_state_unchanged() {
    let (mastery, mut state, _) = started().await;
    let before = state.clone();
    mastery.generator().inject(Injection::Transport);

    let err = mastery
        .submit_answers(&mut state, &scenario_a_answers())
        .await
        .unwrap_err();

    assert!(err.is_transient());
    assert_eq!(state, before);

    let verdict = mastery
        .submit_answers(&mut state, &scenario_a_answers())
        .await
        .unwrap();
    assert!(!verdict.passed());
}

#[tokio::test]
async fn test_invalid_verdict_leaves_state_unchanged() {
    let (mastery, mut state, _) = started().await;
    let before = state.clone();
    mastery.generator().inject(Injection::InvalidVerdict);

    let err = mastery
        .submit_answers(&mut state, &scenario_b_answers())
        .await
        .unwrap_err();

    assert!(matches!(err, MasteryError::InvalidVerdict { .. }));
    assert_eq!(state, before);
}

#[tokio::test]
async fn test_malformed_battery_on_retry_keeps_remediating() {
    let (mastery, mut state, _) = started().await;
    mastery
        .submit_answers(&mut state, &scenario_a_answers())
        .await
        .unwrap();
    let before = state.clone();
    mastery.generator().inject(Injection::TextInsteadOfJson);

    let err = mastery.retry(&mut state).await.unwrap_err();

    assert!(err.is_malformed_response());
    assert_eq!(state, before);
    assert_eq!(state.status(), SessionStatus::Remediating);

    mastery.retry(&mut state).await.unwrap();
    assert_eq!(state.attempt_count(), 2);
}

#[tokio::test]
async fn test_answers_that_do_not_fit_are_rejected() {
    let (mastery, mut state, _) = started().await;
    let before = state.clone();
    let calls = mastery.generator().calls();
    let answers = AnswerSet::new().with_multiple_choice(vec![Some(7)]);

    let err = mastery.submit_answers(&mut state, &answers).await.unwrap_err();

    assert!(matches!(err, MasteryError::Precondition { .. }));
    assert_eq!(state, before);
    assert_eq!(mastery.generator().calls(), calls);
}

#[tokio::test]
async fn test_build_is_one_request() {
    let (mastery, _, _) = started().await;
    assert_eq!(mastery.generator().calls(), 1);
}

/// A parked session resumes where it left off; a tampered one is refused.
#[tokio::test]
async fn test_parked_session_resumes_and_rejects_tampering() {
    let (mastery, mut state, _) = started().await;
    mastery
        .submit_answers(&mut state, &scenario_a_answers())
        .await
        .unwrap();

    let parked = serde_json::to_value(&state).unwrap();
    let mut resumed: LoopState = serde_json::from_value(parked.clone()).unwrap();
    assert_eq!(resumed, state);
    mastery.retry(&mut resumed).await.unwrap();
    assert_eq!(resumed.attempt_count(), 2);

    let mut tampered = parked.clone();
    tampered["history"][0]["verdict"]["passed"] = json!(true);
    assert!(serde_json::from_value::<LoopState>(tampered).is_err());

    let mut tampered = parked;
    tampered["status"] = json!("passed");
    assert!(serde_json::from_value::<LoopState>(tampered).is_err());
}

// ============================================================================
// Driver
// ============================================================================

/// Learns after the first remediation.
struct ImprovingLearner {
    reviewed: Vec<RemediationContent>,
}

#[async_trait]
impl Learner for ImprovingLearner {
    async fn answer(&mut self, _battery: &ExerciseBattery) -> Result<AnswerSet> {
        Ok(if self.reviewed.is_empty() {
            scenario_a_answers()
        } else {
            scenario_b_answers()
        })
    }

    async fn review(&mut self, remediation: &RemediationContent) -> Result<()> {
        self.reviewed.push(remediation.clone());
        Ok(())
    }
}

/// Never improves.
struct StuckLearner;

#[async_trait]
impl Learner for StuckLearner {
    async fn answer(&mut self, _battery: &ExerciseBattery) -> Result<AnswerSet> {
        Ok(scenario_a_answers())
    }
}

#[tokio::test]
async fn test_run_to_mastery_after_remediation() {
    let broadcaster = EventBroadcaster::new(32);
    let mut events = broadcaster.subscribe();
    let mastery = MasteryLoop::new(PhotosynthesisTutor::default()).with_events(broadcaster);
    let mut learner = ImprovingLearner {
        reviewed: Vec::new(),
    };

    let outcome = run_to_mastery(&mastery, LessonContext::sample(), &mut learner, None)
        .await
        .unwrap();

    assert!(outcome.passed);
    assert_eq!(outcome.attempts, 2);
    assert!(outcome.verdict.passed());
    assert_eq!(learner.reviewed.len(), 1);
    assert_eq!(learner.reviewed[0].attempt, 1);

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.event_name());
    }
    assert_eq!(
        names,
        [
            "session_started",
            "battery_ready",
            "verdict",
            "remediation_ready",
            "battery_ready",
            "verdict",
            "session_complete",
        ]
    );
}

#[tokio::test]
async fn test_run_to_mastery_respects_caller_ceiling() {
    let mastery = MasteryLoop::new(PhotosynthesisTutor::default());

    let outcome = run_to_mastery(&mastery, LessonContext::sample(), &mut StuckLearner, Some(3))
        .await
        .unwrap();

    assert!(!outcome.passed);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.history.len(), 3);
    assert!(outcome.aborted_reason.is_some());
    assert!(!outcome.verdict.gaps().is_empty());
    // build + evaluate + remediate per attempt
    assert_eq!(mastery.generator().calls(), 9);
}

#[test]
fn test_sessions_are_independent() {
    tokio_test::block_on(async {
        let mastery = MasteryLoop::new(PhotosynthesisTutor::default());
        let (mut alice, _) = mastery
            .start_session(LessonContext::sample())
            .await
            .unwrap();
        let (mut bob, _) = mastery
            .start_session(LessonContext::sample())
            .await
            .unwrap();

        mastery
            .submit_answers(&mut alice, &scenario_a_answers())
            .await
            .unwrap();
        mastery
            .submit_answers(&mut bob, &scenario_b_answers())
            .await
            .unwrap();

        assert_eq!(alice.status(), SessionStatus::Remediating);
        assert_eq!(bob.status(), SessionStatus::Passed);
    });
}
