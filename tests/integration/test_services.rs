//! HTTP collaborator tests against a local mock server.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use mastery_core::{
    AnswerSet, Config, ContentGenerator, GeneratedDocument, GenerationPurpose, GenerationRequest,
    LessonContext, MasteryError, MasteryLoop, RetryConfig, SearchConfig, SessionStatus,
    TransportErrorKind,
};
use mastery_services::{ChatCompletionsClient, WebSearchClient};
use serde_json::{json, Value};

// ============================================================================
// Mock server
// ============================================================================

struct Captured {
    headers: HeaderMap,
    query: HashMap<String, String>,
    body: String,
}

/// Replays scripted responses in order and records every request.
#[derive(Default)]
struct Mock {
    responses: Mutex<VecDeque<(StatusCode, String)>>,
    requests: Mutex<Vec<Captured>>,
}

impl Mock {
    fn with_responses(responses: impl IntoIterator<Item = (StatusCode, String)>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::default(),
        })
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

async fn scripted(
    State(mock): State<Arc<Mock>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: String,
) -> (StatusCode, String) {
    mock.requests.lock().unwrap().push(Captured {
        headers,
        query,
        body,
    });
    mock.responses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, "no scripted response".into()))
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/v1")
}

async fn serve_scripted(mock: &Arc<Mock>) -> String {
    let app = Router::new()
        .route("/v1/chat/completions", post(scripted))
        .route("/v1/search", get(scripted))
        .with_state(Arc::clone(mock));
    serve(app).await
}

fn completion(content: &str) -> String {
    json!({
        "choices": [{"message": {"role": "assistant", "content": content}}],
        "usage": {"prompt_tokens": 120, "completion_tokens": 40, "total_tokens": 160}
    })
    .to_string()
}

fn ok(body: String) -> (StatusCode, String) {
    (StatusCode::OK, body)
}

fn chat_config(base_url: &str, max_retries: u32) -> Config {
    Config {
        base_url: format!("{base_url}/"),
        request_timeout_secs: 5,
        app_title: "Mastery Tests".into(),
        retry: RetryConfig {
            max_retries,
            initial_backoff_ms: 1,
        },
        ..Config::default()
    }
}

fn search_config(base_url: &str) -> SearchConfig {
    SearchConfig {
        base_url: base_url.to_string(),
        ..SearchConfig::default()
    }
}

fn json_request() -> GenerationRequest {
    GenerationRequest::json(
        GenerationPurpose::Evaluate,
        "You are a grader.",
        json!({"mastery_criteria": ["Name the inputs"]}),
    )
}

// ============================================================================
// Chat completions
// ============================================================================

#[tokio::test]
async fn test_chat_json_success() {
    let mock = Mock::with_responses([ok(completion(r#"{"passed": true, "gaps": []}"#))]);
    let base = serve_scripted(&mock).await;
    let client = ChatCompletionsClient::new(&chat_config(&base, 0), "sk-test").unwrap();

    let document = client.generate(json_request()).await.unwrap();
    assert_eq!(
        document,
        GeneratedDocument::Json(json!({"passed": true, "gaps": []}))
    );

    let requests = mock.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let captured = &requests[0];
    assert_eq!(captured.headers["authorization"], "Bearer sk-test");
    assert_eq!(captured.headers["content-type"], "application/json");
    assert_eq!(captured.headers["x-title"], "Mastery Tests");
    assert_eq!(captured.headers["http-referer"], "http://localhost");

    let body: Value = serde_json::from_str(&captured.body).unwrap();
    assert_eq!(body["model"], client.model());
    assert_eq!(body["response_format"]["type"], "json_object");
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][0]["content"], "You are a grader.");
    let user: Value = serde_json::from_str(body["messages"][1]["content"].as_str().unwrap()).unwrap();
    assert_eq!(user["mastery_criteria"][0], "Name the inputs");
}

#[tokio::test]
async fn test_chat_text_mode_has_no_response_format() {
    let mock = Mock::with_responses([ok(completion("## Inputs\n\nSunlight and water."))]);
    let base = serve_scripted(&mock).await;
    let client = ChatCompletionsClient::new(&chat_config(&base, 0), "sk-test").unwrap();

    let request = GenerationRequest::text(GenerationPurpose::Remediate, "Teach.", json!({}));
    let document = client.generate(request).await.unwrap();
    assert_eq!(document.into_text(), "## Inputs\n\nSunlight and water.");

    let body: Value = serde_json::from_str(&mock.requests.lock().unwrap()[0].body).unwrap();
    assert!(body.get("response_format").is_none());
}

#[tokio::test]
async fn test_chat_unauthorized_carries_provider_message() {
    let mock = Mock::with_responses([(
        StatusCode::UNAUTHORIZED,
        json!({"error": {"message": "Invalid API key"}}).to_string(),
    )]);
    let base = serve_scripted(&mock).await;
    let client = ChatCompletionsClient::new(&chat_config(&base, 3), "sk-bad").unwrap();

    let err = client.generate(json_request()).await.unwrap_err();
    match err {
        MasteryError::Transport { kind, message, .. } => {
            assert_eq!(kind, TransportErrorKind::Authentication);
            assert!(message.contains("Invalid API key"));
        }
        other => panic!("expected transport error, got {other:?}"),
    }
    // Not transient, so never retried.
    assert_eq!(mock.request_count(), 1);
}

#[tokio::test]
async fn test_chat_rate_limit_without_retries() {
    let mock = Mock::with_responses([(StatusCode::TOO_MANY_REQUESTS, "slow down".into())]);
    let base = serve_scripted(&mock).await;
    let client = ChatCompletionsClient::new(&chat_config(&base, 0), "sk-test").unwrap();

    let err = client.generate(json_request()).await.unwrap_err();
    assert!(err.is_transient());
    assert!(matches!(
        err,
        MasteryError::Transport {
            kind: TransportErrorKind::RateLimit,
            ..
        }
    ));
    assert_eq!(mock.request_count(), 1);
}

#[tokio::test]
async fn test_chat_retries_server_errors() {
    let mock = Mock::with_responses([
        (StatusCode::SERVICE_UNAVAILABLE, "busy".into()),
        (StatusCode::SERVICE_UNAVAILABLE, "busy".into()),
        ok(completion(r#"{"passed": true, "gaps": []}"#)),
    ]);
    let base = serve_scripted(&mock).await;
    let client = ChatCompletionsClient::new(&chat_config(&base, 2), "sk-test").unwrap();

    let document = client.generate(json_request()).await.unwrap();
    assert!(matches!(document, GeneratedDocument::Json(_)));
    assert_eq!(mock.request_count(), 3);
}

#[tokio::test]
async fn test_chat_gives_up_after_max_retries() {
    let mock = Mock::with_responses([
        (StatusCode::BAD_GATEWAY, "down".into()),
        (StatusCode::BAD_GATEWAY, "down".into()),
    ]);
    let base = serve_scripted(&mock).await;
    let client = ChatCompletionsClient::new(&chat_config(&base, 1), "sk-test").unwrap();

    let err = client.generate(json_request()).await.unwrap_err();
    assert!(matches!(
        err,
        MasteryError::Transport {
            kind: TransportErrorKind::Server,
            ..
        }
    ));
    assert_eq!(mock.request_count(), 2);
}

#[tokio::test]
async fn test_chat_non_json_content_is_malformed() {
    let mock = Mock::with_responses([ok(completion("Sure! Here is the JSON you asked for"))]);
    let base = serve_scripted(&mock).await;
    let client = ChatCompletionsClient::new(&chat_config(&base, 2), "sk-test").unwrap();

    let err = client.generate(json_request()).await.unwrap_err();
    assert!(matches!(err, MasteryError::MalformedResponse { .. }));
    assert_eq!(mock.request_count(), 1);
}

#[tokio::test]
async fn test_chat_garbage_envelope_is_malformed() {
    let mock = Mock::with_responses([ok("<html>gateway</html>".into())]);
    let base = serve_scripted(&mock).await;
    let client = ChatCompletionsClient::new(&chat_config(&base, 0), "sk-test").unwrap();

    let err = client.generate(json_request()).await.unwrap_err();
    assert!(err.is_malformed_response());
}

#[tokio::test]
async fn test_chat_empty_choices_is_malformed() {
    let mock = Mock::with_responses([ok(json!({"choices": []}).to_string())]);
    let base = serve_scripted(&mock).await;
    let client = ChatCompletionsClient::new(&chat_config(&base, 0), "sk-test").unwrap();

    let err = client.generate(json_request()).await.unwrap_err();
    assert!(matches!(err, MasteryError::MalformedResponse { .. }));
}

#[tokio::test]
async fn test_chat_unreachable_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let client =
        ChatCompletionsClient::new(&chat_config(&format!("http://{addr}/v1"), 0), "sk-test")
            .unwrap();

    let err = client.generate(json_request()).await.unwrap_err();
    assert!(matches!(
        err,
        MasteryError::Transport {
            kind: TransportErrorKind::Network,
            ..
        }
    ));
}

// ============================================================================
// Web search
// ============================================================================

fn web_results(titles: &[&str]) -> String {
    let web: Vec<Value> = titles
        .iter()
        .map(|t| {
            json!({
                "title": t,
                "url": format!("https://example.org/{}", t.to_lowercase().replace(' ', "-")),
                "snippets": [format!("All about {t}.")]
            })
        })
        .collect();
    json!({"results": {"web": web}}).to_string()
}

#[tokio::test]
async fn test_search_success() {
    let mock = Mock::with_responses([ok(web_results(&["Photosynthesis", "Chloroplast"]))]);
    let base = serve_scripted(&mock).await;
    let client =
        WebSearchClient::new(&search_config(&base), Some("ydc-test".into())).unwrap();

    let results = client.search("photosynthesis", 50).await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].title, "Photosynthesis");
    assert_eq!(results[1].snippets, vec!["All about Chloroplast."]);

    let requests = mock.requests.lock().unwrap();
    assert_eq!(requests[0].headers["x-api-key"], "ydc-test");
    assert_eq!(requests[0].query["query"], "photosynthesis");
    assert_eq!(requests[0].query["count"], "20");
}

#[tokio::test]
async fn test_search_error_status_is_empty() {
    let mock = Mock::with_responses([(StatusCode::INTERNAL_SERVER_ERROR, "boom".into())]);
    let base = serve_scripted(&mock).await;
    let client =
        WebSearchClient::new(&search_config(&base), Some("ydc-test".into())).unwrap();

    assert!(client.search("photosynthesis", 5).await.is_empty());
    assert_eq!(mock.request_count(), 1);
}

#[tokio::test]
async fn test_search_without_key_sends_nothing() {
    let mock = Mock::with_responses([ok(web_results(&["Unused"]))]);
    let base = serve_scripted(&mock).await;
    let client = WebSearchClient::new(&search_config(&base), None).unwrap();

    assert!(client.search("photosynthesis", 5).await.is_empty());
    assert_eq!(mock.request_count(), 0);
}

#[tokio::test]
async fn test_search_without_web_results_is_empty() {
    let mock = Mock::with_responses([ok(json!({"results": {"news": []}}).to_string())]);
    let base = serve_scripted(&mock).await;
    let client =
        WebSearchClient::new(&search_config(&base), Some("ydc-test".into())).unwrap();

    assert!(client.search("photosynthesis", 0).await.is_empty());
    assert_eq!(mock.requests.lock().unwrap()[0].query["count"], "1");
}

async fn echo_search(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    let q = query.get("query").cloned().unwrap_or_default();
    Json(json!({"results": {"web": [{"title": q, "url": "https://example.org", "snippets": []}]}}))
}

#[tokio::test]
async fn test_search_all_keeps_query_order() {
    let base = serve(Router::new().route("/v1/search", get(echo_search))).await;
    let client =
        WebSearchClient::new(&search_config(&base), Some("ydc-test".into())).unwrap();
    let queries: Vec<String> = ["alpha", "beta", "gamma", "delta"]
        .iter()
        .map(ToString::to_string)
        .collect();

    let titles: Vec<String> = client
        .search_all(&queries, 3)
        .await
        .into_iter()
        .map(|r| r.title)
        .collect();
    assert_eq!(titles, queries);
}

// ============================================================================
// Full loop over HTTP
// ============================================================================

/// Answers each role by its system prompt; fails the first evaluation only.
#[derive(Default)]
struct Tutor {
    evaluations: AtomicUsize,
}

async fn tutor(State(tutor): State<Arc<Tutor>>, Json(body): Json<Value>) -> String {
    let system = body["messages"][0]["content"].as_str().unwrap_or_default();
    let content = if system.contains("Test Architect") {
        json!({
            "multipleChoice": [{
                "question": "Where does photosynthesis take place?",
                "options": ["mitochondria", "chloroplasts"],
                "correctOptionIndex": 1
            }],
            "explain": {"prompt": "Explain photosynthesis."}
        })
        .to_string()
    } else if system.contains("Strict Examiner") {
        if tutor.evaluations.fetch_add(1, Ordering::SeqCst) == 0 {
            json!({"passed": false, "gaps": ["Location of photosynthesis in the cell"]}).to_string()
        } else {
            json!({"passed": true, "gaps": []}).to_string()
        }
    } else if system.contains("Remedial Tutor") {
        "## Chloroplasts\n\nThink of them as the leaf's kitchens.".to_string()
    } else {
        String::new()
    };
    completion(&content)
}

#[tokio::test]
async fn test_mastery_loop_over_http() {
    let app = Router::new()
        .route("/v1/chat/completions", post(tutor))
        .with_state(Arc::new(Tutor::default()));
    let base = serve(app).await;
    let client = ChatCompletionsClient::new(&chat_config(&base, 0), "sk-test").unwrap();
    let mastery = MasteryLoop::new(client);

    let (mut state, battery) = mastery
        .start_session(LessonContext::sample())
        .await
        .unwrap();
    assert_eq!(battery.multiple_choice.len(), 1);

    let answers = AnswerSet::new()
        .with_multiple_choice(vec![Some(0)])
        .with_explanation("magic");
    let verdict = mastery.submit_answers(&mut state, &answers).await.unwrap();
    assert!(!verdict.passed());

    let remediation = mastery.get_remediation(&state).unwrap().unwrap();
    assert!(remediation.markdown.contains("Chloroplasts"));

    mastery.retry(&mut state).await.unwrap();
    let answers = AnswerSet::new()
        .with_multiple_choice(vec![Some(1)])
        .with_explanation("Chloroplasts turn sunlight, water and CO2 into sugar and oxygen.");
    let verdict = mastery.submit_answers(&mut state, &answers).await.unwrap();

    assert!(verdict.passed());
    assert_eq!(state.status(), SessionStatus::Passed);
    assert_eq!(state.attempt_count(), 2);
}
