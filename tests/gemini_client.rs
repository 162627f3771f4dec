//! Gemini client tests using a wiremock server.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use recipe_ai::ai::client::RetryPolicy;
use recipe_ai::core::media::DataUri;
use recipe_ai::core::runtime::{Part, Prompt};
use recipe_ai::testing::test_gemini_client;
use recipe_ai::{GeminiClient, GeminiConfig, ModelClient, ModelError, ModelRequest};
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const ENDPOINT: &str = "/models/gemini-test:generateContent";

#[derive(Clone)]
struct SequenceResponder {
    templates: Arc<Mutex<VecDeque<ResponseTemplate>>>,
}

impl SequenceResponder {
    fn new(templates: Vec<ResponseTemplate>) -> Self {
        Self {
            templates: Arc::new(Mutex::new(templates.into_iter().collect())),
        }
    }
}

impl Respond for SequenceResponder {
    fn respond(&self, _req: &Request) -> ResponseTemplate {
        let mut templates = self.templates.lock().expect("mutex should not be poisoned");
        templates
            .pop_front()
            .unwrap_or_else(|| ResponseTemplate::new(500).set_body_string("no more mock responses"))
    }
}

fn candidate(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    })
}

fn request(parts: Vec<Part>) -> ModelRequest {
    ModelRequest {
        flow: "testFlow".into(),
        prompt: Prompt::from_parts(parts),
        response_schema: json!({
            "type": "object",
            "properties": { "ingredients": { "type": "array", "items": { "type": "string" } } },
            "required": ["ingredients"]
        }),
    }
}

fn text_request(text: &str) -> ModelRequest {
    request(vec![Part::Text(text.into())])
}

#[tokio::test]
async fn sends_text_media_and_schema() {
    let server = MockServer::start().await;
    let photo = DataUri::from_bytes("image/jpeg", b"hello");

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(query_param("key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [{
                "parts": [
                    { "text": "Image: " },
                    { "inlineData": { "mimeType": "image/jpeg", "data": "aGVsbG8=" } }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": { "required": ["ingredients"] }
            }
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(candidate(r#"{"ingredients":["egg"]}"#)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = test_gemini_client(&server.uri());
    let output = client
        .generate(request(vec![Part::Text("Image: ".into()), Part::Media(photo)]))
        .await
        .expect("request should succeed");

    assert_eq!(output, json!({ "ingredients": ["egg"] }));
}

#[tokio::test]
async fn fenced_json_is_unwrapped() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(candidate("```json\n{\"ingredients\": [\"rice\"]}\n```")),
        )
        .mount(&server)
        .await;

    let output = test_gemini_client(&server.uri())
        .generate(text_request("hi"))
        .await
        .unwrap();
    assert_eq!(output["ingredients"][0], "rice");
}

#[tokio::test]
async fn transient_status_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(SequenceResponder::new(vec![
            ResponseTemplate::new(503).set_body_string("overloaded"),
            ResponseTemplate::new(200).set_body_json(candidate(r#"{"ingredients":[]}"#)),
        ]))
        .expect(2)
        .mount(&server)
        .await;

    let client = GeminiClient::new(GeminiConfig {
        base_url: server.uri(),
        model: "gemini-test".into(),
        retry: RetryPolicy {
            max_attempts: 2,
            base_backoff: Duration::from_millis(5),
        },
        ..GeminiConfig::new("test-key")
    });

    let output = client.generate(text_request("hi")).await.unwrap();
    assert_eq!(output, json!({ "ingredients": [] }));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(400).set_body_string("API key not valid"))
        .expect(1)
        .mount(&server)
        .await;

    let client = GeminiClient::new(GeminiConfig {
        base_url: server.uri(),
        model: "gemini-test".into(),
        retry: RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(5),
        },
        ..GeminiConfig::new("test-key")
    });

    let err = client.generate(text_request("hi")).await.unwrap_err();
    match err {
        ModelError::Status { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("API key"));
        }
        other => panic!("expected a status error, got {other:?}"),
    }
}

#[tokio::test]
async fn blocked_prompt_is_refused() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        })))
        .mount(&server)
        .await;

    let err = test_gemini_client(&server.uri())
        .generate(text_request("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::Refused(ref reason) if reason.contains("SAFETY")));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn prose_reply_is_malformed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(candidate("Sure! Here are some ingredients.")),
        )
        .mount(&server)
        .await;

    let err = test_gemini_client(&server.uri())
        .generate(text_request("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::Malformed(_)));
}

#[tokio::test]
async fn responses_are_dumped_when_a_directory_is_configured() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(candidate("```json\n{\"ingredients\": [\"leek\"]}\n```")),
        )
        .mount(&server)
        .await;

    let dir = std::env::temp_dir().join(format!("recipe-ai-dump-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();

    let client = GeminiClient::new(GeminiConfig {
        base_url: server.uri(),
        model: "gemini-test".into(),
        retry: RetryPolicy::disabled(),
        dump_dir: Some(dir.clone()),
        ..GeminiConfig::new("test-key")
    });
    client.generate(text_request("hi")).await.unwrap();

    let dumped: Vec<_> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    let contents: Vec<String> = dumped
        .iter()
        .map(|p| std::fs::read_to_string(p).unwrap())
        .collect();
    std::fs::remove_dir_all(&dir).unwrap();

    assert_eq!(dumped.len(), 1);
    assert_eq!(contents[0], r#"{"ingredients": ["leek"]}"#);
    let name = dumped[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("llm_response_testFlow_"), "dumped as {name}");
    assert!(name.ends_with(".json"));
}
