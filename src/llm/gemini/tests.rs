use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE_PATH: &str = "/v1beta/models/gemini-2.5-pro:generateContent";

fn config_for(server: &MockServer) -> LlmConfig {
    LlmConfig {
        api_base: server.uri(),
        ..LlmConfig::default()
    }
}

fn answer(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    })
}

#[test]
fn endpoint_includes_model() {
    let client =
        GeminiClient::new(&LlmConfig::default(), "super-secret").expect("should build client");
    assert_eq!(
        client.endpoint.as_str(),
        "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-pro:generateContent"
    );
    assert_eq!(client.model(), "gemini-2.5-pro");
    assert!(!format!("{:?}", client).contains("super-secret"));
}

#[test]
fn endpoint_keeps_proxy_path() {
    let config = LlmConfig {
        api_base: "https://proxy.example.com/gemini".to_string(),
        ..LlmConfig::default()
    };
    let client = GeminiClient::new(&config, "key").expect("should build client");
    assert_eq!(
        client.endpoint.as_str(),
        "https://proxy.example.com/gemini/v1beta/models/gemini-2.5-pro:generateContent"
    );
}

#[tokio::test]
async fn request_carries_roles_and_temperature() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [
                { "role": "user", "parts": [{ "text": "What is PyPSA?" }] },
                { "role": "model", "parts": [{ "text": "A power system tool." }] },
                { "role": "user", "parts": [{ "text": "Who maintains it?" }] }
            ],
            "generationConfig": { "temperature": 0.3 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer("The PyPSA team.")))
        .expect(1)
        .mount(&server)
        .await;

    let client = GeminiClient::new(&config_for(&server), "test-key").expect("should build client");
    let turns = vec![
        ChatTurn::user("What is PyPSA?"),
        ChatTurn::assistant("A power system tool."),
        ChatTurn::user("Who maintains it?"),
    ];

    let reply = client.complete(&turns).await.expect("should complete");
    assert_eq!(reply, "The PyPSA team.");
}

#[tokio::test]
async fn multi_part_answers_are_joined() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Hello, " }, { "text": "world" }] }
            }]
        })))
        .mount(&server)
        .await;

    let client = GeminiClient::new(&config_for(&server), "k").expect("should build client");
    let reply = client
        .complete_prompt("greet")
        .await
        .expect("should complete");
    assert_eq!(reply, "Hello, world");
}

#[tokio::test]
async fn blocked_prompt_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        })))
        .mount(&server)
        .await;

    let client = GeminiClient::new(&config_for(&server), "k").expect("should build client");
    let error = client
        .complete_prompt("anything")
        .await
        .expect_err("blocked prompt should fail");
    assert!(error.to_string().contains("SAFETY"));
}

#[tokio::test]
async fn http_errors_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let client = GeminiClient::new(&config_for(&server), "bad").expect("should build client");
    assert!(client.complete_prompt("anything").await.is_err());
}

#[test]
fn empty_conversation_is_rejected() {
    let client = GeminiClient::new(&LlmConfig::default(), "k").expect("should build client");
    assert!(client.generate_blocking(&[]).is_err());
}
