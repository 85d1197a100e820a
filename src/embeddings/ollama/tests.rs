use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer, dimension: u32) -> OllamaConfig {
    let address = server.address();
    OllamaConfig {
        protocol: "http".to_string(),
        host: address.ip().to_string(),
        port: address.port(),
        model: "bge-large:latest".to_string(),
        batch_size: 2,
        embedding_dimension: dimension,
    }
}

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        batch_size: 128,
        embedding_dimension: 1024,
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.model, "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.dimension(), 1024);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&OllamaConfig::default())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5)
        .with_query_instruction("");

    assert_eq!(client.retry_attempts, 5);
    assert!(client.query_instruction.is_empty());
}

#[tokio::test]
async fn embeddings_are_batched_and_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[3.0, 4.0], [0.0, 2.0]]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 2)).expect("should build client");
    let texts: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
    let vectors = client
        .embed_documents(&texts)
        .await
        .expect("should embed texts");

    assert_eq!(vectors.len(), 4);
    assert!((vectors[0][0] - 0.6).abs() < 1e-6);
    assert!((vectors[0][1] - 0.8).abs() < 1e-6);
    assert!((vectors[1][1] - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn query_gets_instruction_prefix() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({
            "input": [format!("{BGE_QUERY_INSTRUCTION}How do I add a generator?")]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 2)).expect("should build client");
    let vector = client
        .embed_query("How do I add a generator?")
        .await
        .expect("should embed query");
    assert_eq!(vector, vec![1.0, 0.0]);
}

#[tokio::test]
async fn count_mismatch_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0]]
        })))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 2)).expect("should build client");
    let texts = vec!["a".to_string(), "b".to_string()];
    assert!(client.embed_documents(&texts).await.is_err());
}

#[tokio::test]
async fn wrong_dimension_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0, 0.0]]
        })))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 2)).expect("should build client");
    assert!(client.embed_query("q").await.is_err());
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 2)).expect("should build client");
    assert!(client.embed_query("q").await.is_err());
}

#[tokio::test]
async fn health_check_finds_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "bge-large:latest" }, { "name": "llama3:8b" }]
        })))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 2)).expect("should build client");
    let check = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("blocking task should not panic");
    assert!(check.is_ok());
}
