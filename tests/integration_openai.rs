//! Integration tests for the OpenAI embedding client against a mock HTTP
//! server. The client is blocking, so calls run under `spawn_blocking`.

use docrag::config::{API_KEY_ENV, OpenAiConfig};
use docrag::embeddings::{Embedder, OpenAiClient, RetryPolicy};
use docrag::tokenizer::TokenCounter;
use serial_test::serial;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const DIM: usize = 1536;

fn test_config(server_uri: &str) -> OpenAiConfig {
    OpenAiConfig {
        base_url: server_uri.to_string(),
        embedding_model: "text-embedding-ada-002".to_string(),
        // Small enough to force several sub-batches in the batch tests.
        max_tokens_per_batch: 512,
        max_concurrency: 2,
        timeout_seconds: 10,
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)).with_sleep(|_| {})
}

fn build_client(server_uri: &str) -> OpenAiClient {
    // SAFETY: tests are serialized; no other thread reads the environment here.
    unsafe { std::env::set_var(API_KEY_ENV, "sk-test") };

    let counter = TokenCounter::new().expect("Failed to load encoding");
    OpenAiClient::new(&test_config(server_uri), fast_retry(), counter)
        .expect("Failed to create client")
}

/// Responds with a vector whose first component encodes the trailing number
/// of the input text, making every response distinguishable per input.
struct EchoEmbedding;

impl Respond for EchoEmbedding {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value =
            serde_json::from_slice(&request.body).expect("request body should be JSON");
        let input = body["input"].as_str().unwrap_or_default();
        let marker: f32 = input
            .rsplit(' ')
            .next()
            .and_then(|word| word.parse().ok())
            .unwrap_or(0.0);

        let mut vector = vec![0.0f32; DIM];
        vector[0] = marker;

        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "object": "list",
            "data": [{"object": "embedding", "index": 0, "embedding": vector}],
            "model": "text-embedding-ada-002",
        }))
    }
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn single_embedding_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(EchoEmbedding)
        .mount(&server)
        .await;

    let client = build_client(&server.uri());
    let vector = tokio::task::spawn_blocking(move || client.embed("marker 7"))
        .await
        .expect("task should not panic")
        .expect("embed should succeed");

    assert_eq!(vector.len(), DIM);
    assert_eq!(vector[0], 7.0);
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn batch_output_order_matches_input_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(EchoEmbedding)
        .mount(&server)
        .await;

    let client = build_client(&server.uri());
    // Enough texts to span sub-batches and keep both workers busy; each is
    // distinguishable by its trailing marker.
    let texts: Vec<String> = (1..=12).map(|i| format!("input text {}", i)).collect();

    let vectors = tokio::task::spawn_blocking(move || client.embed_batch(&texts))
        .await
        .expect("task should not panic")
        .expect("embed_batch should succeed");

    assert_eq!(vectors.len(), 12);
    for (i, vector) in vectors.iter().enumerate() {
        assert_eq!(
            vector[0],
            (i + 1) as f32,
            "vector at position {} came from the wrong input",
            i
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn transient_server_errors_are_retried() {
    let server = MockServer::start().await;

    // First request fails with a 500; the retry succeeds.
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(EchoEmbedding)
        .mount(&server)
        .await;

    let client = build_client(&server.uri());
    let vector = tokio::task::spawn_blocking(move || client.embed("marker 3"))
        .await
        .expect("task should not panic")
        .expect("embed should succeed after retry");

    assert_eq!(vector[0], 3.0);
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn rate_limiting_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(EchoEmbedding)
        .mount(&server)
        .await;

    let client = build_client(&server.uri());
    let vector = tokio::task::spawn_blocking(move || client.embed("marker 5"))
        .await
        .expect("task should not panic")
        .expect("embed should succeed after rate-limit retries");

    assert_eq!(vector[0], 5.0);
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let client = build_client(&server.uri());
    let result = tokio::task::spawn_blocking(move || client.embed("bad request"))
        .await
        .expect("task should not panic");

    assert!(result.is_err());
    // The mock's expect(1) verifies exactly one request arrived.
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn wrong_dimensionality_is_a_hard_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "object": "list",
            "data": [{"object": "embedding", "index": 0, "embedding": [0.1, 0.2, 0.3]}],
            "model": "text-embedding-ada-002",
        })))
        .mount(&server)
        .await;

    let client = build_client(&server.uri());
    let result = tokio::task::spawn_blocking(move || client.embed("tiny vector"))
        .await
        .expect("task should not panic");

    let error = result.expect_err("a 3-element vector must be rejected");
    assert!(error.to_string().to_lowercase().contains("dimension"));
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn exhausted_retries_surface_the_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = build_client(&server.uri());
    let result = tokio::task::spawn_blocking(move || client.embed("never works"))
        .await
        .expect("task should not panic");

    assert!(result.is_err());
}
