use super::*;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(base_url: String) -> GeminiConfig {
    GeminiConfig {
        api_key: "test-key".to_string(),
        model: "gemini-1.5-flash".to_string(),
        base_url: Some(base_url),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn complete_extracts_candidate_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {
                    "parts": [{"text": "SQLQuery: SELECT 1"}]
                }
            }]
        })))
        .mount(&server)
        .await;

    let client = GeminiClient::new(&test_config(server.uri()), Duration::from_secs(5));
    let text = tokio::task::spawn_blocking(move || client.complete("question"))
        .await
        .expect("task should not panic")
        .expect("completion should succeed");

    assert_eq!(text, "SQLQuery: SELECT 1");
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_candidates_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    let client = GeminiClient::new(&test_config(server.uri()), Duration::from_secs(5));
    let err = tokio::task::spawn_blocking(move || client.complete("question"))
        .await
        .expect("task should not panic")
        .expect_err("empty candidates should fail");

    assert!(matches!(err, TidepoolError::LanguageModel(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn server_error_maps_to_language_model_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = GeminiClient::new(&test_config(server.uri()), Duration::from_secs(5));
    let err = tokio::task::spawn_blocking(move || client.complete("question"))
        .await
        .expect("task should not panic")
        .expect_err("500 should fail");

    assert_eq!(err.kind(), "language_model_error");
}

#[test]
fn endpoint_includes_model() {
    let client = GeminiClient::new(
        &test_config("http://localhost:9999/".to_string()),
        Duration::from_secs(1),
    );
    assert_eq!(
        client.endpoint(),
        "http://localhost:9999/v1beta/models/gemini-1.5-flash:generateContent"
    );
}
