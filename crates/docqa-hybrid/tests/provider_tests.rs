use std::time::Duration;

use docqa_core::{GenerationErrorKind, GenerationProvider, GenerationRequest};
use docqa_hybrid::{AnthropicProvider, GeminiProvider, OpenAiProvider};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request() -> GenerationRequest {
    GenerationRequest {
        system_prompt: "You are the archive assistant.".to_string(),
        prompt: "Question: who planted the orchard?".to_string(),
        max_output_tokens: 256,
        temperature: 0.3,
    }
}

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn gemini_sends_system_instruction_and_reads_candidate_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-test:generateContent"))
        .and(header("x-goog-api-key", "g-key"))
        .and(body_partial_json(json!({
            "systemInstruction": {"parts": [{"text": "You are the archive assistant."}]},
            "contents": [{"role": "user", "parts": [{"text": "Question: who planted the orchard?"}]}],
            "generationConfig": {"maxOutputTokens": 256}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "Grandfather "}, {"text": "did, in 1962."}]}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = GeminiProvider::new("g-key", &server.uri(), "gemini-test").unwrap();
    assert_eq!(provider.provider_id(), "gemini:gemini-test");
    let text = provider.generate(&request(), TIMEOUT).await.unwrap();
    assert_eq!(text, "Grandfather did, in 1962.");
}

#[tokio::test]
async fn gemini_quota_body_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string(r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#))
        .mount(&server)
        .await;

    let provider = GeminiProvider::new("g-key", &server.uri(), "gemini-test").unwrap();
    let err = provider.generate(&request(), TIMEOUT).await.unwrap_err();
    assert_eq!(err.kind(), GenerationErrorKind::RateLimited);
    assert!(err.message.contains("429"));
}

#[tokio::test]
async fn gemini_without_candidates_is_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    let provider = GeminiProvider::new("g-key", &server.uri(), "gemini-test").unwrap();
    let err = provider.generate(&request(), TIMEOUT).await.unwrap_err();
    assert_eq!(err.kind(), GenerationErrorKind::Unknown);
}

#[tokio::test]
async fn openai_chat_completion_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer o-key"))
        .and(body_partial_json(json!({
            "model": "gpt-test",
            "max_tokens": 256,
            "messages": [
                {"role": "system", "content": "You are the archive assistant."},
                {"role": "user", "content": "Question: who planted the orchard?"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "Your grandfather."}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new("o-key", &server.uri(), "gpt-test").unwrap();
    assert_eq!(provider.provider_id(), "openai:gpt-test");
    assert_eq!(provider.generate(&request(), TIMEOUT).await.unwrap(), "Your grandfather.");
}

#[tokio::test]
async fn openai_unauthorized_is_invalid_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Incorrect key provided"))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new("bad", &server.uri(), "gpt-test").unwrap();
    let err = provider.generate(&request(), TIMEOUT).await.unwrap_err();
    assert_eq!(err.kind(), GenerationErrorKind::InvalidCredentials);
}

#[tokio::test]
async fn anthropic_messages_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "a-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-test",
            "system": "You are the archive assistant.",
            "max_tokens": 256
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "It was your grandfather."}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new("a-key", &server.uri(), "claude-test").unwrap();
    assert_eq!(provider.provider_id(), "anthropic:claude-test");
    assert_eq!(provider.generate(&request(), TIMEOUT).await.unwrap(), "It was your grandfather.");
}

#[tokio::test]
async fn anthropic_bad_request_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"type":"error","error":{"type":"invalid_request_error"}}"#))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new("a-key", &server.uri(), "claude-test").unwrap();
    let err = provider.generate(&request(), TIMEOUT).await.unwrap_err();
    assert_eq!(err.kind(), GenerationErrorKind::Malformed);
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new("o-key", &server.uri(), "gpt-test").unwrap();
    let err = provider.generate(&request(), Duration::from_millis(100)).await.unwrap_err();
    assert_eq!(err.kind(), GenerationErrorKind::Timeout);
}

#[test]
fn constructors_reject_blank_keys() {
    assert!(GeminiProvider::new(" ", "http://localhost", "m").is_err());
    assert!(OpenAiProvider::new("", "http://localhost", "m").is_err());
    assert!(AnthropicProvider::new("k", "http://localhost", "").is_err());
}
