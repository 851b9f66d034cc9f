#[cfg(test)]
mod tests {
    use crate::llm::gemini::GeminiClassifier;
    use crate::llm::TagClassifier;
    use broll_common::ClassifierError;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use serde_json::json;
    use std::time::Duration;

    const TEST_MODEL: &str = "test-model";

    fn client_for(server: &MockServer, key: &str) -> GeminiClassifier {
        GeminiClassifier::with_base_url(
            key.to_string(),
            TEST_MODEL.to_string(),
            server.uri(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_classify_text_success() {
        let mock_server = MockServer::start().await;

        let expected_response = json!({
            "candidates": [{
                "content": {
                    "parts": [{ "text": "```json\n{\"tags\": [{\"id\": \"coding\", \"score\": 0.9}]}\n```" }]
                }
            }]
        });

        Mock::given(method("POST"))
            .and(path(format!("/v1beta/models/{}:generateContent", TEST_MODEL)))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(expected_response))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server, "test-key");
        let reply = client.classify("tag this").await.unwrap();
        assert!(reply.structured.is_none());
        assert!(reply.text.unwrap().contains("\"coding\""));
    }

    #[tokio::test]
    async fn test_classify_function_call_is_structured() {
        let mock_server = MockServer::start().await;

        let expected_response = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{
                        "functionCall": {
                            "name": "submit_tags",
                            "args": { "tags": [{ "id": "ai", "score": 0.8 }] }
                        }
                    }]
                }
            }]
        });

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(expected_response))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server, "test-key");
        let reply = client.classify("tag this").await.unwrap();
        assert_eq!(reply.structured.unwrap()["tags"][0]["id"], "ai");
        assert!(reply.text.is_none());
    }

    #[tokio::test]
    async fn test_classify_429_is_rate_limited() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "3")
                    .set_body_json(json!({ "error": { "code": 429, "message": "Resource exhausted" } })),
            )
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server, "test-key");
        match client.classify("tag this").await {
            Err(ClassifierError::RateLimited { retry_after, message }) => {
                assert_eq!(retry_after, Some(Duration::from_secs(3)));
                assert!(message.contains("Resource exhausted"));
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_classify_503_is_server_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server, "test-key");
        let result = client.classify("tag this").await;
        assert!(matches!(result, Err(ClassifierError::Server { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_classify_403_is_fatal() {
        let mock_server = MockServer::start().await;

        let error_response = json!({
            "error": {
                "code": 403,
                "message": "Method doesn't allow unregistered callers",
                "status": "PERMISSION_DENIED"
            }
        });

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(error_response))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server, "bad-key");
        let result = client.classify("tag this").await;
        assert!(matches!(result, Err(ClassifierError::Fatal(_))));
    }

    #[tokio::test]
    async fn test_classify_empty_candidates_is_malformed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server, "test-key");
        let result = client.classify("tag this").await;
        assert!(matches!(result, Err(ClassifierError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_classify_unreachable_host_is_transient() {
        let client = GeminiClassifier::with_base_url(
            "test-key".into(),
            TEST_MODEL.into(),
            "http://127.0.0.1:1".into(),
            Duration::from_secs(2),
        );
        let err = client.classify("tag this").await.unwrap_err();
        assert!(err.is_transient(), "unexpected class: {:?}", err);
    }
}
