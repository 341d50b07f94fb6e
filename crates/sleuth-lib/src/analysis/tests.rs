//! AI analyzer tests against a mock HTTP endpoint

#[cfg(test)]
mod ai_endpoint_tests {
    use crate::analysis::{AiAnalyzer, AiEndpointConfig, AiError, SecretKeyRef};
    use crate::sources::SourceError;
    use crate::test_support::{crashing_unit, FakeSecretSource};
    use mockito::Matcher;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn analyzer() -> AiAnalyzer {
        AiAnalyzer::new(Arc::new(FakeSecretSource::with(
            "shop",
            "ai-credentials",
            "api-key",
            Ok("sk-test".to_string()),
        )))
        .unwrap()
    }

    fn endpoint(url: String, format: Option<&str>) -> AiEndpointConfig {
        AiEndpointConfig {
            endpoint: url,
            format: format.map(str::to_string),
            ..Default::default()
        }
    }

    fn log_lines() -> Vec<String> {
        (0..25).map(|i| format!("ERROR attempt {}: connection refused", i)).collect()
    }

    #[tokio::test]
    async fn test_openai_request_and_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(json!({
                "model": "gpt-3.5-turbo",
                "max_tokens": 200
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "model": "gpt-3.5-turbo-0125",
                    "choices": [{"message": {"role": "assistant", "content": "The payments service refuses connections: connection refused on port 5432"}}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let mut config = endpoint(format!("{}/v1/chat/completions", server.url()), Some("openai"));
        config.api_key = Some(SecretKeyRef {
            name: "ai-credentials".to_string(),
            key: None,
        });

        let result = analyzer()
            .analyze(&CancellationToken::new(), &log_lines(), &crashing_unit(3), &config)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.verdict.model, "gpt-3.5-turbo-0125");
        assert!(result.verdict.root_cause.contains("connection refused"));
        // >50 chars: 70, "connection refused": +5
        assert_eq!(result.verdict.confidence, 75);
        assert_eq!(result.evidence.len(), 20);
    }

    #[tokio::test]
    async fn test_anthropic_sends_version_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("anthropic-version", "2023-06-01")
            .match_body(Matcher::PartialJson(json!({"model": "claude-3-haiku-20240307"})))
            .with_status(200)
            .with_body(json!({"content": [{"type": "text", "text": "disk full"}]}).to_string())
            .create_async()
            .await;

        let config = endpoint(format!("{}/v1/messages", server.url()), Some("anthropic"));

        let result = analyzer()
            .analyze(&CancellationToken::new(), &log_lines(), &crashing_unit(0), &config)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.verdict.root_cause, "disk full");
        // no model in the response: falls back to the requested one
        assert_eq!(result.verdict.model, "claude-3-haiku-20240307");
    }

    #[tokio::test]
    async fn test_ollama_and_generic_parsing() {
        let mut server = mockito::Server::new_async().await;
        let ollama = server
            .mock("POST", "/api/generate")
            .match_body(Matcher::PartialJson(json!({"model": "llama2", "stream": false})))
            .with_status(200)
            .with_body(json!({"model": "llama2", "response": "DNS lookup failed"}).to_string())
            .create_async()
            .await;
        let generic = server
            .mock("POST", "/infer")
            .with_status(200)
            .with_body(json!({"result": "Upstream gateway returns 502"}).to_string())
            .create_async()
            .await;

        let unit = crashing_unit(0);
        let cancel = CancellationToken::new();

        let first = analyzer()
            .analyze(&cancel, &log_lines(), &unit, &endpoint(format!("{}/api/generate", server.url()), Some("ollama")))
            .await
            .unwrap();
        let second = analyzer()
            .analyze(&cancel, &log_lines(), &unit, &endpoint(format!("{}/infer", server.url()), Some("custom")))
            .await
            .unwrap();

        ollama.assert_async().await;
        generic.assert_async().await;
        assert_eq!(first.verdict.root_cause, "DNS lookup failed");
        assert_eq!(second.verdict.root_cause, "Upstream gateway returns 502");
        assert_eq!(second.verdict.model, "");
    }

    #[tokio::test]
    async fn test_custom_auth_header_without_prefix() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("x-api-key", "sk-test")
            .with_status(200)
            .with_body(json!({"choices": [{"message": {"content": "ok"}}]}).to_string())
            .create_async()
            .await;

        let mut config = endpoint(format!("{}/v1/chat/completions", server.url()), None);
        config.api_key = Some(SecretKeyRef {
            name: "ai-credentials".to_string(),
            key: Some("api-key".to_string()),
        });
        config.auth_header = Some("x-api-key".to_string());
        config.auth_prefix = Some(String::new());

        analyzer()
            .analyze(&CancellationToken::new(), &log_lines(), &crashing_unit(0), &config)
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .with_body("upstream exploded")
            .create_async()
            .await;

        let config = endpoint(format!("{}/v1/chat/completions", server.url()), None);
        let err = analyzer()
            .analyze(&CancellationToken::new(), &log_lines(), &crashing_unit(0), &config)
            .await
            .unwrap_err();

        match err {
            AiError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "upstream exploded");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unrecognized_response_format() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"output":"???"}"#)
            .create_async()
            .await;

        let config = endpoint(format!("{}/v1/chat/completions", server.url()), None);
        let result = analyzer()
            .analyze(&CancellationToken::new(), &log_lines(), &crashing_unit(0), &config)
            .await
            .unwrap();

        assert_eq!(
            result.verdict.root_cause,
            r#"AI analysis completed (response format not recognized): {"output":"???"}"#
        );
        assert_eq!(result.verdict.confidence, 50);
    }

    #[tokio::test]
    async fn test_invalid_json_is_a_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let config = endpoint(format!("{}/v1/chat/completions", server.url()), None);
        let err = analyzer()
            .analyze(&CancellationToken::new(), &log_lines(), &crashing_unit(0), &config)
            .await
            .unwrap_err();

        assert!(matches!(err, AiError::Decode(_)));
    }

    #[tokio::test]
    async fn test_missing_endpoint() {
        let err = analyzer()
            .analyze(
                &CancellationToken::new(),
                &log_lines(),
                &crashing_unit(0),
                &AiEndpointConfig::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AiError::MissingEndpoint));
    }

    #[tokio::test]
    async fn test_missing_secret_fails_the_call() {
        let mut config = endpoint("http://127.0.0.1:9/v1".to_string(), None);
        config.api_key = Some(SecretKeyRef {
            name: "absent".to_string(),
            key: None,
        });

        let err = analyzer()
            .analyze(&CancellationToken::new(), &log_lines(), &crashing_unit(0), &config)
            .await
            .unwrap_err();

        assert!(matches!(err, AiError::Credential(SourceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_request() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let config = endpoint("http://127.0.0.1:9/v1".to_string(), None);
        let err = analyzer()
            .analyze(&cancel, &log_lines(), &crashing_unit(0), &config)
            .await
            .unwrap_err();

        assert!(matches!(err, AiError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancelled_while_request_in_flight() {
        // accepts connections but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let config = endpoint(format!("http://{}/api/generate", addr), Some("ollama"));
        let analyzer = analyzer();
        let err = tokio::time::timeout(
            Duration::from_secs(5),
            analyzer.analyze(&cancel, &log_lines(), &crashing_unit(0), &config),
        )
        .await
        .expect("cancellation should abort the pending request")
        .unwrap_err();

        assert!(matches!(err, AiError::Cancelled));
    }
}
