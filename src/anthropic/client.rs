use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use super::error::AnthropicError;
use super::types::{MessagesRequest, MessagesResponse};
use crate::config::LotsawaConfig;
use crate::generation::{GenerationError, GenerationPort};

const API_URL: &str = "https://api.anthropic.com/v1/messages";

pub struct AnthropicClient {
    api_key: String,
    client: Client,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(config: &LotsawaConfig) -> Result<Self, AnthropicError> {
        Self::with_base_url(config, API_URL.to_string())
    }

    /// Create a client pointing at a custom base URL (useful for testing).
    pub fn with_base_url(config: &LotsawaConfig, base_url: String) -> Result<Self, AnthropicError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            api_key: config.api_key.clone(),
            client,
            base_url,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    pub async fn send_message(
        &self,
        req: &MessagesRequest,
    ) -> Result<MessagesResponse, AnthropicError> {
        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(req)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(AnthropicError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(AnthropicError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.json::<MessagesResponse>().await?;
        debug!(
            id = %body.id,
            input_tokens = body.usage.input_tokens,
            output_tokens = body.usage.output_tokens,
            stop_reason = body.stop_reason.as_deref().unwrap_or("none"),
            "message received"
        );
        Ok(body)
    }

    /// Single-turn completion returning the response text.
    pub async fn complete(&self, prompt: &str) -> Result<String, AnthropicError> {
        let req = MessagesRequest::user(&self.model, self.max_tokens, prompt);
        let response = self.send_message(&req).await?;
        let text = response.text();
        if text.trim().is_empty() {
            return Err(AnthropicError::EmptyResponse { id: response.id });
        }
        Ok(text)
    }
}

impl GenerationPort for AnthropicClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        Ok(self.complete(prompt).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> LotsawaConfig {
        LotsawaConfig {
            api_key: "sk-test".into(),
            model: "claude-test".into(),
            max_tokens: 64,
            ..LotsawaConfig::default()
        }
    }

    async fn client_for(server: &MockServer) -> AnthropicClient {
        AnthropicClient::with_base_url(&config(), format!("{}/v1/messages", server.uri())).unwrap()
    }

    fn reply(text: &str) -> serde_json::Value {
        json!({
            "id": "msg_1",
            "content": [{"type": "text", "text": text}],
            "model": "claude-test",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 3, "output_tokens": 4}
        })
    }

    #[tokio::test]
    async fn generate_returns_response_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("the mind of awakening")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let text = client.generate("translate").await.unwrap();
        assert_eq!(text, "the mind of awakening");

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["model"], "claude-test");
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["messages"][0]["content"], "translate");
    }

    #[tokio::test]
    async fn rate_limit_maps_to_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.complete("x").await.unwrap_err();
        assert!(matches!(err, AnthropicError::RateLimited { retry_after_ms: 7000 }));

        let err = client.generate("x").await.unwrap_err();
        assert!(matches!(err, GenerationError::Transient(_)));
    }

    #[tokio::test]
    async fn server_error_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        match client.complete("x").await.unwrap_err() {
            AnthropicError::ApiError { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "internal");
            }
            other => panic!("expected ApiError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn blank_text_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("  ")))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.generate("x").await.unwrap_err();
        assert!(matches!(err, GenerationError::Malformed { .. }));
    }

    #[tokio::test]
    async fn structured_generation_goes_through_the_schema() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(reply("```json\n{\"format_matched\": true, \"feedback\": \"\"}\n```")),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let review: crate::pipeline::FormatReview =
            crate::generation::structured(&client, "compare").await.unwrap();
        assert!(review.format_matched);
    }
}
