use super::{GenerationRequest, LLMError, LLMProvider};
use crate::config::ProviderConfig;
use crate::secrets::{scrub, SecretCache};
use async_trait::async_trait;
use sdk::errors::GatewayError;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Build the HTTP client shared by every provider call.
///
/// Constructed once at startup and injected; the per-request ceiling here is
/// a backstop behind the gateway's own per-invocation timeouts.
pub fn build_http_client(config: &ProviderConfig) -> Result<reqwest::Client, GatewayError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .user_agent(concat!("chorus/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| GatewayError::Network(format!("Failed to build HTTP client: {}", e)))
}

/// Provider for any endpoint speaking the OpenAI chat completions protocol
pub struct OpenAICompatibleProvider {
    base_url: String,
    api_key_env: String,
    secret_cache: Arc<SecretCache>,
    client: reqwest::Client,
}

impl OpenAICompatibleProvider {
    pub fn new(
        config: &ProviderConfig,
        secret_cache: Arc<SecretCache>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key_env: config.api_key_env.clone(),
            secret_cache,
            client,
        }
    }

    fn payload(request: &GenerationRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.to_string(),
                    "content": msg.content
                })
            })
            .collect();

        let mut payload = json!({
            "model": request.model,
            "messages": messages,
        });

        if let Some(max_tokens) = request.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }
        if let Some(penalty) = request.frequency_penalty {
            payload["frequency_penalty"] = json!(penalty);
        }

        payload
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn check_health(&self) -> bool {
        self.secret_cache.has_secret(&self.api_key_env)
    }

    async fn generate(&self, request: &GenerationRequest) -> super::Result<String> {
        let api_key = self
            .secret_cache
            .get_secret(&self.api_key_env)
            .map_err(|e| LLMError::AuthenticationFailed(e.to_string()))?;

        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key.expose())
            .json(&Self::payload(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LLMError::NetworkError(format!("request timed out: {}", e))
                } else {
                    LLMError::NetworkError(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = scrub(&response.text().await.unwrap_or_default());

            return Err(match status.as_u16() {
                401 | 403 => LLMError::AuthenticationFailed(text),
                429 => LLMError::RateLimitExceeded,
                500..=599 => LLMError::ProviderUnavailable(format!("{}: {}", status, text)),
                _ => LLMError::InvalidRequest(format!("{}: {}", status, text)),
            });
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        let message = data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .ok_or_else(|| LLMError::ParseError("No message in response".to_string()))?;

        // Some routed models answer with `"content": null`; treat it like blank text.
        match message.get("content").and_then(|c| c.as_str()) {
            Some(content) if !content.trim().is_empty() => Ok(content.to_string()),
            _ => Err(LLMError::EmptyResponse),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> OpenAICompatibleProvider {
        let config = ProviderConfig {
            base_url: format!("{}/v1/", server.uri()),
            ..ProviderConfig::default()
        };
        let secrets = Arc::new(SecretCache::with_values([("HF_TOKEN", "hf_test_token")]));
        OpenAICompatibleProvider::new(&config, secrets, build_http_client(&config).unwrap())
    }

    fn completion(content: Value) -> Value {
        json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
    }

    #[tokio::test]
    async fn test_generate_sends_model_and_options() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer hf_test_token"))
            .and(body_partial_json(json!({
                "model": "deepseek-ai/DeepSeek-V3.2:novita",
                "max_tokens": 1500,
                "messages": [{"role": "user", "content": "hi"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!("hello"))))
            .expect(1)
            .mount(&server)
            .await;

        let request = GenerationRequest::new(
            "deepseek-ai/DeepSeek-V3.2:novita",
            vec![Message::user("hi")],
        )
        .with_max_tokens(1500);

        let text = provider_for(&server).generate(&request).await.unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_blank_and_null_content_are_empty_responses() {
        for content in [json!("   \n"), Value::Null] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200).set_body_json(completion(content)))
                .mount(&server)
                .await;

            let request = GenerationRequest::new("m", vec![Message::user("q")]);
            let err = provider_for(&server).generate(&request).await.unwrap_err();
            assert_eq!(err, LLMError::EmptyResponse);
        }
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let cases = [
            (401, "auth"),
            (429, "rate"),
            (503, "unavailable"),
            (400, "invalid"),
        ];
        for (status, kind) in cases {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
                .mount(&server)
                .await;

            let request = GenerationRequest::new("m", vec![Message::user("q")]);
            let err = provider_for(&server).generate(&request).await.unwrap_err();
            let matched = match kind {
                "auth" => matches!(err, LLMError::AuthenticationFailed(_)),
                "rate" => matches!(err, LLMError::RateLimitExceeded),
                "unavailable" => matches!(err, LLMError::ProviderUnavailable(_)),
                _ => matches!(err, LLMError::InvalidRequest(_)),
            };
            assert!(matched, "status {} mapped to {:?}", status, err);
        }
    }

    #[tokio::test]
    async fn test_missing_key_is_authentication_failure() {
        let server = MockServer::start().await;
        let config = ProviderConfig {
            base_url: server.uri(),
            api_key_env: "CHORUS_TEST_SURELY_UNSET_VARIABLE".to_string(),
            ..ProviderConfig::default()
        };
        let secrets = Arc::new(SecretCache::with_values(Vec::<(String, String)>::new()));
        let provider =
            OpenAICompatibleProvider::new(&config, secrets, build_http_client(&config).unwrap());

        assert!(!provider.check_health().await);
        let request = GenerationRequest::new("m", vec![Message::user("q")]);
        assert!(matches!(
            provider.generate(&request).await,
            Err(LLMError::AuthenticationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_upstream_error_body_is_scrubbed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_string("bad token hf_abcdefghijklmnopqrstuvwxyz0123456789"),
            )
            .mount(&server)
            .await;

        let request = GenerationRequest::new("m", vec![Message::user("q")]);
        let err = provider_for(&server).generate(&request).await.unwrap_err();
        assert!(!err.to_string().contains("hf_abcdef"));
    }
}
