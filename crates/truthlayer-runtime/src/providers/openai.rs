//! OpenAI-compatible chat completions provider.
//!
//! Works against any server exposing `/chat/completions` with the OpenAI
//! request shape. A `content_filter` finish reason or a populated
//! `message.refusal` field is reported as a refusal.

use super::{
    check_base_url, factory::ProviderFactory, http_client, is_refusal_reason, rate_limited,
    secrets::ApiCredential, send_error, ChatMessage, CompletionConfig, CompletionResponse,
    LlmProvider, ProviderError, TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable name for the OpenAI API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI chat completions provider.
pub struct OpenAiProvider {
    credential: ApiCredential,
    base_url: String,
    organization: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("organization", &self.organization)
            .finish()
    }
}

impl OpenAiProvider {
    /// Create from JSON configuration, falling back to `OPENAI_API_KEY`.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_config_or_env(
            config,
            "api_key",
            OPENAI_API_KEY_ENV,
            "OpenAI API key",
        )?;
        let base_url = config["base_url"]
            .as_str()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        let timeout = config["timeout_secs"].as_u64().unwrap_or(60);

        Ok(Self {
            credential,
            base_url,
            organization: config["organization"].as_str().map(str::to_string),
            client: http_client(Duration::from_secs(timeout))?,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

fn into_completion(body: ChatResponse) -> Result<CompletionResponse, ProviderError> {
    let usage = body
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            ..Default::default()
        })
        .unwrap_or_default();

    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ParseError("response has no choices".to_string()))?;

    let refusal = choice.message.refusal.filter(|r| !r.trim().is_empty()).or_else(|| {
        choice
            .finish_reason
            .as_deref()
            .filter(|r| is_refusal_reason(r))
            .map(str::to_string)
    });
    if let Some(reason) = refusal {
        let mut refused = CompletionResponse::refused(reason, body.model);
        refused.usage = usage;
        return Ok(refused);
    }

    Ok(CompletionResponse {
        content: choice.message.content.unwrap_or_default(),
        usage,
        model: body.model,
        stop_reason: choice.finish_reason,
        refusal: None,
    })
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = ChatRequest {
            model: &config.model,
            messages: &messages,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.credential.expose())
            .timeout(config.timeout)
            .json(&request);
        if let Some(org) = &self.organization {
            builder = builder.header("OpenAI-Organization", org);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| send_error(e, config.timeout))?;

        let status = response.status();
        if status == 429 {
            return Err(rate_limited(&response));
        }
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthError);
        }
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .map(|body| body.error.message)
                .unwrap_or_else(|e| e.to_string());
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;
        into_completion(body)
    }

    async fn health_check(&self) -> bool {
        !self.credential.expose().is_empty()
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Factory for OpenAI-compatible providers.
///
/// ```json
/// {
///   "api_key": "sk-...",
///   "base_url": "https://api.openai.com/v1",
///   "organization": "org-...",
///   "model": "gpt-4o-mini"
/// }
/// ```
pub struct OpenAiProviderFactory;

impl ProviderFactory for OpenAiProviderFactory {
    fn provider_type(&self) -> &'static str {
        "openai"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(OpenAiProvider::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, "api_key", OPENAI_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "OpenAI API key required: set 'api_key' in config or {} env",
                OPENAI_API_KEY_ENV
            )));
        }
        check_base_url(config)
    }

    fn default_config(&self) -> JsonValue {
        serde_json::json!({ "model": "gpt-4o-mini" })
    }

    fn description(&self) -> &'static str {
        "OpenAI-compatible chat completions"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ChatResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_answer_parsed() {
        let response = into_completion(parse(
            r#"{"model": "gpt-4o-mini",
                "choices": [{"message": {"role": "assistant", "content": "Canberra [S1]"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 40, "completion_tokens": 4, "total_tokens": 44}}"#,
        ))
        .unwrap();
        assert_eq!(response.content, "Canberra [S1]");
        assert!(response.refusal.is_none());
        assert_eq!(response.usage.total(), 44);
    }

    #[test]
    fn test_content_filter_is_refusal() {
        let response = into_completion(parse(
            r#"{"model": "m", "choices": [{"message": {"content": null}, "finish_reason": "content_filter"}]}"#,
        ))
        .unwrap();
        assert_eq!(response.refusal.as_deref(), Some("content_filter"));
    }

    #[test]
    fn test_refusal_field_is_refusal() {
        let response = into_completion(parse(
            r#"{"model": "m", "choices": [{"message": {"content": null, "refusal": "I can't help with that."}, "finish_reason": "stop"}]}"#,
        ))
        .unwrap();
        assert_eq!(response.refusal.as_deref(), Some("I can't help with that."));
    }

    #[test]
    fn test_empty_choices_is_parse_error() {
        let err = into_completion(parse(r#"{"model": "m", "choices": []}"#)).unwrap_err();
        assert!(matches!(err, ProviderError::ParseError(_)));
    }

    #[test]
    fn test_validate_requires_key() {
        let factory = OpenAiProviderFactory;
        assert!(factory
            .validate_config(&serde_json::json!({"api_key": "k", "base_url": "ftp://x"}))
            .is_err());
        assert!(factory
            .validate_config(&serde_json::json!({"api_key": "k"}))
            .is_ok());
    }
}
