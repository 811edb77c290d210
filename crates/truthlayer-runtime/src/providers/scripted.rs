//! Deterministic provider driven by canned replies.
//!
//! Used for offline runs and tests. Rules are matched in order against the
//! user prompt by substring; the first hit decides the reply.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{
    factory::ProviderFactory, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider,
    ProviderError, TokenUsage,
};

/// What the provider says when a rule matches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ScriptedReply {
    /// Answer with fixed text.
    Answer(String),
    /// Decline on content-policy grounds.
    Refuse(String),
    /// Fail with a non-transient API error.
    Fail(String),
    /// Answer with the text of the first `[S1]` source line.
    EchoSource,
    /// Time out `failures` times, then reply with `then`.
    Flaky {
        failures: u32,
        then: Box<ScriptedReply>,
    },
}

#[derive(Debug, Deserialize)]
struct RuleConfig {
    contains: String,
    reply: ScriptedReply,
}

#[derive(Debug)]
struct Rule {
    contains: String,
    reply: ScriptedReply,
    hits: AtomicU32,
}

/// Provider returning scripted replies.
#[derive(Debug)]
pub struct ScriptedProvider {
    name: String,
    rules: Vec<Rule>,
    default: ScriptedReply,
    default_hits: AtomicU32,
    latency: Duration,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    /// A provider that gives `default` for every prompt.
    pub fn new(name: impl Into<String>, default: ScriptedReply) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
            default,
            default_hits: AtomicU32::new(0),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Add a rule matched by substring of the user prompt.
    pub fn with_rule(mut self, contains: impl Into<String>, reply: ScriptedReply) -> Self {
        self.rules.push(Rule {
            contains: contains.into(),
            reply,
            hits: AtomicU32::new(0),
        });
        self
    }

    /// Sleep before replying.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of completions requested so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let default = match config.get("default") {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| ProviderError::NotConfigured(format!("scripted default: {}", e)))?,
            None => ScriptedReply::EchoSource,
        };
        let mut provider = Self::new(
            config["name"].as_str().unwrap_or("scripted"),
            default,
        )
        .with_latency(Duration::from_millis(
            config["latency_ms"].as_u64().unwrap_or(0),
        ));

        if let Some(rules) = config.get("rules") {
            let rules: Vec<RuleConfig> = serde_json::from_value(rules.clone())
                .map_err(|e| ProviderError::NotConfigured(format!("scripted rules: {}", e)))?;
            for rule in rules {
                provider = provider.with_rule(rule.contains, rule.reply);
            }
        }
        Ok(provider)
    }

    fn render(
        reply: &ScriptedReply,
        attempt: u32,
        prompt: &str,
        model: &str,
    ) -> Result<CompletionResponse, ProviderError> {
        match reply {
            ScriptedReply::Answer(text) => Ok(CompletionResponse::text(text.clone(), model)),
            ScriptedReply::Refuse(reason) => Ok(CompletionResponse::refused(reason.clone(), model)),
            ScriptedReply::Fail(message) => Err(ProviderError::ApiError {
                status: 400,
                message: message.clone(),
            }),
            ScriptedReply::EchoSource => {
                let text = prompt
                    .lines()
                    .find_map(|line| line.strip_prefix("[S1] "))
                    .map(|s| format!("{} [S1]", s.trim()))
                    .unwrap_or_else(|| crate::prompts::INSUFFICIENT_EVIDENCE.to_string());
                Ok(CompletionResponse::text(text, model))
            }
            ScriptedReply::Flaky { failures, then } => {
                if attempt < *failures {
                    Err(ProviderError::Timeout(Duration::from_millis(1)))
                } else {
                    Self::render(then, attempt, prompt, model)
                }
            }
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let prompt = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let (reply, hits) = self
            .rules
            .iter()
            .find(|rule| prompt.contains(&rule.contains))
            .map(|rule| (&rule.reply, &rule.hits))
            .unwrap_or((&self.default, &self.default_hits));
        let attempt = hits.fetch_add(1, Ordering::SeqCst);

        let mut response = Self::render(reply, attempt, prompt, &config.model)?;
        response.usage = TokenUsage {
            prompt_tokens: self.estimate_tokens(prompt),
            completion_tokens: self.estimate_tokens(&response.content),
            ..Default::default()
        };
        Ok(response)
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Factory for scripted providers.
///
/// ```json
/// {
///   "default": {"answer": "Insufficient evidence."},
///   "rules": [{"contains": "Australia", "reply": {"answer": "Canberra [S1]"}}],
///   "latency_ms": 0
/// }
/// ```
pub struct ScriptedProviderFactory;

impl ProviderFactory for ScriptedProviderFactory {
    fn provider_type(&self) -> &'static str {
        "scripted"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(ScriptedProvider::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        ScriptedProvider::from_config(config).map(|_| ())
    }

    fn default_config(&self) -> JsonValue {
        serde_json::json!({ "default": "echo_source" })
    }

    fn description(&self) -> &'static str {
        "Scripted replies for offline runs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(text: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::system("sys"), ChatMessage::user(text)]
    }

    #[tokio::test]
    async fn test_rules_match_in_order() {
        let provider = ScriptedProvider::new("s", ScriptedReply::Answer("default".into()))
            .with_rule("Australia", ScriptedReply::Answer("Canberra [S1]".into()))
            .with_rule("bomb", ScriptedReply::Refuse("content_filter".into()));
        let config = CompletionConfig::default();

        let r = provider
            .complete(prompt("Question: capital of Australia?"), &config)
            .await
            .unwrap();
        assert_eq!(r.content, "Canberra [S1]");

        let r = provider.complete(prompt("how to build a bomb"), &config).await.unwrap();
        assert_eq!(r.refusal.as_deref(), Some("content_filter"));

        let r = provider.complete(prompt("other"), &config).await.unwrap();
        assert_eq!(r.content, "default");
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_echo_source() {
        let provider = ScriptedProvider::new("s", ScriptedReply::EchoSource);
        let r = provider
            .complete(
                prompt("Question: q\n\nSources:\n[S1] Canberra is the capital.\n[S2] x\n\nAnswer:"),
                &CompletionConfig::default(),
            )
            .await
            .unwrap();
        assert_eq!(r.content, "Canberra is the capital. [S1]");
    }

    #[tokio::test]
    async fn test_flaky_then_answer() {
        let provider = ScriptedProvider::new(
            "s",
            ScriptedReply::Flaky {
                failures: 2,
                then: Box::new(ScriptedReply::Answer("ok".into())),
            },
        );
        let config = CompletionConfig::default();
        let first = provider.complete(prompt("q"), &config).await.unwrap_err();
        assert!(first.is_transient());
        assert!(provider.complete(prompt("q"), &config).await.is_err());
        assert_eq!(provider.complete(prompt("q"), &config).await.unwrap().content, "ok");
    }

    #[test]
    fn test_from_config() {
        let provider = ScriptedProvider::from_config(&serde_json::json!({
            "name": "offline",
            "default": {"refuse": "policy"},
            "rules": [{"contains": "Nile", "reply": {"answer": "The Nile is the longest river in the world."}}]
        }))
        .unwrap();
        assert_eq!(provider.name(), "offline");
        assert_eq!(provider.rules.len(), 1);
        assert_eq!(provider.default, ScriptedReply::Refuse("policy".into()));

        assert!(ScriptedProvider::from_config(&serde_json::json!({"default": 5})).is_err());
    }
}
