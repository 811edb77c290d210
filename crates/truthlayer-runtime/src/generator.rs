//! Constrained generation over a fixed evidence window.
//!
//! The window sent to the model is exactly what the record stores: at most
//! `max_passages` passages in retrieval order, each rendered as an
//! `[S<n>] text` line. Dropped passages and shortened passage texts are
//! listed in the record's truncation notes. With no evidence at all the
//! model is not called and the record carries the insufficient-evidence
//! answer.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use truthlayer_core::{
    shorten, EvidencePassage, Fingerprint, GenerationRecord, GenerationStatus, Query,
    WindowTruncation,
};

use crate::config::GenerationConfig;
use crate::prompts::INSUFFICIENT_EVIDENCE;
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderError};
use crate::resilience::{CallError, CallGuard};

/// A configured model: run-level id, backend model name and provider.
#[derive(Clone)]
pub struct ModelHandle {
    /// Id used in artifacts, budgets and cache keys
    pub id: String,

    /// Model name sent to the backend
    pub model: String,

    pub provider: Arc<dyn LlmProvider>,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("id", &self.id)
            .field("model", &self.model)
            .field("provider", &self.provider.name())
            .finish()
    }
}

/// Prompt and window for one (question, evidence) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedPrompt {
    pub window: Vec<EvidencePassage>,
    pub truncation: Option<WindowTruncation>,
    pub system: String,
    pub user: String,
}

#[derive(Serialize)]
struct GenerationParams<'a> {
    question: &'a str,
    system: &'a str,
    template: &'a str,
    window: Vec<(&'a str, String)>,
    max_passages: usize,
    passage_chars: usize,
    max_tokens: u32,
    temperature: f32,
    provider: &'a str,
    model: &'a str,
    sample: usize,
}

/// Produces generation records.
#[derive(Debug, Clone)]
pub struct Generator {
    config: GenerationConfig,
    call_timeout: Duration,
}

impl Generator {
    pub fn new(config: GenerationConfig, call_timeout: Duration) -> Self {
        Self {
            config,
            call_timeout,
        }
    }

    /// Build the evidence window and prompt.
    pub fn prepare(&self, question: &str, evidence: &[EvidencePassage]) -> PreparedPrompt {
        let window: Vec<EvidencePassage> = evidence
            .iter()
            .take(self.config.max_passages)
            .cloned()
            .collect();

        let mut shortened = Vec::new();
        let lines: Vec<String> = window
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let text = match shorten(&p.text, self.config.passage_chars) {
                    Some(short) => {
                        shortened.push(p.source_id.clone());
                        short
                    }
                    None => p.text.clone(),
                };
                format!("[S{}] {}", i + 1, text)
            })
            .collect();

        let truncation = (window.len() < evidence.len() || !shortened.is_empty()).then(|| {
            WindowTruncation {
                supplied: evidence.len(),
                used: window.len(),
                shortened,
            }
        });

        PreparedPrompt {
            user: self.config.prompt.render(question, &lines.join("\n")),
            system: self.config.prompt.system.clone(),
            window,
            truncation,
        }
    }

    /// Fingerprint of every input that shapes the response. Each sample
    /// index is a separate draw with its own key.
    pub fn fingerprint(
        &self,
        question: &str,
        prompt: &PreparedPrompt,
        model: &ModelHandle,
        sample: usize,
    ) -> Result<Fingerprint, serde_json::Error> {
        Fingerprint::of(&GenerationParams {
            question,
            system: &self.config.prompt.system,
            template: &self.config.prompt.user,
            window: prompt
                .window
                .iter()
                .map(|p| (p.source_id.as_str(), p.content_hash()))
                .collect(),
            max_passages: self.config.max_passages,
            passage_chars: self.config.passage_chars,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            provider: model.provider.name(),
            model: &model.model,
            sample,
        })
    }

    /// Ask `model` to answer `query` from the prepared window.
    ///
    /// A content-policy refusal is a `Refused` record, not an error.
    /// Transport failures are retried by the guard; what is left after the
    /// retry budget comes back as `Err`.
    pub async fn generate(
        &self,
        id: &str,
        sample: usize,
        query: &Query,
        prompt: PreparedPrompt,
        model: &ModelHandle,
        guard: &CallGuard,
    ) -> Result<GenerationRecord, CallError<ProviderError>> {
        let record = |response: String, status: GenerationStatus, prompt: PreparedPrompt| {
            GenerationRecord {
                id: id.to_string(),
                query_id: query.id.clone(),
                question: query.text.clone(),
                model_id: model.id.clone(),
                sample,
                evidence_window: prompt.window,
                truncation: prompt.truncation,
                response,
                status,
                created_at: Utc::now(),
            }
        };

        if prompt.window.is_empty() {
            tracing::debug!(query_id = %query.id, model_id = %model.id, "No evidence, skipping model call");
            return Ok(record(
                INSUFFICIENT_EVIDENCE.to_string(),
                GenerationStatus::Answered,
                prompt,
            ));
        }

        let completion = CompletionConfig {
            model: model.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            timeout: self.call_timeout,
        };
        let messages = vec![
            ChatMessage::system(prompt.system.clone()),
            ChatMessage::user(prompt.user.clone()),
        ];
        let estimate = model
            .provider
            .estimate_tokens(&prompt.system)
            .saturating_add(model.provider.estimate_tokens(&prompt.user))
            .saturating_add(self.config.max_tokens);

        let response = guard
            .call_metered(&model.id, estimate, || {
                model.provider.complete(messages.clone(), &completion)
            })
            .await?;
        guard
            .budgets()
            .record_usage(&model.id, &response.usage, &model.model);

        Ok(match response.refusal {
            Some(reason) => {
                tracing::warn!(query_id = %query.id, model_id = %model.id, reason = %reason, "Model refused");
                record(String::new(), GenerationStatus::Refused { reason }, prompt)
            }
            None => record(response.content, GenerationStatus::Answered, prompt),
        })
    }
}
