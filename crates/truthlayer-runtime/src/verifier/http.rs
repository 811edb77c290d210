//! Text-classification endpoint speaking the Hugging Face inference format.
//!
//! Request: `{"inputs": {"text": premise, "text_pair": hypothesis}}`.
//! Response: `[{label, score}, ...]`, optionally wrapped in one more list.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use truthlayer_core::NliScores;

use super::{nli_slot, probability, EntailmentError, EntailmentModel};
use crate::providers::ApiCredential;

const HF_TOKEN_ENV: &str = "HF_API_TOKEN";

/// Remote NLI classifier.
#[derive(Debug)]
pub struct HttpEntailment {
    url: String,
    id: String,
    credential: Option<ApiCredential>,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct PairInput<'a> {
    text: &'a str,
    text_pair: &'a str,
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    inputs: PairInput<'a>,
}

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

impl HttpEntailment {
    /// `api_key` falls back to the `HF_API_TOKEN` environment variable; the
    /// endpoint is called anonymously when neither is set.
    pub fn new(url: impl Into<String>, api_key: Option<&str>) -> Result<Self, EntailmentError> {
        let url = url.into();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(EntailmentError::NotConfigured(
                "entailment url must start with http:// or https://".to_string(),
            ));
        }
        let config = serde_json::json!({ "api_key": api_key });
        let timeout = Duration::from_secs(30);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("truthlayer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EntailmentError::NotConfigured(e.to_string()))?;
        Ok(Self {
            id: format!("http:{}", url),
            url,
            credential: ApiCredential::optional(&config, "api_key", HF_TOKEN_ENV, "HF token"),
            timeout,
            client,
        })
    }

    async fn classify(&self, premise: &str, hypothesis: &str) -> Result<NliScores, EntailmentError> {
        let mut request = self.client.post(&self.url).json(&ClassifyRequest {
            inputs: PairInput {
                text: premise,
                text_pair: hypothesis,
            },
        });
        if let Some(credential) = &self.credential {
            request = request.bearer_auth(credential.expose());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                EntailmentError::Timeout(self.timeout)
            } else {
                EntailmentError::HttpError(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(EntailmentError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EntailmentError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| EntailmentError::Malformed(e.to_string()))?;
        normalize_scores(body)
    }
}

/// Read `[{label, score}]`, `[[{label, score}]]` or a single object into
/// three-way scores. Unknown labels are ignored; no known label is an error.
pub(crate) fn normalize_scores(body: JsonValue) -> Result<NliScores, EntailmentError> {
    let items = match body {
        JsonValue::Array(mut outer) if matches!(outer.first(), Some(JsonValue::Array(_))) => {
            outer.swap_remove(0)
        }
        other @ JsonValue::Array(_) => other,
        other @ JsonValue::Object(_) => JsonValue::Array(vec![other]),
        other => {
            return Err(EntailmentError::Malformed(format!(
                "unexpected classifier response: {}",
                other
            )))
        }
    };
    let items: Vec<LabelScore> =
        serde_json::from_value(items).map_err(|e| EntailmentError::Malformed(e.to_string()))?;

    let mut slots = [None::<f64>; 3];
    for item in items {
        if let Some(slot) = nli_slot(&item.label) {
            slots[slot] = Some(probability(&item.label, item.score)?);
        }
    }
    if slots.iter().all(Option::is_none) {
        return Err(EntailmentError::Malformed(
            "classifier returned no entailment labels".to_string(),
        ));
    }
    Ok(NliScores::new(
        slots[0].unwrap_or(0.0),
        slots[1].unwrap_or(0.0),
        slots[2].unwrap_or(0.0),
    ))
}

#[async_trait]
impl EntailmentModel for HttpEntailment {
    async fn score(
        &self,
        premises: &[String],
        hypothesis: &str,
    ) -> Result<Vec<NliScores>, EntailmentError> {
        let mut scores = Vec::with_capacity(premises.len());
        for premise in premises {
            scores.push(self.classify(premise, hypothesis).await?);
        }
        Ok(scores)
    }

    fn id(&self) -> &str {
        &self.id
    }
}
