//! Pipeline orchestration: retrieval, generation, claim extraction and
//! verification for every (query, model) item of a run.
//!
//! Each stage result goes through the [`ResponseCache`] under a key derived
//! from its inputs, so a repeated run with unchanged configuration issues
//! no external calls and reproduces the same verdicts. Items run
//! concurrently up to `concurrency.max_in_flight_items`; external calls are
//! bounded separately by the [`CallGuard`].
//!
//! An item is one (query, model, sample) triple; `generation.samples`
//! controls how many answers are drawn per (query, model). Item outcomes
//! are collected in item order before aggregation, so completion order
//! never reaches the artifacts.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use truthlayer_core::{
    Aggregator, CacheKey, Claim, ClaimExtractor, ClaimLabel, CoverageGap, EvidencePassage,
    GapReason, GenerationRecord, GenerationStatus, GroundTruth, Query, RunSummary, Stage, Verdict,
    VerdictRecord,
};

use crate::cache::{CacheError, ResponseCache};
use crate::config::{ConfigError, EntailmentBackend, RuntimeConfig};
use crate::generator::{Generator, ModelHandle};
use crate::providers::{CompletionConfig, LlmProvider, ProviderError, ProviderRegistry};
use crate::resilience::{BudgetTracker, CallError, CallGuard, CircuitBreaker};
use crate::retrieval::{Retriever, SearchBackend, SearchError};
use crate::run::{
    check_file_stems, ArtifactError, RunContext, RunErrorEntry, RunErrorKind, RunMetadata,
};
use crate::verifier::{
    EntailmentError, EntailmentModel, LexicalEntailmentModel, LlmEntailment, Verifier,
};

/// Failure of one pipeline stage for one item.
#[derive(Error, Debug, Clone)]
pub enum StageError {
    #[error("retrieval failed: {0}")]
    Retrieval(CallError<SearchError>),

    #[error("generation failed: {0}")]
    Generation(CallError<ProviderError>),

    #[error("verification failed: {0}")]
    Verification(CallError<EntailmentError>),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("cannot fingerprint stage inputs: {0}")]
    Fingerprint(String),
}

impl From<CacheError> for StageError {
    fn from(e: CacheError) -> Self {
        StageError::Cache(e.to_string())
    }
}

impl StageError {
    /// The run was cancelled before the stage could call out.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            StageError::Retrieval(CallError::Cancelled)
                | StageError::Generation(CallError::Cancelled)
                | StageError::Verification(CallError::Cancelled)
        )
    }
}

/// Errors from building or running the pipeline.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Search backend error: {0}")]
    Search(#[from] SearchError),

    #[error("Entailment backend error: {0}")]
    Entailment(#[from] EntailmentError),

    #[error("Unknown model: '{0}'")]
    UnknownModel(String),

    #[error("No search backend for corpus '{0}'")]
    NoSearchBackend(String),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),
}

/// Assembles a [`Pipeline`] from configuration plus injected backends.
pub struct PipelineBuilder {
    config: RuntimeConfig,
    registry: Option<ProviderRegistry>,
    models: Vec<ModelHandle>,
    search: Option<Arc<dyn SearchBackend>>,
    entailment: Option<Arc<dyn EntailmentModel>>,
    cache: Option<Arc<ResponseCache>>,
    claim_labels: Vec<ClaimLabel>,
}

impl PipelineBuilder {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            registry: None,
            models: Vec::new(),
            search: None,
            entailment: None,
            cache: None,
            claim_labels: Vec::new(),
        }
    }

    /// Registry used to instantiate the models listed in the config.
    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Add a model directly; takes precedence over a config entry with the
    /// same id.
    pub fn model(
        mut self,
        id: impl Into<String>,
        model: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
    ) -> Self {
        let id = id.into();
        self.models.retain(|m| m.id != id);
        self.models.push(ModelHandle {
            id,
            model: model.into(),
            provider,
        });
        self
    }

    pub fn search_backend(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.search = Some(backend);
        self
    }

    /// Override the entailment backend chosen by `verification.backend`.
    pub fn entailment_model(mut self, model: Arc<dyn EntailmentModel>) -> Self {
        self.entailment = Some(model);
        self
    }

    /// Share a cache between pipelines; defaults to `cache.dir`.
    pub fn cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Per-claim expected labels used when scoring against ground truth.
    pub fn claim_labels(mut self, labels: Vec<ClaimLabel>) -> Self {
        self.claim_labels = labels;
        self
    }

    pub fn build(self) -> Result<Pipeline, RuntimeError> {
        let config = self.config;
        config.validate()?;

        let mut models: BTreeMap<String, ModelHandle> = BTreeMap::new();
        if !config.models.is_empty() {
            let registry = self.registry.unwrap_or_else(ProviderRegistry::with_defaults);
            for (id, spec) in &config.models {
                if self.models.iter().any(|m| &m.id == id) {
                    continue;
                }
                let provider = registry.create(&spec.provider, &spec.config)?;
                models.insert(
                    id.clone(),
                    ModelHandle {
                        id: id.clone(),
                        model: spec.model.clone(),
                        provider,
                    },
                );
            }
        }
        for handle in self.models {
            models.insert(handle.id.clone(), handle);
        }

        let search = match self.search {
            Some(backend) => backend,
            None => default_search(&config.retrieval.corpus)?,
        };

        let budgets = Arc::new(BudgetTracker::new(
            config.budgets.global_max_tokens,
            config.budgets.per_model_max_tokens,
            models.keys().cloned(),
        ));
        let breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));
        let guard = CallGuard::new(
            config.concurrency.max_external_calls,
            CancellationToken::new(),
            breaker,
            budgets.clone(),
            config.retry.clone(),
            config.call_timeout,
        );

        let entailment = match self.entailment {
            Some(model) => model,
            None => entailment_backend(&config, &models, &budgets)?,
        };

        let cache = match self.cache {
            Some(cache) => cache,
            None => Arc::new(ResponseCache::new(
                config.cache.dir.clone(),
                config.cache.max_entries,
            )),
        };

        tracing::info!(
            models = models.len(),
            search = search.name(),
            entailment = entailment.id(),
            "Pipeline ready"
        );

        Ok(Pipeline {
            retriever: Retriever::from_config(search, &config.retrieval),
            generator: Generator::new(config.generation.clone(), config.call_timeout),
            extractor: ClaimExtractor::new(config.extraction.clone()),
            verifier: Verifier::new(entailment, config.verification.policy()),
            models,
            cache,
            guard,
            claim_labels: self.claim_labels,
            config,
        })
    }
}

#[cfg(feature = "wikipedia")]
fn default_search(corpus: &str) -> Result<Arc<dyn SearchBackend>, RuntimeError> {
    if corpus == "wikipedia" {
        return Ok(Arc::new(crate::retrieval::WikipediaSearch::new()?));
    }
    Err(RuntimeError::NoSearchBackend(corpus.to_string()))
}

#[cfg(not(feature = "wikipedia"))]
fn default_search(corpus: &str) -> Result<Arc<dyn SearchBackend>, RuntimeError> {
    Err(RuntimeError::NoSearchBackend(corpus.to_string()))
}

fn entailment_backend(
    config: &RuntimeConfig,
    models: &BTreeMap<String, ModelHandle>,
    budgets: &Arc<BudgetTracker>,
) -> Result<Arc<dyn EntailmentModel>, RuntimeError> {
    match &config.verification.backend {
        EntailmentBackend::Lexical => Ok(Arc::new(LexicalEntailmentModel::new())),
        EntailmentBackend::Llm { model } => {
            let handle = models
                .get(model)
                .ok_or_else(|| RuntimeError::UnknownModel(model.clone()))?;
            let completion = CompletionConfig {
                model: handle.model.clone(),
                max_tokens: config.verification.max_tokens,
                temperature: 0.0,
                timeout: config.call_timeout,
            };
            Ok(Arc::new(
                LlmEntailment::new(handle.provider.clone(), handle.id.clone(), completion)
                    .with_budgets(budgets.clone()),
            ))
        }
        EntailmentBackend::Http { url, api_key } => http_entailment(url, api_key.as_deref()),
    }
}

#[cfg(feature = "hf-inference")]
fn http_entailment(
    url: &str,
    api_key: Option<&str>,
) -> Result<Arc<dyn EntailmentModel>, RuntimeError> {
    Ok(Arc::new(crate::verifier::HttpEntailment::new(url, api_key)?))
}

#[cfg(not(feature = "hf-inference"))]
fn http_entailment(
    url: &str,
    _api_key: Option<&str>,
) -> Result<Arc<dyn EntailmentModel>, RuntimeError> {
    Err(EntailmentError::NotConfigured(format!(
        "http entailment backend at {} requires the hf-inference feature",
        url
    ))
    .into())
}

/// What one (query, model, sample) item produced.
#[derive(Debug, Default)]
struct ItemOutcome {
    generation: Option<GenerationRecord>,

    /// (claim position, verdict)
    verdicts: Vec<(usize, Verdict)>,

    /// (claim id, reason, detail); no claim id for a gap covering the item
    gaps: Vec<(Option<String>, GapReason, String)>,

    /// Stage failure that ended the item early
    failure: Option<StageError>,

    errors: Vec<(RunErrorKind, Option<String>, String)>,
}

impl ItemOutcome {
    fn failed(kind: RunErrorKind, reason: GapReason, error: StageError) -> Self {
        let mut outcome = ItemOutcome::default();
        if error.is_cancelled() {
            outcome.gaps.push((None, GapReason::Cancelled, error.to_string()));
        } else {
            outcome.gaps.push((None, reason, error.to_string()));
            outcome.errors.push((kind, None, error.to_string()));
        }
        outcome.failure = Some(error);
        outcome
    }
}

/// The evaluation pipeline.
pub struct Pipeline {
    config: RuntimeConfig,
    retriever: Retriever,
    generator: Generator,
    extractor: ClaimExtractor,
    verifier: Verifier,
    models: BTreeMap<String, ModelHandle>,
    cache: Arc<ResponseCache>,
    guard: CallGuard,
    claim_labels: Vec<ClaimLabel>,
}

impl Pipeline {
    pub fn builder(config: RuntimeConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Model ids in sorted order.
    pub fn model_ids(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    /// Attempts that reached a model or search backend so far.
    pub fn external_calls(&self) -> usize {
        self.guard.issued()
    }

    fn model(&self, id: &str) -> Result<&ModelHandle, RuntimeError> {
        self.models
            .get(id)
            .ok_or_else(|| RuntimeError::UnknownModel(id.to_string()))
    }

    /// Evaluate one query against one model.
    ///
    /// Verdicts of every sample are returned in sample order. A refused
    /// generation yields no verdicts. A stage failure is returned as an
    /// error; per-claim verifier failures come back as error verdicts.
    pub async fn evaluate(&self, query: &Query, model_id: &str) -> Result<Vec<Verdict>, RuntimeError> {
        let model = self.model(model_id)?;
        let mut verdicts = Vec::new();
        for sample in 0..self.config.generation.samples {
            let outcome = self.evaluate_item(query, model, sample, &self.guard).await;
            if let Some(e) = outcome.failure {
                return Err(RuntimeError::Stage(e));
            }
            verdicts.extend(outcome.verdicts.into_iter().map(|(_, v)| v));
        }
        Ok(verdicts)
    }

    /// Verify one claim against caller-supplied evidence, bypassing the
    /// cache.
    pub async fn verify(
        &self,
        claim: &Claim,
        evidence: &[EvidencePassage],
    ) -> Result<Verdict, RuntimeError> {
        self.verifier
            .verify(claim, evidence, &self.guard)
            .await
            .map_err(|e| StageError::Verification(e).into())
    }

    /// Evaluate every query against every listed model and write the run
    /// artifacts into `run`'s directory.
    ///
    /// Cancelling the run stops new external calls; items that still need
    /// one are reported as cancelled coverage gaps and the partial results
    /// are written and summarized as usual.
    pub async fn evaluate_run(
        &self,
        run: &RunContext,
        queries: &[Query],
        model_ids: &[String],
    ) -> Result<RunSummary, RuntimeError> {
        if run.is_closed() {
            return Err(ArtifactError::Closed(run.run_id().to_string()).into());
        }
        check_file_stems(model_ids)?;
        let models: Vec<&ModelHandle> = model_ids
            .iter()
            .map(|id| self.model(id))
            .collect::<Result<_, _>>()?;

        let samples = self.config.generation.samples;
        tracing::info!(
            run_id = run.run_id(),
            queries = queries.len(),
            models = models.len(),
            samples,
            "Starting run"
        );

        let guard = self.guard.with_cancel(run.cancel_token().clone());
        let items: Vec<(&Query, &ModelHandle, usize)> = queries
            .iter()
            .flat_map(|q| {
                models
                    .iter()
                    .flat_map(move |m| (0..samples).map(move |s| (q, *m, s)))
            })
            .collect();

        let guard = &guard;
        let mut outcomes: Vec<(usize, ItemOutcome)> = stream::iter(items.iter().enumerate())
            .map(|(index, (query, model, sample))| async move {
                (index, self.evaluate_item(query, model, *sample, guard).await)
            })
            .buffer_unordered(self.config.concurrency.max_in_flight_items)
            .collect()
            .await;
        outcomes.sort_by_key(|(index, _)| *index);

        let mut records = Vec::new();
        let mut gaps = Vec::new();
        let mut generations = Vec::new();
        for (index, outcome) in outcomes {
            let (query, model, sample) = items[index];
            for (kind, key, message) in outcome.errors {
                run.record_error(RunErrorEntry {
                    kind,
                    query_id: query.id.clone(),
                    model_id: Some(model.id.clone()),
                    key,
                    message,
                });
            }
            for (claim_id, reason, detail) in outcome.gaps {
                gaps.push(CoverageGap {
                    model_id: model.id.clone(),
                    query_id: query.id.clone(),
                    sample,
                    claim_id,
                    reason,
                    detail,
                });
            }
            if let Some(generation) = outcome.generation {
                for (position, verdict) in outcome.verdicts {
                    records.push(VerdictRecord {
                        query_id: query.id.clone(),
                        model_id: model.id.clone(),
                        domain: query.domain.clone(),
                        generation_id: generation.id.clone(),
                        sample,
                        position,
                        verdict,
                    });
                }
                generations.push(generation);
            }
        }

        for incident in self.cache.take_incidents() {
            run.record_error(RunErrorEntry {
                kind: if incident.corrupt {
                    RunErrorKind::CacheCorrupt
                } else {
                    RunErrorKind::CacheWrite
                },
                query_id: incident.query_id,
                model_id: incident.model_id,
                key: Some(incident.key),
                message: incident.error,
            });
        }

        let mut truth = GroundTruth::from_queries(queries);
        truth.extend_claims(self.claim_labels.iter().cloned());
        let summary = Aggregator::new(self.config.aggregation).summarize(
            &records,
            &truth,
            &gaps,
        );

        let verdict_count = records.len();
        let artifacts = run.artifacts();
        {
            let queries = queries.to_vec();
            let claim_labels = self.claim_labels.clone();
            let models = model_ids.to_vec();
            let summary = summary.clone();
            let errors = run.errors();
            artifacts
                .offload(move |w| {
                    w.write_inputs(&queries, &claim_labels)?;
                    w.write_verdicts(&models, &records)?;
                    w.write_generations(&models, &generations)?;
                    w.write_summary(&summary)?;
                    w.write_errors(&errors)
                })
                .await?;
        }
        let closed_at = run.close()?;
        let metadata = RunMetadata {
            run_id: run.run_id().to_string(),
            created_at: run.created_at(),
            closed_at,
            cancelled: run.is_cancelled(),
            models: model_ids.to_vec(),
            queries: queries.len(),
            verdicts: verdict_count,
            usage: guard.budgets().usage(),
            cache: self.cache.stats(),
            aggregation: self.config.aggregation,
        };
        artifacts
            .offload(move |w| w.write_metadata(&metadata))
            .await?;

        tracing::info!(
            run_id = run.run_id(),
            verdicts = verdict_count,
            gaps = summary.coverage.gaps.len(),
            cancelled = run.is_cancelled(),
            "Run complete"
        );
        Ok(summary)
    }

    async fn evaluate_item(
        &self,
        query: &Query,
        model: &ModelHandle,
        sample: usize,
        guard: &CallGuard,
    ) -> ItemOutcome {
        let evidence = match self.retrieve(query, guard).await {
            Ok(evidence) => evidence,
            Err(e) => {
                tracing::warn!(query_id = %query.id, error = %e, "Retrieval failed");
                return ItemOutcome::failed(
                    RunErrorKind::RetrievalFailed,
                    GapReason::RetrievalFailed,
                    e,
                );
            }
        };

        let record = match self.generate(query, model, sample, &evidence, guard).await {
            Ok(record) => record,
            Err((e, failed)) => {
                tracing::warn!(query_id = %query.id, model_id = %model.id, error = %e, "Generation failed");
                let mut outcome = ItemOutcome::failed(
                    RunErrorKind::GenerationFailed,
                    GapReason::GenerationFailed,
                    e,
                );
                outcome.generation = failed;
                return outcome;
            }
        };

        let mut outcome = ItemOutcome::default();
        match &record.status {
            GenerationStatus::Answered => {}
            GenerationStatus::Refused { reason } => {
                outcome.gaps.push((None, GapReason::Refused, reason.clone()));
                outcome.generation = Some(record);
                return outcome;
            }
            GenerationStatus::Failed { reason } => {
                outcome.gaps.push((None, GapReason::GenerationFailed, reason.clone()));
                outcome.generation = Some(record);
                return outcome;
            }
        }

        let claims = self.extractor.extract(&record);
        if claims.is_empty() {
            outcome.verdicts.push((0, Verdict::placeholder(&record)));
        } else {
            let window = &record.evidence_window;
            let results = join_all(claims.iter().map(|claim| async move {
                (claim, self.verify_claim(query, model, claim, window, guard).await)
            }))
            .await;

            for (claim, result) in results {
                let verdict = match result {
                    Ok(verdict) => verdict,
                    Err(e) if e.is_cancelled() => {
                        outcome.gaps.push((
                            Some(claim.id.clone()),
                            GapReason::Cancelled,
                            e.to_string(),
                        ));
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(claim_id = %claim.id, error = %e, "Verification failed");
                        outcome.errors.push((
                            RunErrorKind::VerificationFailed,
                            Some(claim.id.clone()),
                            e.to_string(),
                        ));
                        Verdict::error(claim, record.evidence_ids(), e.to_string())
                    }
                };
                outcome.verdicts.push((claim.position, verdict));
            }
        }
        outcome.generation = Some(record);
        outcome
    }

    /// Ranked evidence for `query`; shared by every model.
    async fn retrieve(
        &self,
        query: &Query,
        guard: &CallGuard,
    ) -> Result<Vec<EvidencePassage>, StageError> {
        let retrieval = &self.config.retrieval;
        let fingerprint = self
            .retriever
            .fingerprint(&query.text, retrieval.k, &retrieval.corpus)
            .map_err(|e| StageError::Fingerprint(e.to_string()))?;
        let key = CacheKey::new(&query.id, None, Stage::Retrieval, fingerprint);

        self.cache
            .get_or_compute(&key, || async {
                guard
                    .call(self.retriever.backend_name(), || {
                        self.retriever
                            .retrieve(&query.text, retrieval.k, &retrieval.corpus)
                    })
                    .await
                    .map_err(StageError::Retrieval)
            })
            .await
    }

    /// Generation record for one sample of (query, model), with id
    /// `<key>:<sample>`. A failure comes back with an uncached `Failed`
    /// record for the artifacts.
    async fn generate(
        &self,
        query: &Query,
        model: &ModelHandle,
        sample: usize,
        evidence: &[EvidencePassage],
        guard: &CallGuard,
    ) -> Result<GenerationRecord, (StageError, Option<GenerationRecord>)> {
        let prompt = self.generator.prepare(&query.text, evidence);
        let fingerprint = self
            .generator
            .fingerprint(&query.text, &prompt, model, sample)
            .map_err(|e| (StageError::Fingerprint(e.to_string()), None))?;
        let key = CacheKey::new(&query.id, Some(&model.id), Stage::Generation, fingerprint);
        let id = format!("{}:{}", key.short_id(), sample);

        let result = self
            .cache
            .get_or_compute(&key, || async {
                self.generator
                    .generate(&id, sample, query, prompt.clone(), model, guard)
                    .await
                    .map_err(StageError::Generation)
            })
            .await;

        result.map_err(|e| {
            let failed = GenerationRecord {
                id: id.clone(),
                query_id: query.id.clone(),
                question: query.text.clone(),
                model_id: model.id.clone(),
                sample,
                evidence_window: prompt.window.clone(),
                truncation: prompt.truncation.clone(),
                response: String::new(),
                status: GenerationStatus::Failed {
                    reason: e.to_string(),
                },
                created_at: chrono::Utc::now(),
            };
            (e, Some(failed))
        })
    }

    /// Verdict for one claim. Error verdicts are never cached.
    async fn verify_claim(
        &self,
        query: &Query,
        model: &ModelHandle,
        claim: &Claim,
        evidence: &[EvidencePassage],
        guard: &CallGuard,
    ) -> Result<Verdict, StageError> {
        let fingerprint = self
            .verifier
            .fingerprint(claim, evidence)
            .map_err(|e| StageError::Fingerprint(e.to_string()))?;
        let key = CacheKey::new(&query.id, Some(&model.id), Stage::Verification, fingerprint);

        self.cache
            .get_or_compute(&key, || async {
                self.verifier
                    .verify(claim, evidence, guard)
                    .await
                    .map_err(StageError::Verification)
            })
            .await
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("retriever", &self.retriever)
            .field("verifier", &self.verifier)
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ScriptedProvider, ScriptedReply};
    use crate::retrieval::InMemoryCorpus;
    use std::time::Duration;
    use tempfile::TempDir;
    use truthlayer_core::Label;

    fn config(dir: &TempDir) -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.cache.dir = dir.path().join("cache");
        config.output.runs_dir = dir.path().join("runs");
        config.retry.min_delay = Duration::from_millis(1);
        config.retry.max_delay = Duration::from_millis(2);
        config
    }

    fn corpus() -> Arc<InMemoryCorpus> {
        Arc::new(
            InMemoryCorpus::new()
                .with_passage("p1", "Canberra is the capital city of Australia.")
                .with_passage("p2", "Sydney is the largest city in Australia."),
        )
    }

    fn pipeline(dir: &TempDir, provider: Arc<ScriptedProvider>) -> Pipeline {
        Pipeline::builder(config(dir))
            .model("scripted", "scripted-1", provider)
            .search_backend(corpus())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_evaluate_supported_answer() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(ScriptedProvider::new(
            "scripted",
            ScriptedReply::Answer("Canberra is the capital city of Australia [S1].".to_string()),
        ));
        let pipeline = pipeline(&dir, provider);
        let query = Query::new("q1", "What is the capital of Australia?");

        let verdicts = pipeline.evaluate(&query, "scripted").await.unwrap();
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].label, Label::Supported);
    }

    #[tokio::test]
    async fn test_refusal_yields_no_verdicts() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(ScriptedProvider::new(
            "scripted",
            ScriptedReply::Refuse("policy".to_string()),
        ));
        let pipeline = pipeline(&dir, provider);
        let query = Query::new("q1", "What is the capital of Australia?");

        assert!(pipeline.evaluate(&query, "scripted").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_model() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(ScriptedProvider::new(
            "scripted",
            ScriptedReply::Answer("x".to_string()),
        ));
        let pipeline = pipeline(&dir, provider);
        let query = Query::new("q1", "anything");
        assert!(matches!(
            pipeline.evaluate(&query, "missing").await,
            Err(RuntimeError::UnknownModel(_))
        ));
    }

    #[tokio::test]
    async fn test_generation_failure_is_an_error() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(ScriptedProvider::new(
            "scripted",
            ScriptedReply::Fail("bad request".to_string()),
        ));
        let pipeline = pipeline(&dir, provider.clone());
        let query = Query::new("q1", "What is the capital of Australia?");

        let err = pipeline.evaluate(&query, "scripted").await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Stage(StageError::Generation(CallError::Backend(_)))
        ));
        // Failures are not cached, so the next call tries again.
        let _ = pipeline.evaluate(&query, "scripted").await;
        assert_eq!(provider.calls(), 2);
    }

    #[test]
    fn test_missing_search_backend() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.retrieval.corpus = "nowhere".to_string();
        assert!(matches!(
            Pipeline::builder(config).build(),
            Err(RuntimeError::NoSearchBackend(_))
        ));
    }

    #[test]
    fn test_stage_error_cancellation() {
        assert!(StageError::Generation(CallError::Cancelled).is_cancelled());
        assert!(!StageError::Cache("x".to_string()).is_cancelled());
    }
}
