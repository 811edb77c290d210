//! Aggregation of verdicts into a run summary.
//!
//! `RunSummary` is a pure projection of verdict records, ground truth and
//! coverage gaps. It is recomputed on every pass and never edited. Records
//! are sorted by (model, query, sample, position) first, so the summary does
//! not depend on the order in which work finished.
//!
//! Error verdicts are excluded from every denominator and reported as
//! coverage gaps instead.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::stats::{bootstrap_ci, mcnemar, BootstrapConfig, DEFAULT_EXACT_MAX};
use crate::types::{Label, Query, Verdict};

/// A verdict together with the context needed to aggregate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictRecord {
    pub query_id: String,
    pub model_id: String,
    pub domain: String,
    pub generation_id: String,

    /// Sample index of the generation
    #[serde(default)]
    pub sample: usize,

    /// Claim position within the generation; with the query and sample,
    /// the pairing unit across models
    pub position: usize,

    #[serde(flatten)]
    pub verdict: Verdict,
}

/// Expected label for one claim, as loaded from a labels file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimLabel {
    pub query_id: String,
    pub position: usize,
    pub label: Label,
}

/// Expected labels, by query and optionally by claim position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroundTruth {
    query_labels: BTreeMap<String, Label>,
    claim_labels: BTreeMap<(String, usize), Label>,
}

impl GroundTruth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query-level labels from each query's expected metadata.
    pub fn from_queries(queries: &[Query]) -> Self {
        let query_labels = queries
            .iter()
            .filter_map(|q| {
                let label = q.expected.as_ref()?.label?;
                Some((q.id.clone(), label))
            })
            .collect();
        Self {
            query_labels,
            claim_labels: BTreeMap::new(),
        }
    }

    /// Override the label of one claim.
    pub fn with_claim_label(mut self, query_id: impl Into<String>, position: usize, label: Label) -> Self {
        self.claim_labels.insert((query_id.into(), position), label);
        self
    }

    /// Add per-claim labels; later entries win.
    pub fn extend_claims(&mut self, labels: impl IntoIterator<Item = ClaimLabel>) {
        for l in labels {
            self.claim_labels.insert((l.query_id, l.position), l.label);
        }
    }

    /// Expected label for a claim: per-claim first, then per-query.
    pub fn expected_for(&self, query_id: &str, position: usize) -> Option<Label> {
        self.claim_labels
            .get(&(query_id.to_string(), position))
            .or_else(|| self.query_labels.get(query_id))
            .copied()
    }

    pub fn is_empty(&self) -> bool {
        self.query_labels.is_empty() && self.claim_labels.is_empty()
    }
}

/// Why an item or claim is missing from the metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapReason {
    Refused,
    GenerationFailed,
    RetrievalFailed,
    VerifierError,
    Cancelled,
}

/// One excluded item (`claim_id` unset) or claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageGap {
    pub model_id: String,
    pub query_id: String,
    #[serde(default)]
    pub sample: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_id: Option<String>,
    pub reason: GapReason,
    pub detail: String,
}

/// What was evaluated and what was left out, with reasons.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    /// (query, model, sample) items attempted
    pub items_total: usize,

    /// Items that produced at least one verdict
    pub items_evaluated: usize,

    /// Non-error verdicts entering the metrics
    pub verdicts_counted: usize,

    /// Gap counts per model and reason
    pub counts: BTreeMap<String, BTreeMap<GapReason, usize>>,

    pub gaps: Vec<CoverageGap>,
}

/// Per-model summary row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummaryRow {
    pub model: String,
    pub n: usize,
    pub exact: Option<f64>,
    pub loose: Option<f64>,
    pub soft: Option<f64>,
    pub recall: Option<f64>,
    pub supported: usize,
    pub contradicted: usize,
    pub unverifiable: usize,
}

/// Per-(model, domain) row with bootstrap bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainSummaryRow {
    pub model: String,
    pub domain: String,
    pub n: usize,
    pub exact_mean: Option<f64>,
    pub exact_lo: Option<f64>,
    pub exact_hi: Option<f64>,
    pub loose_mean: Option<f64>,
    pub loose_lo: Option<f64>,
    pub loose_hi: Option<f64>,
    pub soft_mean: Option<f64>,
    pub soft_lo: Option<f64>,
    pub soft_hi: Option<f64>,
    pub recall_mean: Option<f64>,
    pub recall_lo: Option<f64>,
    pub recall_hi: Option<f64>,
}

/// One McNemar comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseRow {
    pub model_a: String,
    pub model_b: String,
    pub metric: String,
    pub n_shared: usize,
    pub a_wrong_b_right: usize,
    pub a_right_b_wrong: usize,
    pub p_value: f64,
}

/// Aggregate tables for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub per_model: Vec<ModelSummaryRow>,
    pub per_domain: Vec<DomainSummaryRow>,
    pub pairwise: Vec<PairwiseRow>,
    pub coverage: CoverageReport,
}

/// Aggregation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub bootstrap_resamples: usize,
    pub seed: u64,
    pub mcnemar_exact_max: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        let bootstrap = BootstrapConfig::default();
        Self {
            bootstrap_resamples: bootstrap.resamples,
            seed: bootstrap.seed,
            mcnemar_exact_max: DEFAULT_EXACT_MAX,
        }
    }
}

/// Per-claim outcome against ground truth.
#[derive(Debug, Clone, Copy)]
struct Scored {
    label: Label,
    expected: Option<Label>,
    soft: Option<f64>,
}

impl Scored {
    fn exact(&self) -> Option<bool> {
        self.expected.map(|e| self.label == e)
    }

    fn loose(&self) -> Option<bool> {
        self.expected.map(|e| match e {
            Label::Supported => matches!(self.label, Label::Supported | Label::Unverifiable),
            Label::Contradicted => matches!(self.label, Label::Contradicted | Label::Unverifiable),
            other => self.label == other,
        })
    }

    fn recall(&self) -> Option<bool> {
        match self.expected {
            Some(Label::Supported) => Some(self.label == Label::Supported),
            _ => None,
        }
    }

    fn supported(&self) -> Option<bool> {
        Some(self.label == Label::Supported)
    }
}

type Metric = (&'static str, fn(&Scored) -> Option<bool>);

const PAIRWISE_METRICS: &[Metric] = &[
    ("exact", Scored::exact),
    ("loose", Scored::loose),
    ("recall", Scored::recall),
    ("supported", Scored::supported),
];

/// Builds `RunSummary` from verdict records.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    config: AggregationConfig,
}

impl Aggregator {
    pub fn new(config: AggregationConfig) -> Self {
        Self { config }
    }

    /// Summarize a run.
    ///
    /// `item_gaps` lists (query, model) items that produced no verdicts;
    /// verifier-error gaps are derived from the records themselves.
    pub fn summarize(
        &self,
        records: &[VerdictRecord],
        truth: &GroundTruth,
        item_gaps: &[CoverageGap],
    ) -> RunSummary {
        let mut sorted: Vec<&VerdictRecord> = records.iter().collect();
        sorted.sort_by(|a, b| {
            (&a.model_id, &a.query_id, a.sample, a.position)
                .cmp(&(&b.model_id, &b.query_id, b.sample, b.position))
        });

        let coverage = self.coverage(&sorted, item_gaps);

        let counted: Vec<&VerdictRecord> = sorted
            .into_iter()
            .filter(|r| !r.verdict.label.is_error())
            .collect();

        let scored: Vec<(&VerdictRecord, Scored)> = counted
            .iter()
            .map(|r| {
                let expected = truth.expected_for(&r.query_id, r.position);
                let scored = Scored {
                    label: r.verdict.label,
                    expected,
                    soft: expected.map(|e| r.verdict.score_for(e)),
                };
                (*r, scored)
            })
            .collect();

        RunSummary {
            per_model: self.per_model(&scored, &coverage.gaps),
            per_domain: self.per_domain(&scored),
            pairwise: self.pairwise(&scored),
            coverage,
        }
    }

    fn bootstrap(&self) -> BootstrapConfig {
        BootstrapConfig {
            resamples: self.config.bootstrap_resamples,
            seed: self.config.seed,
            ..BootstrapConfig::default()
        }
    }

    fn coverage(&self, records: &[&VerdictRecord], item_gaps: &[CoverageGap]) -> CoverageReport {
        let mut gaps: Vec<CoverageGap> = item_gaps.to_vec();
        gaps.extend(records.iter().filter(|r| r.verdict.label.is_error()).map(|r| CoverageGap {
            model_id: r.model_id.clone(),
            query_id: r.query_id.clone(),
            sample: r.sample,
            claim_id: Some(r.verdict.claim_id.clone()),
            reason: GapReason::VerifierError,
            detail: r.verdict.error.clone().unwrap_or_default(),
        }));
        gaps.sort_by(|a, b| {
            (&a.model_id, &a.query_id, a.sample, &a.claim_id)
                .cmp(&(&b.model_id, &b.query_id, b.sample, &b.claim_id))
        });

        let mut counts: BTreeMap<String, BTreeMap<GapReason, usize>> = BTreeMap::new();
        for gap in &gaps {
            *counts
                .entry(gap.model_id.clone())
                .or_default()
                .entry(gap.reason)
                .or_default() += 1;
        }

        let evaluated: BTreeSet<(&str, &str, usize)> = records
            .iter()
            .map(|r| (r.model_id.as_str(), r.query_id.as_str(), r.sample))
            .collect();
        // Claim-level gaps count here too: an item whose every claim was
        // cancelled has no verdicts left.
        let missing: BTreeSet<(&str, &str, usize)> = item_gaps
            .iter()
            .map(|g| (g.model_id.as_str(), g.query_id.as_str(), g.sample))
            .filter(|item| !evaluated.contains(item))
            .collect();

        CoverageReport {
            items_total: evaluated.len() + missing.len(),
            items_evaluated: evaluated.len(),
            verdicts_counted: records.iter().filter(|r| !r.verdict.label.is_error()).count(),
            counts,
            gaps,
        }
    }

    /// One row per model, including models that only have coverage gaps.
    fn per_model(
        &self,
        scored: &[(&VerdictRecord, Scored)],
        gaps: &[CoverageGap],
    ) -> Vec<ModelSummaryRow> {
        let mut by_model: BTreeMap<&str, Vec<&Scored>> = gaps
            .iter()
            .map(|g| (g.model_id.as_str(), Vec::new()))
            .collect();
        for (record, s) in scored {
            by_model.entry(record.model_id.as_str()).or_default().push(s);
        }

        by_model
            .into_iter()
            .map(|(model, items)| {
                let count = |label: Label| items.iter().filter(|s| s.label == label).count();
                ModelSummaryRow {
                    model: model.to_string(),
                    n: items.len(),
                    exact: mean(&indicator(&items, Scored::exact)),
                    loose: mean(&indicator(&items, Scored::loose)),
                    soft: mean(&items.iter().filter_map(|s| s.soft).collect::<Vec<_>>()),
                    recall: mean(&indicator(&items, Scored::recall)),
                    supported: count(Label::Supported),
                    contradicted: count(Label::Contradicted),
                    unverifiable: count(Label::Unverifiable),
                }
            })
            .collect()
    }

    fn per_domain(&self, scored: &[(&VerdictRecord, Scored)]) -> Vec<DomainSummaryRow> {
        let mut groups: BTreeMap<(&str, &str), Vec<&Scored>> = BTreeMap::new();
        for (record, s) in scored {
            groups
                .entry((record.model_id.as_str(), record.domain.as_str()))
                .or_default()
                .push(s);
        }

        let config = self.bootstrap();
        groups
            .into_iter()
            .map(|((model, domain), items)| {
                let exact = bootstrap_ci(&indicator(&items, Scored::exact), &config);
                let loose = bootstrap_ci(&indicator(&items, Scored::loose), &config);
                let soft_values: Vec<f64> = items.iter().filter_map(|s| s.soft).collect();
                let soft = bootstrap_ci(&soft_values, &config);
                let recall = bootstrap_ci(&indicator(&items, Scored::recall), &config);
                DomainSummaryRow {
                    model: model.to_string(),
                    domain: domain.to_string(),
                    n: items.len(),
                    exact_mean: exact.mean,
                    exact_lo: exact.lo,
                    exact_hi: exact.hi,
                    loose_mean: loose.mean,
                    loose_lo: loose.lo,
                    loose_hi: loose.hi,
                    soft_mean: soft.mean,
                    soft_lo: soft.lo,
                    soft_hi: soft.hi,
                    recall_mean: recall.mean,
                    recall_lo: recall.lo,
                    recall_hi: recall.hi,
                }
            })
            .collect()
    }

    fn pairwise(&self, scored: &[(&VerdictRecord, Scored)]) -> Vec<PairwiseRow> {
        let mut by_model: BTreeMap<&str, BTreeMap<(&str, usize, usize), &Scored>> =
            BTreeMap::new();
        for (record, s) in scored {
            by_model
                .entry(record.model_id.as_str())
                .or_default()
                .insert((record.query_id.as_str(), record.sample, record.position), s);
        }

        let models: Vec<&str> = by_model.keys().copied().collect();
        let mut rows = Vec::new();

        for (i, model_a) in models.iter().enumerate() {
            for model_b in &models[i + 1..] {
                let a_items = &by_model[model_a];
                let b_items = &by_model[model_b];

                for (metric, outcome) in PAIRWISE_METRICS {
                    let (a, b): (Vec<bool>, Vec<bool>) = a_items
                        .iter()
                        .filter_map(|(unit, sa)| {
                            let sb = b_items.get(unit)?;
                            Some((outcome(sa)?, outcome(sb)?))
                        })
                        .unzip();

                    if a.is_empty() {
                        continue;
                    }
                    // Lengths match by construction.
                    let Ok(result) = mcnemar(&a, &b, self.config.mcnemar_exact_max) else {
                        continue;
                    };
                    rows.push(PairwiseRow {
                        model_a: model_a.to_string(),
                        model_b: model_b.to_string(),
                        metric: metric.to_string(),
                        n_shared: result.n_shared,
                        a_wrong_b_right: result.a_wrong_b_right,
                        a_right_b_wrong: result.a_right_b_wrong,
                        p_value: result.p_value,
                    });
                }
            }
        }
        rows
    }
}

fn indicator(items: &[&Scored], outcome: fn(&Scored) -> Option<bool>) -> Vec<f64> {
    items
        .iter()
        .filter_map(|s| outcome(s))
        .map(|hit| if hit { 1.0 } else { 0.0 })
        .collect()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
