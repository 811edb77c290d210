//! Token budget management for model calls.
//!
//! Enforces per-model and global token ceilings and accumulates usage and
//! estimated cost for the run metadata.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::providers::TokenUsage;

/// Token budget for one scope.
pub struct TokenBudget {
    /// Maximum tokens allowed
    pub max_tokens: u32,

    used: AtomicU32,
}

impl TokenBudget {
    pub fn new(max_tokens: u32) -> Self {
        Self {
            max_tokens,
            used: AtomicU32::new(0),
        }
    }

    /// Check if we can afford to use tokens.
    pub fn can_afford(&self, tokens: u32) -> bool {
        self.remaining() >= tokens
    }

    /// Record token usage.
    pub fn record(&self, tokens: u32) {
        self.used.fetch_add(tokens, Ordering::SeqCst);
    }

    pub fn remaining(&self) -> u32 {
        self.max_tokens.saturating_sub(self.used.load(Ordering::SeqCst))
    }

    pub fn used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }
}

/// Accumulated usage for one model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub total_tokens: u32,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,

    /// Calls that reached the backend
    pub calls: u32,

    /// Estimated cost in USD
    pub estimated_cost: f64,
}

impl LlmUsage {
    /// Add token usage from a provider response.
    pub fn add(&mut self, usage: &TokenUsage, model: &str) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total();
        self.calls += 1;
        self.estimated_cost += Self::estimate_cost(usage, model);
    }

    /// Estimate cost for a usage entry.
    fn estimate_cost(usage: &TokenUsage, model: &str) -> f64 {
        // USD per million tokens (input, output)
        let (input_rate, output_rate) = match model {
            m if m.contains("sonnet") => (3.0, 15.0),
            m if m.contains("opus") => (5.0, 25.0),
            m if m.contains("haiku") => (1.0, 5.0),
            m if m.contains("gpt-4o-mini") => (0.15, 0.6),
            m if m.contains("gpt-4o") => (2.5, 10.0),
            _ => (0.0, 0.0), // local and scripted models
        };

        (usage.prompt_tokens as f64 / 1_000_000.0) * input_rate
            + (usage.completion_tokens as f64 / 1_000_000.0) * output_rate
    }
}

/// Budget tracker for a run.
pub struct BudgetTracker {
    model_budgets: HashMap<String, TokenBudget>,
    global_budget: TokenBudget,
    usage: RwLock<BTreeMap<String, LlmUsage>>,
}

impl BudgetTracker {
    /// Budgets for the given model ids.
    ///
    /// Scopes not listed here are bounded by the global budget only.
    pub fn new<I, S>(global_max: u32, per_model_max: u32, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            model_budgets: models
                .into_iter()
                .map(|m| (m.into(), TokenBudget::new(per_model_max)))
                .collect(),
            global_budget: TokenBudget::new(global_max),
            usage: RwLock::new(BTreeMap::new()),
        }
    }

    /// Check if a call of `estimated_tokens` fits both budgets.
    pub fn can_afford(&self, scope: &str, estimated_tokens: u32) -> bool {
        let scope_ok = self
            .model_budgets
            .get(scope)
            .map(|b| b.can_afford(estimated_tokens))
            .unwrap_or(true);

        scope_ok && self.global_budget.can_afford(estimated_tokens)
    }

    /// Record usage after a call.
    pub fn record_usage(&self, scope: &str, usage: &TokenUsage, model: &str) {
        let total = usage.total();
        if let Some(budget) = self.model_budgets.get(scope) {
            budget.record(total);
        }
        self.global_budget.record(total);
        self.usage
            .write()
            .entry(scope.to_string())
            .or_default()
            .add(usage, model);
    }

    /// Usage per scope, in scope order.
    pub fn usage(&self) -> BTreeMap<String, LlmUsage> {
        self.usage.read().clone()
    }

    pub fn remaining_global(&self) -> u32 {
        self.global_budget.remaining()
    }

    pub fn remaining_for(&self, scope: &str) -> Option<u32> {
        self.model_budgets.get(scope).map(|b| b.remaining())
    }
}
