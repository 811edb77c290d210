//! Circuit breaker to prevent cascade failures.
//!
//! When calls to one backend keep failing, its circuit opens and the items
//! routed to it fail fast instead of queueing behind a dead endpoint.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,

    /// Time before a recovery attempt is allowed
    #[serde(with = "crate::config::duration_str")]
    pub recovery_timeout: Duration,

    /// Successes needed to close the circuit again
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// State of a circuit.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitState {
    /// Normal operation
    Closed { failures: u32 },

    /// Calls are rejected without reaching the backend
    Open { opened_at: Instant },

    /// Trial calls are let through
    HalfOpen { successes: u32 },
}

/// Per-backend circuit breaker.
///
/// Each scope (a model id, a search corpus, the entailment backend) has its
/// own circuit so one failing backend does not stall the others.
pub struct CircuitBreaker {
    states: RwLock<HashMap<String, CircuitState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Whether calls for `scope` should be rejected.
    pub fn is_open(&self, scope: &str) -> bool {
        let states = self.states.read();
        match states.get(scope) {
            Some(CircuitState::Open { opened_at }) => {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    drop(states);
                    self.transition_to_half_open(scope);
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    /// Record a successful call.
    pub fn record_success(&self, scope: &str) {
        let mut states = self.states.write();
        match states.get(scope).cloned() {
            Some(CircuitState::HalfOpen { successes }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(scope.to_string(), CircuitState::Closed { failures: 0 });
                    tracing::info!(scope, "Circuit closed after successful recovery");
                } else {
                    states.insert(
                        scope.to_string(),
                        CircuitState::HalfOpen {
                            successes: successes + 1,
                        },
                    );
                }
            }
            Some(CircuitState::Closed { failures }) if failures > 0 => {
                states.insert(scope.to_string(), CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self, scope: &str) {
        let mut states = self.states.write();
        let failures = match states.get(scope).cloned() {
            None => 0,
            Some(CircuitState::Closed { failures }) => failures,
            Some(CircuitState::HalfOpen { .. }) => {
                states.insert(
                    scope.to_string(),
                    CircuitState::Open {
                        opened_at: Instant::now(),
                    },
                );
                tracing::warn!(scope, "Circuit reopened after failed recovery attempt");
                return;
            }
            Some(CircuitState::Open { .. }) => return,
        };

        if failures + 1 >= self.config.failure_threshold {
            states.insert(
                scope.to_string(),
                CircuitState::Open {
                    opened_at: Instant::now(),
                },
            );
            tracing::warn!(
                scope,
                failures = failures + 1,
                "Circuit opened after repeated failures"
            );
        } else {
            states.insert(
                scope.to_string(),
                CircuitState::Closed {
                    failures: failures + 1,
                },
            );
        }
    }

    fn transition_to_half_open(&self, scope: &str) {
        let mut states = self.states.write();
        if matches!(states.get(scope), Some(CircuitState::Open { .. })) {
            states.insert(scope.to_string(), CircuitState::HalfOpen { successes: 0 });
            tracing::info!(scope, "Circuit transitioning to half-open for recovery test");
        }
    }

    /// Current state of a circuit.
    pub fn state(&self, scope: &str) -> CircuitState {
        self.states
            .read()
            .get(scope)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }

    /// Reset all circuits to closed.
    pub fn reset(&self) {
        self.states.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
