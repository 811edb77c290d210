//! Resilience patterns for truthlayer-runtime.
//!
//! This module provides:
//! - Circuit breaker per backend
//! - Token budget management
//! - Retry with exponential backoff
//! - A call guard combining the above with cancellation and timeouts

mod budget;
mod circuit_breaker;
mod guard;
mod retry;

pub use budget::{BudgetTracker, LlmUsage, TokenBudget};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use guard::{CallError, CallGuard, Transient};
pub use retry::backoff;
