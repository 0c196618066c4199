//! # abuse-guard
//!
//! Request-time abuse defense for admin-facing backends: per-key epoch
//! budgets, a circuit breaker over a shared signal store, and score-based
//! threshold escalation, combined into a single decision per request.
//!
//! Every request produces exactly one [`Decision`]: **allow**, **throttle**,
//! **challenge**, or **block**, with machine-readable metadata naming the
//! rule that fired. The engine holds no mutable state of its own; budgets
//! and breaker state live behind a store port with explicit atomicity
//! guarantees, so any number of processes can share one view of an attacker.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use abuse_guard::{
//!     AbuseDecisionEngine, BudgetLimits, CircuitBreakerConfig, DeniedAction,
//!     FailurePolicy, InMemoryStore, RateLimitContext, ResourcePolicy,
//!     ScoreThresholds, SystemClock,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let store = Arc::new(InMemoryStore::new());
//! let clock = Arc::new(SystemClock::new());
//!
//! let engine = AbuseDecisionEngine::builder(store, clock)
//!     .with_thresholds(ScoreThresholds::new(50, 100).unwrap())
//!     .with_budget_limits(BudgetLimits::new(1_000, 200, 2_000))
//!     .with_breaker_config(
//!         CircuitBreakerConfig::new(5, Duration::from_secs(300), Duration::from_secs(60))
//!             .unwrap(),
//!     )
//!     .with_default_policy(ResourcePolicy {
//!         denied_action: DeniedAction::Throttle,
//!         on_store_failure: FailurePolicy::FailOpen,
//!     })
//!     .with_resource_policy(
//!         "login",
//!         ResourcePolicy {
//!             denied_action: DeniedAction::Block,
//!             on_store_failure: FailurePolicy::FailClosed,
//!         },
//!     )
//!     .build()
//!     .unwrap();
//!
//! let context = RateLimitContext::new("1.2.3.4".parse().unwrap(), "agent/1.0")
//!     .with_account_id("42");
//!
//! // Read-only decision; nothing is counted yet
//! let decision = engine.decide(&context, "login", 0);
//!
//! if decision.is_allowed() {
//!     // ... perform the protected operation, then close the loop:
//!     engine.record_success(&context, "login").unwrap();
//! }
//! ```
//!
//! ## Decision Pipeline
//!
//! Checks run in short-circuit order:
//!
//! 1. **Budgets.** Limiter keys are derived from the context (`ip:` always,
//!    `account:` when an account id is present, `session:` for trusted
//!    sessions with a device id, `fp:` for hashed client fingerprints). Any
//!    exhausted budget throttles immediately with cause `budget_exceeded`;
//!    a throttled request is never scored.
//! 2. **Circuit breaker.** One breaker per protected resource. An Open
//!    breaker denies with `circuit_breaker_open` until its cooldown elapses;
//!    the first evaluation afterwards claims a single probe slot, and
//!    concurrent attempts are rejected as `re_entry_violation`. Whether a
//!    denial throttles or blocks is per-resource policy.
//! 3. **Score escalation.** The caller-computed abuse score maps through
//!    [`ScoreThresholds`]: below L2 allows, L2 challenges, L3 blocks.
//!
//! `decide` never writes. After the protected operation completes the caller
//! records the outcome ([`AbuseDecisionEngine::record_success`] /
//! [`AbuseDecisionEngine::record_failure`]), which consumes budget and feeds
//! the breaker's failure window. This split keeps the read path idempotent
//! and safe to call speculatively.
//!
//! ## Store Failures
//!
//! The component APIs propagate store failures as [`StoreError`]; nothing is
//! masked. At the `decide` boundary the failure maps through the resource's
//! configured [`FailurePolicy`]: fail-open allows the request, fail-closed
//! blocks it, and either way the decision carries an explicit
//! `store_unavailable` signal and a warning is logged via `tracing`.
//!
//! ## Enforcement
//!
//! A CHALLENGE or BLOCK verdict is surfaced to the surrounding application
//! through [`Decision::enforce`], which produces a [`ChallengeRequired`]
//! failure carrying an application-configured machine-readable code. The
//! engine decides *that* a challenge is required, never *how* it is
//! presented.
//!
//! ## Deployment
//!
//! - Single process: [`InMemoryStore`], DashMap-backed, with the same
//!   compare-and-swap semantics as the distributed backend.
//! - Multiple processes: `RedisStore` (behind the `redis-storage` feature),
//!   which runs the atomic increment and the breaker compare-and-swap as
//!   server-side Lua scripts.
//!
//! There are no background timers anywhere: epoch expiry and breaker
//! cooldowns are evaluated lazily against an injected [`Clock`], which makes
//! behavior deterministic under a mock clock in tests.

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    breaker::{BreakerStatus, CircuitBreakerState},
    budget::{BudgetRecord, EPOCH_DURATION},
    context::{KeyScope, LimiterKey, RateLimitContext},
    decision::{Cause, ChallengeRequired, Decision, RateLimitMetadata, Signal, Verdict},
    thresholds::{EscalationLevel, ScoreThresholds, ThresholdsError},
};

pub use application::{
    budget::BudgetTracker,
    circuit_breaker::{
        BreakerConfigError, BreakerDecision, CircuitBreaker, CircuitBreakerConfig,
    },
    engine::{
        AbuseDecisionEngine, AbuseDecisionEngineBuilder, BudgetLimits, BuildError, DeniedAction,
        FailurePolicy, ResourcePolicy,
    },
    metrics::{Metrics, MetricsSnapshot},
    ports::{CasOutcome, Clock, RateLimitStore, StoreError, VersionedBreakerState},
};

pub use infrastructure::{clock::SystemClock, store::InMemoryStore};

#[cfg(feature = "redis-storage")]
pub use infrastructure::redis_store::{RedisStore, RedisStoreConfig};
