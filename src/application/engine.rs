//! The abuse decision engine.
//!
//! Single entry point for request-time decisions: derives limiter keys from
//! the request context, consults budgets, the protected resource's circuit
//! breaker, and the score thresholds in that order, and renders one
//! [`Decision`]. The engine mutates nothing while deciding; budget increments
//! and breaker outcome recording happen after the protected operation, via
//! [`AbuseDecisionEngine::record_success`] / [`record_failure`] or the
//! underlying components directly. That keeps `decide` idempotent and safe to
//! call speculatively.
//!
//! [`record_failure`]: AbuseDecisionEngine::record_failure

use crate::application::budget::BudgetTracker;
use crate::application::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, RateLimitStore, StoreError};
use crate::domain::context::{KeyScope, RateLimitContext};
use crate::domain::decision::{Cause, Decision, RateLimitMetadata, Signal, Verdict};
use crate::domain::thresholds::{EscalationLevel, ScoreThresholds};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// What a breaker denial turns into for a given resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeniedAction {
    /// Reject with a retry-later verdict
    Throttle,
    /// Refuse outright
    Block,
}

/// Behavior when the backing store is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Allow the request through, with an explicit degraded signal
    FailOpen,
    /// Refuse the request, with an explicit degraded signal
    FailClosed,
}

/// Per-resource enforcement policy.
///
/// Every resource needs one: high-value resources typically pair
/// `DeniedAction::Block` with `FailurePolicy::FailClosed`, low-risk ones
/// throttle and fail open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourcePolicy {
    /// Verdict when the circuit breaker denies
    pub denied_action: DeniedAction,
    /// Behavior when the store is unreachable
    pub on_store_failure: FailurePolicy,
}

/// Daily budget limits per key scope.
///
/// All limits are integrator-supplied; the builder rejects zeroes. The
/// fingerprint limit is optional: without one, fingerprint keys are derived
/// for observability but not budget-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetLimits {
    per_ip: u64,
    per_account: u64,
    per_session: u64,
    per_fingerprint: Option<u64>,
}

impl BudgetLimits {
    /// Daily limits for the always-derived key scopes.
    pub fn new(per_ip: u64, per_account: u64, per_session: u64) -> Self {
        Self {
            per_ip,
            per_account,
            per_session,
            per_fingerprint: None,
        }
    }

    /// Enable budget checking for fingerprint-derived keys.
    pub fn with_fingerprint_limit(mut self, per_fingerprint: u64) -> Self {
        self.per_fingerprint = Some(per_fingerprint);
        self
    }

    /// The limit applying to a key scope, if that scope is budget-checked.
    pub fn limit_for(&self, scope: KeyScope) -> Option<u64> {
        match scope {
            KeyScope::Ip => Some(self.per_ip),
            KeyScope::Account => Some(self.per_account),
            KeyScope::Session => Some(self.per_session),
            KeyScope::Fingerprint => self.per_fingerprint,
        }
    }

    fn has_zero(&self) -> bool {
        self.per_ip == 0
            || self.per_account == 0
            || self.per_session == 0
            || self.per_fingerprint == Some(0)
    }
}

/// Error returned when building an [`AbuseDecisionEngine`] fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// No score thresholds supplied
    MissingThresholds,
    /// No budget limits supplied
    MissingBudgetLimits,
    /// A budget limit of zero would throttle every request
    ZeroBudgetLimit,
    /// No circuit breaker configuration supplied
    MissingBreakerConfig,
    /// No default resource policy supplied
    MissingDefaultPolicy,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::MissingThresholds => write!(f, "score thresholds are required"),
            BuildError::MissingBudgetLimits => write!(f, "budget limits are required"),
            BuildError::ZeroBudgetLimit => {
                write!(f, "budget limits must be greater than 0")
            }
            BuildError::MissingBreakerConfig => {
                write!(f, "circuit breaker configuration is required")
            }
            BuildError::MissingDefaultPolicy => {
                write!(f, "a default resource policy is required")
            }
        }
    }
}

impl std::error::Error for BuildError {}

/// Builder for constructing an [`AbuseDecisionEngine`].
///
/// Thresholds, budget limits, breaker configuration, and a default resource
/// policy are all required; none of them have invented defaults.
pub struct AbuseDecisionEngineBuilder<S>
where
    S: RateLimitStore + Clone,
{
    store: S,
    clock: Arc<dyn Clock>,
    thresholds: Option<ScoreThresholds>,
    budget_limits: Option<BudgetLimits>,
    breaker_config: Option<CircuitBreakerConfig>,
    default_policy: Option<ResourcePolicy>,
    resource_policies: BTreeMap<String, ResourcePolicy>,
}

impl<S> AbuseDecisionEngineBuilder<S>
where
    S: RateLimitStore + Clone,
{
    /// Set the score-to-escalation thresholds.
    pub fn with_thresholds(mut self, thresholds: ScoreThresholds) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    /// Set the daily budget limits.
    pub fn with_budget_limits(mut self, limits: BudgetLimits) -> Self {
        self.budget_limits = Some(limits);
        self
    }

    /// Set the circuit breaker configuration.
    pub fn with_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker_config = Some(config);
        self
    }

    /// Set the policy applied to resources without a named override.
    pub fn with_default_policy(mut self, policy: ResourcePolicy) -> Self {
        self.default_policy = Some(policy);
        self
    }

    /// Override the policy for a named resource.
    pub fn with_resource_policy(mut self, resource: impl Into<String>, policy: ResourcePolicy) -> Self {
        self.resource_policies.insert(resource.into(), policy);
        self
    }

    /// Build the engine, validating the configuration.
    ///
    /// # Errors
    /// [`BuildError`] when a required piece of configuration is missing or a
    /// budget limit is zero.
    pub fn build(self) -> Result<AbuseDecisionEngine<S>, BuildError> {
        let thresholds = self.thresholds.ok_or(BuildError::MissingThresholds)?;
        let budget_limits = self.budget_limits.ok_or(BuildError::MissingBudgetLimits)?;
        if budget_limits.has_zero() {
            return Err(BuildError::ZeroBudgetLimit);
        }
        let breaker_config = self.breaker_config.ok_or(BuildError::MissingBreakerConfig)?;
        let default_policy = self.default_policy.ok_or(BuildError::MissingDefaultPolicy)?;

        Ok(AbuseDecisionEngine {
            budgets: BudgetTracker::new(self.store.clone(), Arc::clone(&self.clock)),
            breaker: CircuitBreaker::new(self.store, self.clock, breaker_config),
            thresholds,
            budget_limits,
            default_policy,
            resource_policies: self.resource_policies,
            metrics: Metrics::new(),
        })
    }
}

/// Orchestrates budgets, the circuit breaker, and score escalation into one
/// request-time decision.
///
/// The engine is stateless and safe to share across request handlers; all
/// mutable state lives behind the store.
#[derive(Debug, Clone)]
pub struct AbuseDecisionEngine<S>
where
    S: RateLimitStore + Clone,
{
    budgets: BudgetTracker<S>,
    breaker: CircuitBreaker<S>,
    thresholds: ScoreThresholds,
    budget_limits: BudgetLimits,
    default_policy: ResourcePolicy,
    resource_policies: BTreeMap<String, ResourcePolicy>,
    metrics: Metrics,
}

impl<S> AbuseDecisionEngine<S>
where
    S: RateLimitStore + Clone,
{
    /// Start building an engine over a store and clock.
    pub fn builder(store: S, clock: Arc<dyn Clock>) -> AbuseDecisionEngineBuilder<S> {
        AbuseDecisionEngineBuilder {
            store,
            clock,
            thresholds: None,
            budget_limits: None,
            breaker_config: None,
            default_policy: None,
            resource_policies: BTreeMap::new(),
        }
    }

    /// Render a decision for one request against one protected resource.
    ///
    /// Checks run in short-circuit order: exhausted budgets throttle before
    /// any scoring, then the breaker, then score escalation (NONE allows, L2
    /// challenges, L3 blocks). The engine performs no state mutation here.
    ///
    /// A store failure is mapped through the resource's configured
    /// [`FailurePolicy`] into an explicit `store_unavailable` decision and a
    /// logged warning; it is never silently converted into a clean verdict.
    pub fn decide(&self, context: &RateLimitContext, resource: &str, score: u32) -> Decision {
        let decision = match self.check(context, resource, score) {
            Ok(decision) => decision,
            Err(error) => self.degraded_decision(resource, &error),
        };

        if decision.metadata().cause == Some(Cause::ReEntryViolation) {
            self.metrics.record_re_entry_violation();
        }
        self.metrics.record_verdict(decision.verdict());
        decision
    }

    /// Record a completed operation: count it against every budget-checked
    /// derived key and close the loop with the breaker.
    ///
    /// # Errors
    /// Propagates [`StoreError`] unmasked.
    pub fn record_success(
        &self,
        context: &RateLimitContext,
        resource: &str,
    ) -> Result<(), StoreError> {
        self.increment_budgets(context)?;
        self.breaker.record_success(resource)
    }

    /// Record a failed operation: failures consume budget too, and feed the
    /// breaker's failure window.
    ///
    /// # Errors
    /// Propagates [`StoreError`] unmasked.
    pub fn record_failure(
        &self,
        context: &RateLimitContext,
        resource: &str,
    ) -> Result<(), StoreError> {
        self.increment_budgets(context)?;
        self.breaker.record_failure(resource)
    }

    /// The budget tracker, for callers managing increments directly.
    pub fn budget_tracker(&self) -> &BudgetTracker<S> {
        &self.budgets
    }

    /// The circuit breaker, for callers recording outcomes directly.
    pub fn circuit_breaker(&self) -> &CircuitBreaker<S> {
        &self.breaker
    }

    /// Decision metrics.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// The configured thresholds.
    pub fn thresholds(&self) -> &ScoreThresholds {
        &self.thresholds
    }

    /// The policy in effect for a resource.
    pub fn policy_for(&self, resource: &str) -> ResourcePolicy {
        self.resource_policies
            .get(resource)
            .copied()
            .unwrap_or(self.default_policy)
    }

    fn check(
        &self,
        context: &RateLimitContext,
        resource: &str,
        score: u32,
    ) -> Result<Decision, StoreError> {
        // Budgets first: a throttled request is not also scored.
        for key in context.limiter_keys() {
            let Some(limit) = self.budget_limits.limit_for(key.scope()) else {
                continue;
            };

            if self.budgets.is_exceeded(&key, limit)? {
                return Ok(Decision::new(
                    Verdict::Throttle,
                    RateLimitMetadata::fired(Signal::BudgetLimit, Cause::BudgetExceeded)
                        .with_context("key", key.to_string())
                        .with_context("limit", limit.to_string()),
                ));
            }
        }

        let breaker = self.breaker.evaluate(resource)?;
        if !breaker.allowed {
            let verdict = match self.policy_for(resource).denied_action {
                DeniedAction::Throttle => Verdict::Throttle,
                DeniedAction::Block => Verdict::Block,
            };
            return Ok(Decision::new(
                verdict,
                RateLimitMetadata::fired(
                    Signal::CircuitBreaker,
                    breaker.cause.unwrap_or(Cause::CircuitBreakerOpen),
                )
                .with_context("resource", resource),
            ));
        }

        let level = self.thresholds.level_for(score);
        Ok(match level {
            EscalationLevel::None => Decision::allow(),
            EscalationLevel::L2 => Decision::new(
                Verdict::Challenge,
                self.escalation_metadata(level, score),
            ),
            EscalationLevel::L3 => {
                Decision::new(Verdict::Block, self.escalation_metadata(level, score))
            }
        })
    }

    fn escalation_metadata(&self, level: EscalationLevel, score: u32) -> RateLimitMetadata {
        RateLimitMetadata::fired(Signal::ScoreEscalation, Cause::ScoreThreshold)
            .with_context("level", level.as_str())
            .with_context("score", score.to_string())
    }

    fn degraded_decision(&self, resource: &str, error: &StoreError) -> Decision {
        self.metrics.record_store_failure();
        let policy = self.policy_for(resource);

        let verdict = match policy.on_store_failure {
            FailurePolicy::FailOpen => Verdict::Allow,
            FailurePolicy::FailClosed => Verdict::Block,
        };

        tracing::warn!(
            resource = resource,
            error = %error,
            policy = ?policy.on_store_failure,
            "store unavailable, applying configured degradation policy"
        );

        Decision::new(
            verdict,
            RateLimitMetadata::fired(Signal::StoreFailure, Cause::StoreUnavailable)
                .with_context("resource", resource)
                .with_context("error", error.to_string()),
        )
    }

    fn increment_budgets(&self, context: &RateLimitContext) -> Result<(), StoreError> {
        for key in context.limiter_keys() {
            if self.budget_limits.limit_for(key.scope()).is_some() {
                self.budgets.increment(&key)?;
            }
        }
        Ok(())
    }
}
