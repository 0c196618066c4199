//! Decision output values.
//!
//! Every evaluation produces a fresh [`Decision`]: a verdict plus
//! machine-consumable metadata naming the rule that fired and why. The core
//! never persists decisions; audit and telemetry are the caller's
//! collaborators.

use std::collections::BTreeMap;
use std::fmt;

/// The outcome of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Proceed normally
    Allow,
    /// Reject for now; retry later is acceptable
    Throttle,
    /// The caller must present a step-up challenge
    Challenge,
    /// The caller must refuse the operation
    Block,
}

/// Which rule produced the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// No rule fired; clean allow
    None,
    /// A per-key epoch budget was exhausted
    BudgetLimit,
    /// The protected resource's circuit breaker denied the call
    CircuitBreaker,
    /// The abuse score crossed an escalation threshold
    ScoreEscalation,
    /// The backing store was unavailable and a degradation policy applied
    StoreFailure,
}

impl Signal {
    /// Stable machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::None => "none",
            Signal::BudgetLimit => "budget_limit",
            Signal::CircuitBreaker => "circuit_breaker",
            Signal::ScoreEscalation => "score_escalation",
            Signal::StoreFailure => "store_failure",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable cause code carried in decision metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    /// An epoch budget reached its limit
    BudgetExceeded,
    /// The breaker is Open and the cooldown has not elapsed
    CircuitBreakerOpen,
    /// A probe was already outstanding in Half-Open
    ReEntryViolation,
    /// An escalation threshold was crossed
    ScoreThreshold,
    /// The backing store could not be reached
    StoreUnavailable,
}

impl Cause {
    /// Stable machine-readable code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Cause::BudgetExceeded => "budget_exceeded",
            Cause::CircuitBreakerOpen => "circuit_breaker_open",
            Cause::ReEntryViolation => "re_entry_violation",
            Cause::ScoreThreshold => "score_threshold",
            Cause::StoreUnavailable => "store_unavailable",
        }
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observability payload attached to every decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitMetadata {
    /// Rule that fired
    pub signal: Signal,
    /// Machine-readable cause, absent on a clean allow
    pub cause: Option<Cause>,
    /// Free-form extra detail (offending key, score, level)
    pub context: BTreeMap<String, String>,
}

impl RateLimitMetadata {
    /// Metadata for a clean allow.
    pub fn clean() -> Self {
        Self {
            signal: Signal::None,
            cause: None,
            context: BTreeMap::new(),
        }
    }

    /// Metadata for a fired rule.
    pub fn fired(signal: Signal, cause: Cause) -> Self {
        Self {
            signal,
            cause: Some(cause),
            context: BTreeMap::new(),
        }
    }

    /// Attach an extra context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Verdict plus metadata, produced fresh per evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    verdict: Verdict,
    metadata: RateLimitMetadata,
}

impl Decision {
    /// A clean allow.
    pub fn allow() -> Self {
        Self {
            verdict: Verdict::Allow,
            metadata: RateLimitMetadata::clean(),
        }
    }

    /// A decision with a fired rule.
    pub fn new(verdict: Verdict, metadata: RateLimitMetadata) -> Self {
        Self { verdict, metadata }
    }

    /// The verdict.
    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    /// The attached metadata.
    pub fn metadata(&self) -> &RateLimitMetadata {
        &self.metadata
    }

    /// Whether the caller may proceed with the operation.
    pub fn is_allowed(&self) -> bool {
        self.verdict == Verdict::Allow
    }

    /// Whether the caller must interpose a challenge or refuse outright.
    pub fn requires_challenge(&self) -> bool {
        matches!(self.verdict, Verdict::Challenge | Verdict::Block)
    }

    /// Convert a CHALLENGE/BLOCK decision into the caller-raised enforcement
    /// failure, passing ALLOW/THROTTLE decisions through.
    ///
    /// `challenge_code` is the stable machine-readable code the surrounding
    /// application configured for its HTTP layer; the core does not own it.
    ///
    /// # Errors
    /// [`ChallengeRequired`] when the verdict is Challenge or Block.
    pub fn enforce(self, challenge_code: &str) -> Result<Decision, ChallengeRequired> {
        if self.requires_challenge() {
            Err(ChallengeRequired {
                code: challenge_code.to_string(),
                decision: self,
            })
        } else {
            Ok(self)
        }
    }
}

/// Control-flow failure raised by the caller after a CHALLENGE/BLOCK
/// decision.
///
/// Carries the application-configured code and the originating decision. Not
/// retryable: the operation must not be re-attempted until the challenge is
/// satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRequired {
    code: String,
    decision: Decision,
}

impl ChallengeRequired {
    /// The application-configured machine-readable code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The decision that triggered enforcement.
    pub fn decision(&self) -> &Decision {
        &self.decision
    }
}

impl fmt::Display for ChallengeRequired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "challenge required ({}): {:?} via {}",
            self.code,
            self.decision.verdict(),
            self.decision.metadata().signal
        )
    }
}

impl std::error::Error for ChallengeRequired {}
