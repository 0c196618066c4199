//! Score-to-escalation-level mapping.
//!
//! An abuse score is accumulated by the caller from weighted signals (failed
//! logins, velocity, fingerprint mismatch); this module only turns the final
//! number into a discrete escalation level. Thresholds are validated once at
//! configuration time and never consulted mutably afterwards.

use std::fmt;

/// Escalation tier derived from an abuse score, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EscalationLevel {
    /// No escalation
    None,
    /// Step-up challenge required
    L2,
    /// Operation refused
    L3,
}

impl EscalationLevel {
    /// Stable machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationLevel::None => "none",
            EscalationLevel::L2 => "l2",
            EscalationLevel::L3 => "l3",
        }
    }
}

impl fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation failure for a threshold mapping.
///
/// Raised at configuration-load time only; a constructed `ScoreThresholds`
/// can never fail at request time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThresholdsError {
    /// A threshold of zero would escalate a clean (score 0) request
    ZeroThreshold,
    /// L3 must not sit below L2
    NonMonotonic {
        /// Configured L2 threshold
        l2: u32,
        /// Configured L3 threshold
        l3: u32,
    },
}

impl fmt::Display for ThresholdsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdsError::ZeroThreshold => {
                write!(f, "escalation thresholds must be greater than 0")
            }
            ThresholdsError::NonMonotonic { l2, l3 } => {
                write!(
                    f,
                    "escalation thresholds must be monotonic: l3 ({}) < l2 ({})",
                    l3, l2
                )
            }
        }
    }
}

impl std::error::Error for ThresholdsError {}

/// Immutable mapping from escalation level to minimum score.
///
/// `level_for` returns the highest-severity level whose threshold is `<=`
/// the score; a score meeting both thresholds resolves to L3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreThresholds {
    l2: u32,
    l3: u32,
}

impl ScoreThresholds {
    /// Build a threshold mapping, validating monotonicity.
    ///
    /// # Errors
    /// `ZeroThreshold` if either threshold is 0, `NonMonotonic` if `l3 < l2`.
    pub fn new(l2: u32, l3: u32) -> Result<Self, ThresholdsError> {
        if l2 == 0 || l3 == 0 {
            return Err(ThresholdsError::ZeroThreshold);
        }
        if l3 < l2 {
            return Err(ThresholdsError::NonMonotonic { l2, l3 });
        }
        Ok(Self { l2, l3 })
    }

    /// Minimum score for a step-up challenge.
    pub fn l2(&self) -> u32 {
        self.l2
    }

    /// Minimum score for an outright block.
    pub fn l3(&self) -> u32 {
        self.l3
    }

    /// Map a score to its escalation level.
    pub fn level_for(&self, score: u32) -> EscalationLevel {
        if score >= self.l3 {
            EscalationLevel::L3
        } else if score >= self.l2 {
            EscalationLevel::L2
        } else {
            EscalationLevel::None
        }
    }
}
