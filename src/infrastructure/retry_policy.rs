//! Retry policy for remote enrichment calls
//!
//! Rate-limit failures and generic failures draw from separate budgets:
//! a rate-limit wait never uses up a generic retry, and generic retries
//! never shorten the rate-limit allowance.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod defaults {
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const RATE_LIMIT_DELAY_SECS: u64 = 60;
    pub const MAX_RATE_LIMIT_WAITS: u32 = 3;
    pub const BACKOFF_BASE: u64 = 2;
}

static RATE_LIMIT_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)rate[\s_-]?limit|quota|\b429\b|resource[\s_]?exhausted|too many requests").ok()
});

/// Failure class of a remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    RateLimited,
    Transient,
}

/// Classify a failure by its message text
pub fn classify(message: &str) -> FailureKind {
    if RATE_LIMIT_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(message))
    {
        FailureKind::RateLimited
    } else {
        FailureKind::Transient
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts allowed for generic failures (first call included)
    pub max_attempts: u32,
    /// Fixed wait after a rate-limit failure
    pub rate_limit_delay_secs: u64,
    /// Rate-limit waits allowed per batch
    pub max_rate_limit_waits: u32,
    /// Generic failure `n` (0-based) waits `backoff_base^n` seconds
    pub backoff_base: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_ATTEMPTS,
            rate_limit_delay_secs: defaults::RATE_LIMIT_DELAY_SECS,
            max_rate_limit_waits: defaults::MAX_RATE_LIMIT_WAITS,
            backoff_base: defaults::BACKOFF_BASE,
        }
    }
}

impl RetryPolicy {
    pub const fn rate_limit_delay(&self) -> Duration {
        Duration::from_secs(self.rate_limit_delay_secs)
    }

    /// Backoff after the generic failure with 0-based index `failure_index`
    pub fn backoff_delay(&self, failure_index: u32) -> Duration {
        Duration::from_secs(self.backoff_base.saturating_pow(failure_index))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { kind: FailureKind, delay: Duration },
    GiveUp { kind: FailureKind },
}

/// Per-batch retry accounting
#[derive(Debug, Clone)]
pub struct RetryBudget {
    policy: RetryPolicy,
    generic_failures: u32,
    rate_limit_waits: u32,
}

impl RetryBudget {
    pub const fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            generic_failures: 0,
            rate_limit_waits: 0,
        }
    }

    pub const fn generic_failures(&self) -> u32 {
        self.generic_failures
    }

    pub const fn rate_limit_waits(&self) -> u32 {
        self.rate_limit_waits
    }

    /// Record one failed attempt and decide whether to try again
    pub fn record_failure(&mut self, kind: FailureKind) -> RetryDecision {
        match kind {
            FailureKind::RateLimited => {
                if self.rate_limit_waits >= self.policy.max_rate_limit_waits {
                    return RetryDecision::GiveUp { kind };
                }
                self.rate_limit_waits += 1;
                RetryDecision::Retry {
                    kind,
                    delay: self.policy.rate_limit_delay(),
                }
            }
            FailureKind::Transient => {
                let failure_index = self.generic_failures;
                self.generic_failures += 1;
                if self.generic_failures >= self.policy.max_attempts {
                    return RetryDecision::GiveUp { kind };
                }
                RetryDecision::Retry {
                    kind,
                    delay: self.policy.backoff_delay(failure_index),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Error 429: quota exceeded", FailureKind::RateLimited)]
    #[case("Rate limit reached for model", FailureKind::RateLimited)]
    #[case("RESOURCE_EXHAUSTED", FailureKind::RateLimited)]
    #[case("HTTP 429 Too Many Requests", FailureKind::RateLimited)]
    #[case("connection reset by peer", FailureKind::Transient)]
    #[case("HTTP 500: internal error", FailureKind::Transient)]
    #[case("expected value at line 1 column 4290", FailureKind::Transient)]
    fn test_classify(#[case] message: &str, #[case] expected: FailureKind) {
        assert_eq!(classify(message), expected);
    }

    #[test]
    fn test_generic_failures_back_off_exponentially() {
        let mut budget = RetryBudget::new(RetryPolicy::default());
        assert_eq!(
            budget.record_failure(FailureKind::Transient),
            RetryDecision::Retry { kind: FailureKind::Transient, delay: Duration::from_secs(1) }
        );
        assert_eq!(
            budget.record_failure(FailureKind::Transient),
            RetryDecision::Retry { kind: FailureKind::Transient, delay: Duration::from_secs(2) }
        );
        assert_eq!(
            budget.record_failure(FailureKind::Transient),
            RetryDecision::GiveUp { kind: FailureKind::Transient }
        );
    }

    #[test]
    fn test_rate_limit_waits_do_not_consume_generic_budget() {
        let mut budget = RetryBudget::new(RetryPolicy::default());
        for _ in 0..3 {
            assert_eq!(
                budget.record_failure(FailureKind::RateLimited),
                RetryDecision::Retry {
                    kind: FailureKind::RateLimited,
                    delay: Duration::from_secs(60),
                }
            );
        }
        assert_eq!(budget.generic_failures(), 0);
        assert!(matches!(
            budget.record_failure(FailureKind::Transient),
            RetryDecision::Retry { .. }
        ));
        assert_eq!(
            budget.record_failure(FailureKind::RateLimited),
            RetryDecision::GiveUp { kind: FailureKind::RateLimited }
        );
    }

    #[test]
    fn test_single_attempt_policy_never_retries() {
        let policy = RetryPolicy { max_attempts: 1, ..RetryPolicy::default() };
        let mut budget = RetryBudget::new(policy);
        assert!(matches!(
            budget.record_failure(FailureKind::Transient),
            RetryDecision::GiveUp { .. }
        ));
    }
}
