//! Request quotas

use std::time::Duration;
use thiserror::Error;

/// Errors for quotas that can never issue a permit
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// `max_requests` was zero
    #[error("Rate limit must allow at least one request per period")]
    ZeroRequests,

    /// `per_period` was zero
    #[error("Rate limit period must be longer than zero")]
    ZeroPeriod,
}

/// At most `max_requests` requests per `per_period`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    max_requests: u32,
    per_period: Duration,
}

impl RateLimitRule {
    /// Creates a rule allowing `max_requests` per `per_period`
    ///
    /// # Returns
    /// * `Ok(RateLimitRule)` if both values are non-zero
    /// * `Err(RuleError)` otherwise
    pub fn new(max_requests: u32, per_period: Duration) -> Result<Self, RuleError> {
        if max_requests == 0 {
            return Err(RuleError::ZeroRequests);
        }
        if per_period.is_zero() {
            return Err(RuleError::ZeroPeriod);
        }
        Ok(Self {
            max_requests,
            per_period,
        })
    }

    /// `max_requests` per second
    pub fn per_second(max_requests: u32) -> Result<Self, RuleError> {
        Self::new(max_requests, Duration::from_secs(1))
    }

    /// `max_requests` per hour
    pub fn per_hour(max_requests: u32) -> Result<Self, RuleError> {
        Self::new(max_requests, Duration::from_secs(3600))
    }

    /// Built-in quotas only; callers must pass non-zero literals.
    pub(crate) const fn fixed(max_requests: u32, period_secs: u64) -> Self {
        Self {
            max_requests,
            per_period: Duration::from_secs(period_secs),
        }
    }

    /// Maximum requests per period
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Length of the quota window
    pub fn per_period(&self) -> Duration {
        self.per_period
    }
}
