//! Per-destination request throttling
//!
//! Quotas are configured per host pattern with a mandatory default. Acquiring
//! a permit suspends the caller until the destination's quota allows another
//! request.

mod registry;
mod rule;

pub use registry::RateLimiterRegistry;
pub use rule::{RateLimitRule, RuleError};
