//! Per-destination permit issuance
//!
//! Every destination host gets its own limiter, created on first use, holding
//! the grant times of its most recent permits. A permit is issued at the
//! earliest instant when fewer than `max_requests` permits were issued within
//! the preceding `per_period`, so no window of that length ever holds more
//! than `max_requests` grants.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::RateLimitRule;

/// Quotas used when no configuration is given
const BUILTIN_RULES: &[(&str, RateLimitRule)] = &[
    ("core.cro.ie", RateLimitRule::fixed(1, 1)),
    ("indeed.com", RateLimitRule::fixed(2, 1)),
    ("linkedin.com", RateLimitRule::fixed(2, 1)),
    ("api.github.com", RateLimitRule::fixed(60, 3600)),
];

/// Quota for destinations without a rule of their own
const BUILTIN_DEFAULT: RateLimitRule = RateLimitRule::fixed(1, 2);

/// Limiter state for a single destination
#[derive(Debug)]
struct DestinationLimiter {
    rule: RateLimitRule,
    /// Grant times of the last `max_requests` permits, oldest first.
    /// The async mutex queues waiters in FIFO order.
    grants: tokio::sync::Mutex<VecDeque<Instant>>,
}

impl DestinationLimiter {
    fn new(rule: RateLimitRule) -> Self {
        Self {
            rule,
            grants: tokio::sync::Mutex::new(VecDeque::new()),
        }
    }

    /// Waits for a permit and returns how long the caller was held back
    async fn acquire(&self) -> Duration {
        let requested = Instant::now();
        // Held across the sleep so permits for this destination are issued one at a time.
        let mut grants = self.grants.lock().await;
        let period = self.rule.per_period();

        let now = Instant::now();
        while grants
            .front()
            .is_some_and(|granted| now.duration_since(*granted) >= period)
        {
            grants.pop_front();
        }

        if grants.len() >= self.rule.max_requests() as usize {
            // The oldest grant stays recorded until the sleep completes; a
            // waiter dropped mid-sleep must not free its slot early.
            if let Some(oldest) = grants.front().copied() {
                tokio::time::sleep_until(oldest + period).await;
                grants.pop_front();
            }
        }

        let granted = Instant::now();
        grants.push_back(granted);
        granted.duration_since(requested)
    }
}

/// Maps destinations to quotas and hands out permits
///
/// Rules are matched against the destination host: a rule for `linkedin.com`
/// covers `linkedin.com` and `www.linkedin.com` but not `notlinkedin.com`.
/// When several rules match, the longest pattern wins. Hosts without a
/// matching rule use the default rule, each host in its own limiter.
/// Limiters are kept for every host seen and never evicted, so memory grows
/// with the number of distinct destinations.
#[derive(Debug)]
pub struct RateLimiterRegistry {
    default_rule: RateLimitRule,
    rules: Vec<(String, RateLimitRule)>,
    limiters: Mutex<HashMap<String, Arc<DestinationLimiter>>>,
}

impl Default for RateLimiterRegistry {
    /// Registry preloaded with the built-in quotas
    fn default() -> Self {
        BUILTIN_RULES
            .iter()
            .fold(Self::new(BUILTIN_DEFAULT), |registry, (pattern, rule)| {
                registry.with_rule(*pattern, *rule)
            })
    }
}

impl RateLimiterRegistry {
    /// Creates a registry where every destination uses `default_rule`
    pub fn new(default_rule: RateLimitRule) -> Self {
        Self {
            default_rule,
            rules: Vec::new(),
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// Adds (or replaces) the rule for hosts matching `pattern`
    pub fn with_rule(mut self, pattern: impl Into<String>, rule: RateLimitRule) -> Self {
        let pattern = normalize_host(&pattern.into());
        match self.rules.iter_mut().find(|(existing, _)| *existing == pattern) {
            Some(entry) => entry.1 = rule,
            None => self.rules.push((pattern, rule)),
        }
        self
    }

    /// The rule for destinations with no specific rule
    pub fn default_rule(&self) -> &RateLimitRule {
        &self.default_rule
    }

    /// Returns the rule that applies to `destination`
    pub fn rule_for(&self, destination: &str) -> &RateLimitRule {
        let host = normalize_host(destination);
        self.rules
            .iter()
            .filter(|(pattern, _)| host_matches(&host, pattern))
            .max_by_key(|(pattern, _)| pattern.len())
            .map_or(&self.default_rule, |(_, rule)| rule)
    }

    /// Waits until a request to `destination` is permitted
    ///
    /// Suspends the calling task without failing. Callers for the same
    /// destination are served in arrival order; other destinations are
    /// unaffected.
    pub async fn acquire(&self, destination: &str) {
        let limiter = self.limiter_for(destination);
        let waited = limiter.acquire().await;
        if !waited.is_zero() {
            debug!(
                destination,
                waited_ms = waited.as_millis() as u64,
                "rate limit permit granted after wait"
            );
        }
    }

    fn limiter_for(&self, destination: &str) -> Arc<DestinationLimiter> {
        let host = normalize_host(destination);
        let mut limiters = self.limiters.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(limiter) = limiters.get(&host) {
            return Arc::clone(limiter);
        }
        let limiter = Arc::new(DestinationLimiter::new(*self.rule_for(&host)));
        limiters.insert(host, Arc::clone(&limiter));
        limiter
    }
}

fn normalize_host(host: &str) -> String {
    host.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn host_matches(host: &str, pattern: &str) -> bool {
    host == pattern
        || host
            .strip_suffix(pattern)
            .is_some_and(|prefix| prefix.ends_with('.'))
}
