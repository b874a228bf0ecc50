//! Rate-limit backoff policy.

use std::time::Duration;

/// Error text TestRail returns once the API rate limit is exceeded.
pub const RATE_LIMIT_MESSAGE: &str = "API Rate Limit Exceeded";

/// HTTP status used by TestRail Cloud for throttled requests.
pub const TOO_MANY_REQUESTS: u16 = 429;

/// How the client waits out a rate-limited request.
///
/// Each rate-limited response is followed by one cooldown and one retry of
/// the identical request. With no `max_retries` the cycle repeats for as
/// long as the service keeps throttling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Time to wait before retrying.
    pub cooldown: Duration,
    /// Maximum number of retries for a single request (`None` = unbounded).
    pub max_retries: Option<u32>,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(60),
            max_retries: None,
        }
    }
}

impl RateLimitPolicy {
    /// Creates a policy with the given cooldown and no retry bound.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            max_retries: None,
        }
    }

    /// Bounds the number of retries per request.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Whether another retry is allowed after `attempts` retries already.
    pub fn should_retry(&self, attempts: u32) -> bool {
        self.max_retries.is_none_or(|max| attempts < max)
    }
}

/// Whether a response signals that the rate limit was hit.
pub fn is_rate_limited(status: u16, error: Option<&str>) -> bool {
    status == TOO_MANY_REQUESTS || error.is_some_and(|e| e.contains(RATE_LIMIT_MESSAGE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RateLimitPolicy::default();
        assert_eq!(policy.cooldown, Duration::from_secs(60));
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1_000));
    }

    #[test]
    fn test_bounded_policy() {
        let policy = RateLimitPolicy::new(Duration::from_secs(1)).with_max_retries(2);
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(is_rate_limited(200, Some("API Rate Limit Exceeded")));
        assert!(is_rate_limited(
            403,
            Some("Error: API Rate Limit Exceeded - try again later")
        ));
        assert!(is_rate_limited(429, None));
        assert!(!is_rate_limited(400, Some("Field :run_id is not a valid test run.")));
        assert!(!is_rate_limited(200, None));
    }
}
