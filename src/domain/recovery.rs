//! Transport-failure recovery policy.
//!
//! Game-client calls get up to [`MAX_TRANSPORT_RETRIES`] immediate retries
//! with exponential backoff (100ms, 400ms, 1.6s). What happens after the
//! budget is spent depends on where the failure surfaced: a failed claim is
//! downgraded to a failed attempt, a failed status or graph refresh
//! terminates the loop.

use std::time::Duration;

/// Retries after the initial call, per client operation.
pub const MAX_TRANSPORT_RETRIES: u32 = 3;

const BACKOFF_BASE_MS: u64 = 100;
const BACKOFF_FACTOR: u64 = 4;

/// Backoff before retry `attempt` (zero-based): 100ms, 400ms, 1.6s, …
pub fn backoff_delay(attempt: u32) -> Duration {
    let capped = attempt.min(MAX_TRANSPORT_RETRIES.saturating_sub(1));
    Duration::from_millis(BACKOFF_BASE_MS.saturating_mul(BACKOFF_FACTOR.pow(capped)))
}

/// True while the retry budget for one operation is not yet exhausted.
pub fn should_retry(attempt: u32) -> bool {
    attempt < MAX_TRANSPORT_RETRIES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule_is_100_400_1600_ms() {
        assert_eq!(backoff_delay(0), Duration::from_millis(100));
        assert_eq!(backoff_delay(1), Duration::from_millis(400));
        assert_eq!(backoff_delay(2), Duration::from_millis(1_600));
    }

    #[test]
    fn backoff_is_capped_at_the_final_step() {
        assert_eq!(backoff_delay(10), Duration::from_millis(1_600));
    }

    #[test]
    fn retry_budget_allows_three_retries() {
        assert!(should_retry(0));
        assert!(should_retry(2));
        assert!(!should_retry(3));
    }
}
