//! Rate limiting utilities

use governor::{clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter keyed by an arbitrary string (e.g. a normalized email)
pub type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Login and registration attempts allowed per email per minute
pub const AUTH_ATTEMPTS_PER_MINUTE: u32 = 5;

/// Create a keyed rate limiter with the specified requests per minute
pub fn create_keyed_limiter(requests_per_minute: u32) -> Arc<KeyedLimiter> {
    let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::keyed(quota))
}

/// Check an attempt for a key (returns true if allowed)
pub fn check_key(limiter: &KeyedLimiter, key: &str) -> bool {
    limiter.check_key(&key.trim().to_lowercase()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyed_limit() {
        let limiter = create_keyed_limiter(2);
        assert!(check_key(&limiter, "a@example.org"));
        assert!(check_key(&limiter, "A@Example.org "));
        assert!(!check_key(&limiter, "a@example.org"));
        // Other keys have their own budget
        assert!(check_key(&limiter, "b@example.org"));
    }
}
