//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Max named input events per second from one client. Axis events arrive
/// every frame per axis, so this is well above the tick rate.
pub const INPUT_RATE_LIMIT: u32 = 240;

/// Per-connection rate limiter state
#[derive(Clone)]
pub struct InputRateLimiter {
    input_limiter: Arc<Limiter>,
}

impl InputRateLimiter {
    pub fn new() -> Self {
        Self {
            input_limiter: create_limiter(INPUT_RATE_LIMIT),
        }
    }

    /// Check if an input message is allowed (returns true if allowed)
    pub fn check_input(&self) -> bool {
        self.input_limiter.check().is_ok()
    }
}

impl Default for InputRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_rejects_burst_over_quota() {
        let limiter = create_limiter(3);
        let allowed = (0..10).filter(|_| limiter.check().is_ok()).count();
        assert_eq!(allowed, 3);
    }

    #[test]
    fn zero_quota_falls_back_to_one() {
        let limiter = create_limiter(0);
        assert!(limiter.check().is_ok());
    }
}
