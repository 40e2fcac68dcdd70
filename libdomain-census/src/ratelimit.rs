use dashmap::DashMap;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Per-resolver query pacing. A rate of zero disables limiting.
pub struct EndpointRateLimiters {
    limiters: DashMap<String, Arc<Limiter>>,
    rate: Option<NonZeroU32>,
}

impl EndpointRateLimiters {
    pub fn new(rate_per_second: u32) -> Self {
        Self {
            limiters: DashMap::new(),
            rate: NonZeroU32::new(rate_per_second),
        }
    }

    pub async fn acquire(&self, endpoint: &str) {
        if let Some(limiter) = self.get_or_create(endpoint) {
            limiter.until_ready().await;
        }
    }

    fn get_or_create(&self, endpoint: &str) -> Option<Arc<Limiter>> {
        let rate = self.rate?;
        let limiter = self
            .limiters
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::direct(Quota::per_second(rate))))
            .clone();
        Some(limiter)
    }
}
