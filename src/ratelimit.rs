use governor::{
    Quota, RateLimiter as GovernorRateLimiter,
    clock::{QuantaClock, QuantaInstant},
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
};
use nonzero_ext::nonzero;
use std::{num::NonZeroU32, time::Duration};

// The court site throttles hard; stay well under it.
const REQ_PER_SEC: NonZeroU32 = nonzero!(2u32);
const MS_BETWEEN_REQ: Duration = Duration::from_millis(500);

type SpecificGovernorRateLimiter =
    GovernorRateLimiter<NotKeyed, InMemoryState, QuantaClock, NoOpMiddleware<QuantaInstant>>;

pub struct RateLimiter {
    req_per_sec: SpecificGovernorRateLimiter,
    ms_between_req: SpecificGovernorRateLimiter,
}

impl RateLimiter {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_limits(REQ_PER_SEC, MS_BETWEEN_REQ)
    }

    pub fn with_limits(per_second: NonZeroU32, min_gap: Duration) -> anyhow::Result<Self> {
        let req_per_sec = GovernorRateLimiter::direct(Quota::per_second(per_second));
        let gap_quota = Quota::with_period(min_gap)
            .ok_or_else(|| anyhow::anyhow!("minimum gap between requests must be non-zero"))?;
        let ms_between_req = GovernorRateLimiter::direct(gap_quota);
        Ok(RateLimiter {
            req_per_sec,
            ms_between_req,
        })
    }

    /// Waits for the per-second budget first, then for the minimum gap
    /// since the previous request.
    pub async fn wait_until_ready(&self) {
        self.req_per_sec.until_ready().await;
        self.ms_between_req.until_ready().await;
    }
}
