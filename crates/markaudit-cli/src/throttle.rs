//! Global request throttle shared by every fetch worker.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

/// Spacing between navigation starts at `rps`; `None` means unthrottled.
///
/// Zero or negative rates disable throttling. Non-finite rates, and rates so
/// small that the spacing does not fit a `Duration`, are rejected.
pub fn period(rps: f64) -> Result<Option<Duration>> {
    if !rps.is_finite() {
        bail!("request rate must be a finite number, got {rps}");
    }
    if rps <= 0.0 {
        return Ok(None);
    }
    Duration::try_from_secs_f64(1.0 / rps)
        .map(Some)
        .map_err(|_| anyhow!("request rate {rps}/s is too small"))
}

/// Spaces navigation starts at a fixed rate across all workers.
///
/// Burst is one, so consecutive starts are at least `1 / rps` apart.
pub struct Throttle {
    limiter: Option<DefaultDirectRateLimiter>,
    rps: f64,
}

impl Throttle {
    pub fn per_second(rps: f64) -> Result<Self> {
        let limiter = period(rps)?
            .and_then(Quota::with_period)
            .map(RateLimiter::direct);
        Ok(Self { limiter, rps })
    }

    pub fn is_limited(&self) -> bool {
        self.limiter.is_some()
    }

    pub fn rate(&self) -> f64 {
        self.rps
    }

    /// Wait for the next start token.
    pub async fn acquire(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("rps", &self.rps)
            .field("limited", &self.is_limited())
            .finish()
    }
}
