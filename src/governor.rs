// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-window token buckets keyed by caller or provider.
//!
//! One governor instance gates acceptance of analysis (indexing) requests per
//! caller; a second one gates outbound embedding-provider calls. Both are
//! constructed once and shared by reference.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::errors::{CodevecError, Result};

/// Buckets are pruned once the map grows past this many keys.
const PRUNE_THRESHOLD: usize = 1024;

/// Budget of a governor: `points` per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub points: u32,
    pub window: Duration,
}

impl RateLimit {
    pub fn new(points: u32, window: Duration) -> Self {
        Self { points, window }
    }

    /// 5 analysis requests per 5 minutes.
    pub fn analysis_default() -> Self {
        Self::new(5, Duration::from_secs(300))
    }

    /// 100 provider calls per minute.
    pub fn embedding_default() -> Self {
        Self::new(100, Duration::from_secs(60))
    }
}

/// Outcome of a consumption attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed { remaining: u32 },
    Denied { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }

    /// Whole seconds to wait, rounded up, at least 1. Zero when allowed.
    pub fn retry_after_secs(&self) -> u64 {
        match self {
            Admission::Allowed { .. } => 0,
            Admission::Denied { retry_after } => ceil_secs(*retry_after),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    points_remaining: u32,
    window_reset_at: Instant,
}

/// Token-bucket rate governor, safe for concurrent use.
#[derive(Debug)]
pub struct RateGovernor {
    name: String,
    limit: RateLimit,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateGovernor {
    pub fn new(name: impl Into<String>, limit: RateLimit) -> Self {
        Self {
            name: name.into(),
            limit,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Attempts to take `cost` points from `key`'s bucket now.
    pub fn try_consume(&self, key: &str, cost: u32) -> Admission {
        self.try_consume_at(key, cost, Instant::now())
    }

    /// Same as [`try_consume`](Self::try_consume) with an explicit clock reading.
    pub fn try_consume_at(&self, key: &str, cost: u32, now: Instant) -> Admission {
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if buckets.len() > PRUNE_THRESHOLD {
            buckets.retain(|_, bucket| now < bucket.window_reset_at);
        }

        let limit = self.limit;
        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            points_remaining: limit.points,
            window_reset_at: now + limit.window,
        });

        if now >= bucket.window_reset_at {
            bucket.points_remaining = limit.points;
            bucket.window_reset_at = now + limit.window;
        }

        if bucket.points_remaining >= cost {
            bucket.points_remaining -= cost;
            Admission::Allowed {
                remaining: bucket.points_remaining,
            }
        } else {
            Admission::Denied {
                retry_after: bucket.window_reset_at.saturating_duration_since(now),
            }
        }
    }

    /// Consumes or fails with [`CodevecError::RateLimited`].
    pub fn check(&self, key: &str, cost: u32) -> Result<()> {
        self.ensure_cost(cost)?;
        match self.try_consume(key, cost) {
            Admission::Allowed { .. } => Ok(()),
            denied @ Admission::Denied { .. } => {
                let retry_after_secs = denied.retry_after_secs();
                debug!(governor = %self.name, key, retry_after_secs, "request denied");
                Err(CodevecError::RateLimited { retry_after_secs })
            }
        }
    }

    /// Waits until `cost` points can be taken from `key`'s bucket.
    pub async fn until_ready(&self, key: &str, cost: u32) -> Result<()> {
        self.ensure_cost(cost)?;
        loop {
            match self.try_consume(key, cost) {
                Admission::Allowed { .. } => return Ok(()),
                Admission::Denied { retry_after } => {
                    debug!(
                        governor = %self.name,
                        key,
                        wait_ms = retry_after.as_millis() as u64,
                        "waiting for rate window"
                    );
                    tokio::time::sleep(retry_after.max(Duration::from_millis(1))).await;
                }
            }
        }
    }

    fn ensure_cost(&self, cost: u32) -> Result<()> {
        if cost > self.limit.points {
            return Err(CodevecError::validation(format!(
                "cost {} exceeds {} budget of {} points",
                cost, self.name, self.limit.points
            )));
        }
        Ok(())
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    secs.max(1)
}
