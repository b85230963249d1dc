use lru::LruCache;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

#[derive(Clone, Debug)]
pub struct RateLimiterConfig {
    pub enabled: bool,
    /// Tokens added per second
    pub qps: f64,
    /// Bucket size
    pub burst: f64,
    /// Most client keys tracked at once; the least recently seen is evicted
    pub max_keys: usize,
}

impl From<&crate::config::ApiConfig> for RateLimiterConfig {
    fn from(config: &crate::config::ApiConfig) -> Self {
        Self {
            enabled: config.rate_limit_enabled,
            qps: config.rate_limit_qps,
            burst: config.rate_limit_burst,
            max_keys: config.rate_limit_lru_capacity,
        }
    }
}

#[derive(Clone, Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Outcome of one rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Rejected; retry after this many seconds
    Reject(u64),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Per-key token-bucket rate limiter with LRU-bounded state
pub struct RateLimiter {
    config: RateLimiterConfig,
    buckets: Mutex<LruCache<String, Bucket>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterState {
    pub enabled: bool,
    pub active_keys: usize,
    pub capacity: usize,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let cap = NonZeroUsize::new(config.max_keys).unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            buckets: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    fn buckets(&self) -> MutexGuard<'_, LruCache<String, Bucket>> {
        // A poisoned map only holds token counts; keep using it
        self.buckets.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn snapshot(&self) -> RateLimiterState {
        RateLimiterState {
            enabled: self.config.enabled,
            active_keys: self.buckets().len(),
            capacity: self.config.max_keys.max(1),
        }
    }

    /// Check with the configured rate.
    pub fn check(&self, key: &str) -> Decision {
        self.check_key(key, self.config.qps, self.config.burst)
    }

    /// Take one token from `key`'s bucket, refilling at `qps` up to `burst`.
    pub fn check_key(&self, key: &str, qps: f64, burst: f64) -> Decision {
        if !self.config.enabled {
            return Decision::Allow;
        }
        if burst < 1.0 {
            return Decision::Reject(1);
        }

        let now = Instant::now();
        let mut map = self.buckets();

        let Some(bucket) = map.get_mut(key) else {
            map.put(
                key.to_string(),
                Bucket {
                    tokens: burst - 1.0,
                    last_refill: now,
                },
            );
            return Decision::Allow;
        };

        if qps > 0.0 {
            let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
            bucket.tokens = (bucket.tokens + elapsed * qps).min(burst);
        }
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Decision::Allow
        } else if qps <= 0.0 {
            Decision::Reject(1)
        } else {
            let needed = 1.0 - bucket.tokens;
            Decision::Reject(((needed / qps).ceil() as u64).max(1))
        }
    }
}
