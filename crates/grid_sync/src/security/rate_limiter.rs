//! Rate limiting implementation using token bucket algorithm.
//!
//! Buckets are kept per connection, not per address, so several tabs behind
//! one address never share a budget.

use crate::connection::ConnectionId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Token bucket rate limiter for controlling message rates
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<ConnectionId, TokenBucket>>,
    max_tokens: u32,
    refill_interval: Duration,
    blocked_count: AtomicU64,
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: u32,
    last_refill: Instant,
}

impl RateLimiter {
    /// Creates a new rate limiter with the specified parameters
    pub fn new(max_tokens: u32, refill_interval: Duration) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            max_tokens,
            refill_interval,
            blocked_count: AtomicU64::new(0),
        }
    }

    /// Allows bursts of `per_second` frames, refilled evenly over one second.
    ///
    /// `per_second == 0` disables limiting.
    pub fn per_second(per_second: u32) -> Self {
        let refill_interval = match per_second {
            0 => Duration::ZERO,
            n => Duration::from_secs(1) / n,
        };
        Self::new(per_second, refill_interval)
    }

    pub fn is_enabled(&self) -> bool {
        self.max_tokens > 0
    }

    /// Checks if a frame from the given connection should be allowed
    pub async fn check_rate_limit(&self, connection_id: ConnectionId) -> bool {
        if !self.is_enabled() {
            return true;
        }

        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();

        let bucket = buckets.entry(connection_id).or_insert(TokenBucket {
            tokens: self.max_tokens,
            last_refill: now,
        });

        // Refill whole intervals only; the remainder carries over to the next check
        let elapsed = now.duration_since(bucket.last_refill);
        if elapsed >= self.refill_interval {
            let intervals_passed = elapsed.as_nanos() / self.refill_interval.as_nanos().max(1);
            let tokens_to_add = u32::try_from(intervals_passed).unwrap_or(u32::MAX);
            bucket.tokens = bucket.tokens.saturating_add(tokens_to_add).min(self.max_tokens);
            bucket.last_refill = if bucket.tokens == self.max_tokens {
                now
            } else {
                bucket.last_refill + self.refill_interval * tokens_to_add
            };
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            self.blocked_count.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Gets the total number of blocked frames
    pub fn blocked_count(&self) -> u64 {
        self.blocked_count.load(Ordering::Relaxed)
    }

    /// Drops the bucket of a closed connection
    pub async fn forget(&self, connection_id: ConnectionId) {
        self.buckets.lock().await.remove(&connection_id);
    }

    /// Number of connections currently tracked
    pub async fn tracked(&self) -> usize {
        self.buckets.lock().await.len()
    }
}
