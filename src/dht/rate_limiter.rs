//! Token bucket over outbound bytes. No crate in the reference stack
//! offers this (no `governor`/`ratelimit` dependency anywhere in the
//! corpus), so it's hand-rolled here to the exact policy the DHT node
//! needs: wait for tokens to refill, but give up immediately on a
//! request that could never be satisfied rather than queuing forever.
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::time::sleep;

struct Bucket {
    tokens: f64,
    capacity: f64,
    rate_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        self.last_refill = now;
    }
}

pub struct RateLimiter {
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(rate_bps: u64, burst_bytes: u64) -> Self {
        RateLimiter {
            bucket: Mutex::new(Bucket {
                tokens: burst_bytes as f64,
                capacity: burst_bytes as f64,
                rate_per_sec: rate_bps as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Waits until `bytes` tokens are available and consumes them.
    /// Returns `false` without sending anything if `bytes` exceeds the
    /// bucket's capacity, since no amount of waiting would ever satisfy
    /// the request.
    pub async fn acquire(&self, bytes: usize) -> bool {
        let bytes = bytes as f64;
        {
            let bucket = self.bucket.lock().expect("rate limiter mutex poisoned");
            if bytes > bucket.capacity {
                return false;
            }
        }
        loop {
            let mut bucket = self.bucket.lock().expect("rate limiter mutex poisoned");
            bucket.refill();
            if bucket.tokens >= bytes {
                bucket.tokens -= bytes;
                return true;
            }
            let deficit = bytes - bucket.tokens;
            let wait = Duration::from_secs_f64((deficit / bucket.rate_per_sec).max(0.001));
            drop(bucket);
            sleep(wait).await;
        }
    }
}
