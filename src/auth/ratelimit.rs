//! Per-IP login/setup rate limiter (spec.md §4.C, §6): 5 attempts per
//! source IP per minute, direct peer IP only. A single map lock guards all
//! buckets; entries expire after their window rather than being swept
//! separately.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;

use crate::constants::{LOGIN_RATE_LIMIT_MAX_ATTEMPTS, LOGIN_RATE_LIMIT_WINDOW_SECS};

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

struct Bucket {
    window_start: u64,
    count: u32,
}

pub struct LoginRateLimiter {
    buckets: Mutex<HashMap<IpAddr, Bucket>>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Records one attempt from `ip`. Returns `true` if the request may
    /// proceed, `false` if it must be rejected with 429.
    pub async fn check(&self, ip: IpAddr) -> bool {
        let now = now_secs();
        let mut guard = self.buckets.lock().await;

        guard.retain(|_, b| now.saturating_sub(b.window_start) < LOGIN_RATE_LIMIT_WINDOW_SECS);

        let bucket = guard.entry(ip).or_insert(Bucket {
            window_start: now,
            count: 0,
        });

        if now.saturating_sub(bucket.window_start) >= LOGIN_RATE_LIMIT_WINDOW_SECS {
            bucket.window_start = now;
            bucket.count = 0;
        }

        bucket.count += 1;
        bucket.count <= LOGIN_RATE_LIMIT_MAX_ATTEMPTS
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_five_then_rejects() {
        let limiter = LoginRateLimiter::new();
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        for _ in 0..5 {
            assert!(limiter.check(ip).await);
        }
        assert!(!limiter.check(ip).await);
    }

    #[tokio::test]
    async fn separate_ips_have_separate_buckets() {
        let limiter = LoginRateLimiter::new();
        let a: IpAddr = "127.0.0.1".parse().unwrap();
        let b: IpAddr = "127.0.0.2".parse().unwrap();
        for _ in 0..5 {
            assert!(limiter.check(a).await);
        }
        assert!(limiter.check(b).await);
    }
}
