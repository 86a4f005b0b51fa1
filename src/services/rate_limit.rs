// src/services/rate_limit.rs

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Dual trailing-window limiter for upstream calls: at most `max_per_sec`
/// acquisitions in any trailing second and `max_per_min` in any trailing
/// minute.
///
/// Waits happen with the lock released so concurrent callers can make
/// progress, and the sleep is an ordinary suspension point, which is where
/// scheduler shutdown cancels a pending acquire.
pub struct RateLimiter {
    max_per_sec: usize,
    max_per_min: usize,
    windows: Mutex<Windows>,
}

struct Windows {
    sec: VecDeque<Instant>,
    min: VecDeque<Instant>,
}

impl Windows {
    fn cleanup(&mut self, now: Instant) {
        while self
            .sec
            .front()
            .is_some_and(|t| now.duration_since(*t) > Duration::from_secs(1))
        {
            self.sec.pop_front();
        }
        while self
            .min
            .front()
            .is_some_and(|t| now.duration_since(*t) > Duration::from_secs(60))
        {
            self.min.pop_front();
        }
    }
}

impl RateLimiter {
    pub fn new(max_per_sec: usize, max_per_min: usize) -> Self {
        Self {
            max_per_sec,
            max_per_min,
            windows: Mutex::new(Windows {
                sec: VecDeque::new(),
                min: VecDeque::new(),
            }),
        }
    }

    /// Blocks until both windows have capacity, then records the
    /// acquisition.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut w = self.windows.lock().await;
                let now = Instant::now();
                w.cleanup(now);

                if w.sec.len() >= self.max_per_sec {
                    let oldest = *w.sec.front().expect("non-empty window");
                    Some(Duration::from_secs(1).saturating_sub(now.duration_since(oldest)))
                } else if w.min.len() >= self.max_per_min {
                    let oldest = *w.min.front().expect("non-empty window");
                    Some(Duration::from_secs(60).saturating_sub(now.duration_since(oldest)))
                } else {
                    w.sec.push_back(now);
                    w.min.push_back(now);
                    None
                }
            };

            match wait {
                None => return,
                Some(delay) => tokio::time::sleep(delay.max(Duration::from_millis(1))).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn per_second_ceiling_is_enforced() {
        let limiter = RateLimiter::new(3, 100);
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }
        // Still inside the first second.
        assert!(start.elapsed() < Duration::from_secs(1));

        // The fourth acquisition must wait out the trailing window.
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn per_minute_ceiling_is_enforced() {
        let limiter = RateLimiter::new(100, 2);
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn windows_refill_over_time() {
        let limiter = RateLimiter::new(2, 100);

        limiter.acquire().await;
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let before = Instant::now();
        limiter.acquire().await;
        // No wait needed once the trailing second has drained.
        assert!(before.elapsed() < Duration::from_millis(50));
    }
}
