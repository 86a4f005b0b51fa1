// src/services/retries.rs

use std::future::Future;
use std::time::Duration;

/// Bounded exponential backoff over an arbitrary fallible call. Delay before
/// attempt k+1 is min(max_delay, base_delay * 2^(k-1)); the last error is
/// returned after exhaustion.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(e);
                    }
                    let exp = self.base_delay.as_secs_f64() * 2f64.powi(attempt as i32 - 1);
                    let delay = Duration::from_secs_f64(exp.min(self.max_delay.as_secs_f64()));
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
