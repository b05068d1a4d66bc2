use log::debug;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::session::CancelFlag;

/// Longest single sleep while waiting for a token, so cancellation is noticed
const MAX_WAIT_SLICE: Duration = Duration::from_millis(250);

struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

/// Token bucket pacing task admission to a requests-per-minute threshold
///
/// The bucket starts full, so the first `max(rpm / 60, 1)` admissions go
/// through immediately. A threshold of 0 disables pacing.
pub struct RateLimiter {
    per_second: f64,
    capacity: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn per_minute(rpm: u32) -> Self {
        let per_second = f64::from(rpm) / 60.0;
        let capacity = per_second.max(1.0);
        Self {
            per_second,
            capacity,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                refilled_at: Instant::now(),
            }),
        }
    }

    pub fn is_limited(&self) -> bool {
        self.per_second > 0.0
    }

    /// Wait for one admission token
    ///
    /// Returns `false` if `cancel` was raised while waiting.
    pub async fn acquire(&self, cancel: &CancelFlag) -> bool {
        if !self.is_limited() {
            return !cancel.is_cancelled();
        }

        loop {
            if cancel.is_cancelled() {
                return false;
            }

            let wait = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.refilled_at).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.per_second).min(self.capacity);
                bucket.refilled_at = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return true;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.per_second)
            };

            debug!("Rate limit reached, waiting {:?} for the next slot", wait);
            tokio::time::sleep(wait.min(MAX_WAIT_SLICE)).await;
        }
    }
}
