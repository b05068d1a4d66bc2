/*!
 * Per-platform usage accounting.
 *
 * Informational only: nothing in the request or repair flow reads these
 * numbers back to make decisions.
 */

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Counters for one platform
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlatformUsage {
    /// Requests sent
    pub requests: u64,
    /// Requests that did not yield usable text
    pub failures: u64,
    /// Prompt tokens reported by the backend
    pub input_tokens: u64,
    /// Completion tokens reported by the backend
    pub output_tokens: u64,
    /// Wall time spent waiting on the backend
    pub api_time_ms: u64,
}

/// Usage counters for all platforms of a session
#[derive(Debug, Default)]
pub struct UsageStats {
    platforms: Mutex<BTreeMap<String, PlatformUsage>>,
}

impl UsageStats {
    pub fn record_success(&self, platform: &str, elapsed: Duration) {
        let mut platforms = self.platforms.lock();
        let usage = platforms.entry(platform.to_string()).or_default();
        usage.requests += 1;
        usage.api_time_ms += elapsed.as_millis() as u64;
    }

    pub fn record_failure(&self, platform: &str, elapsed: Duration) {
        let mut platforms = self.platforms.lock();
        let usage = platforms.entry(platform.to_string()).or_default();
        usage.requests += 1;
        usage.failures += 1;
        usage.api_time_ms += elapsed.as_millis() as u64;
    }

    pub fn record_tokens(&self, platform: &str, input_tokens: u64, output_tokens: u64) {
        let mut platforms = self.platforms.lock();
        let usage = platforms.entry(platform.to_string()).or_default();
        usage.input_tokens += input_tokens;
        usage.output_tokens += output_tokens;
    }

    /// Copy of the current counters keyed by platform name
    pub fn snapshot(&self) -> BTreeMap<String, PlatformUsage> {
        self.platforms.lock().clone()
    }

    /// Sum over all platforms
    pub fn totals(&self) -> PlatformUsage {
        self.platforms
            .lock()
            .values()
            .fold(PlatformUsage::default(), |mut total, usage| {
                total.requests += usage.requests;
                total.failures += usage.failures;
                total.input_tokens += usage.input_tokens;
                total.output_tokens += usage.output_tokens;
                total.api_time_ms += usage.api_time_ms;
                total
            })
    }
}
