/*!
 * Mock backend for testing.
 *
 * `MockBackend` answers according to a scripted behavior, optionally per
 * platform name, and records what it was asked:
 * - `MockBackend::new(MockBehavior::Reply(..))` - always answers the same text
 * - `MockBackend::tagged()` - answers with a text derived from the item id
 * - `MockBackend::failing()` - always fails with a transport error
 * - `.with_platform(name, behavior)` - overrides the behavior for one platform
 *
 * Clones share their counters, so a clone handed to a session can be
 * inspected from the test afterwards.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::RequestError;
use crate::providers::{Backend, Completion, CompletionRequest};

/// Behavior mode for the mock backend
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Always answers with this text
    Reply(String),
    /// Answers `Translated item <id>`
    Tagged,
    /// Waits, then answers with this text
    Slow { delay_ms: u64, text: String },
    /// Waits, then answers `Translated item <id>`
    SlowTagged { delay_ms: u64 },
    /// Fails every Nth request with a transport error, otherwise tagged
    Intermittent { fail_every: usize },
    /// Always fails with a transport error
    FailTransport,
    /// Always fails with a rejection
    FailRejected,
    /// Always fails with an exhausted credential
    FailExhausted,
    /// Returns an empty answer
    Empty,
}

/// One recorded request
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    /// Platform name the request was sent to
    pub platform: String,
    /// Item the request was made for
    pub item_id: String,
    /// Full prompt text
    pub prompt: String,
}

/// Scripted backend for tests
#[derive(Debug, Clone)]
pub struct MockBackend {
    /// Behavior for platforms without an override
    behavior: MockBehavior,
    /// Per-platform overrides
    platform_behaviors: HashMap<String, MockBehavior>,
    /// Request counter
    request_count: Arc<AtomicUsize>,
    /// Recorded requests in arrival order
    calls: Arc<Mutex<Vec<MockCall>>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
    item_in_flight: Arc<Mutex<HashMap<String, usize>>>,
    peak_item_in_flight: Arc<AtomicUsize>,
}

/// Decrements in-flight counters when a request ends or is dropped
struct InFlightGuard<'a> {
    backend: &'a MockBackend,
    item_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.backend.in_flight.fetch_sub(1, Ordering::SeqCst);
        let mut items = self.backend.item_in_flight.lock();
        if let Some(count) = items.get_mut(&self.item_id) {
            *count = count.saturating_sub(1);
        }
    }
}

impl MockBackend {
    /// Create a new mock backend with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            platform_behaviors: HashMap::new(),
            request_count: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
            item_in_flight: Arc::new(Mutex::new(HashMap::new())),
            peak_item_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a mock that answers with a text derived from the item id
    pub fn tagged() -> Self {
        Self::new(MockBehavior::Tagged)
    }

    /// Create a failing mock that always errors
    pub fn failing() -> Self {
        Self::new(MockBehavior::FailTransport)
    }

    /// Override the behavior for one platform name
    pub fn with_platform(mut self, platform: impl Into<String>, behavior: MockBehavior) -> Self {
        self.platform_behaviors.insert(platform.into(), behavior);
        self
    }

    /// Text produced by tagged behaviors
    pub fn tagged_text(item_id: &str) -> String {
        format!("Translated item {}", item_id)
    }

    /// Total number of requests received
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Recorded requests in arrival order
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Platform names in the order they were called
    pub fn platforms_called(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.platform.clone()).collect()
    }

    /// Highest number of simultaneous requests observed
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous requests observed for a single item
    pub fn peak_item_in_flight(&self) -> usize {
        self.peak_item_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self, item_id: &str) -> InFlightGuard<'_> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        let mut items = self.item_in_flight.lock();
        let count = items.entry(item_id.to_string()).or_insert(0);
        *count += 1;
        self.peak_item_in_flight.fetch_max(*count, Ordering::SeqCst);

        InFlightGuard {
            backend: self,
            item_id: item_id.to_string(),
        }
    }

    fn behavior_for(&self, platform: &str) -> &MockBehavior {
        self.platform_behaviors.get(platform).unwrap_or(&self.behavior)
    }

    fn reply(text: String, prompt: &str) -> Completion {
        Completion {
            output_tokens: text.chars().count() as u64,
            input_tokens: prompt.chars().count() as u64,
            text,
            think: String::new(),
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, RequestError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(MockCall {
            platform: request.platform.name.clone(),
            item_id: request.item_id.to_string(),
            prompt: request.prompt.to_string(),
        });
        let _guard = self.enter(request.item_id);

        match self.behavior_for(&request.platform.name).clone() {
            MockBehavior::Reply(text) => Ok(Self::reply(text, request.prompt)),

            MockBehavior::Tagged => Ok(Self::reply(Self::tagged_text(request.item_id), request.prompt)),

            MockBehavior::Slow { delay_ms, text } => {
                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                Ok(Self::reply(text, request.prompt))
            }

            MockBehavior::SlowTagged { delay_ms } => {
                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                Ok(Self::reply(Self::tagged_text(request.item_id), request.prompt))
            }

            MockBehavior::Intermittent { fail_every } => {
                if fail_every > 0 && count % fail_every == fail_every - 1 {
                    Err(RequestError::Transport(format!(
                        "Simulated intermittent failure (request #{})",
                        count + 1
                    )))
                } else {
                    Ok(Self::reply(Self::tagged_text(request.item_id), request.prompt))
                }
            }

            MockBehavior::FailTransport => {
                Err(RequestError::Transport("Simulated connection failure".to_string()))
            }

            MockBehavior::FailRejected => {
                Err(RequestError::Rejected("Simulated unusable answer".to_string()))
            }

            MockBehavior::FailExhausted => {
                Err(RequestError::ExhaustedCredential("Simulated quota exhaustion".to_string()))
            }

            MockBehavior::Empty => Ok(Self::reply(String::new(), request.prompt)),
        }
    }
}
