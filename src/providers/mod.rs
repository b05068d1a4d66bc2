/*!
 * Backend requester and protocol clients.
 *
 * This module executes one request/response exchange against one platform:
 * - `openai`: OpenAI-compatible chat completions (also used for SakuraLLM)
 * - `anthropic`: Anthropic messages API
 * - `google`: Google generateContent API
 * - `mock`: scripted backend for tests
 *
 * `Backend` is the seam between protocol plumbing and the rest of the
 * crate. `BackendRequester` wraps any backend with the per-request timeout,
 * response normalisation and usage accounting. It never writes results
 * anywhere; callers decide what to persist.
 */

use async_trait::async_trait;
use log::{debug, warn};
use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::app_config::{ApiFormat, PlatformConfig};
use crate::errors::{RequestError, truncate};

pub mod anthropic;
pub mod google;
pub mod mock;
pub mod openai;
pub mod usage;

pub use usage::{PlatformUsage, UsageStats};

/// Number of trailing characters inspected for degenerate repetition
const DEGRADATION_WINDOW: usize = 2048;

/// Minimum length of a periodic tail that counts as degenerate output
const DEGRADATION_MIN_RUN: usize = 100;

/// One request to a backend
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    /// Item the request is made for
    pub item_id: &'a str,
    /// Self-contained instruction text
    pub prompt: &'a str,
    /// Platform to send it to
    pub platform: &'a PlatformConfig,
}

/// Raw backend answer before normalisation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    /// Answer text
    pub text: String,
    /// Reasoning returned separately by the backend, if any
    pub think: String,
    /// Prompt tokens reported by the backend
    pub input_tokens: u64,
    /// Completion tokens reported by the backend
    pub output_tokens: u64,
}

impl Completion {
    /// All reasoning of this answer: the backend's separate field followed by
    /// any leading `<think>` section of the text
    pub fn reasoning(&self) -> String {
        let (inline, _) = split_think(&self.text);
        [self.think.trim(), inline.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Common trait for all backends
///
/// Implementations perform exactly one exchange and classify failures into
/// the `RequestError` taxonomy.
#[async_trait]
pub trait Backend: Send + Sync + Debug {
    /// Send one request and return the raw answer
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, RequestError>;
}

/// Production backend speaking HTTP to the configured endpoints
#[derive(Debug)]
pub struct HttpBackend {
    /// Shared HTTP client
    client: Client,
    /// Round-robin position per platform
    key_cursor: Mutex<HashMap<String, usize>>,
}

impl HttpBackend {
    /// Create a backend whose client enforces `timeout` per request
    pub fn new(timeout: Duration) -> Result<Self, RequestError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RequestError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            key_cursor: Mutex::new(HashMap::new()),
        })
    }

    /// Next credential for a platform, rotating through its usable keys
    ///
    /// Returns `None` for platforms without real credentials (local servers).
    pub fn next_key(&self, platform: &PlatformConfig) -> Option<String> {
        let keys = platform.usable_keys();
        if keys.is_empty() {
            return None;
        }

        let mut cursors = self.key_cursor.lock();
        let cursor = cursors
            .entry(format!("{}|{}", platform.name, platform.api_url))
            .or_insert(0);
        let key = keys[*cursor % keys.len()].to_string();
        *cursor = (*cursor + 1) % keys.len();
        Some(key)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, RequestError> {
        let platform = request.platform;
        let key = self.next_key(platform);

        match platform.api_format {
            ApiFormat::OpenAI | ApiFormat::SakuraLLM => {
                openai::complete(&self.client, platform, key.as_deref(), request.prompt).await
            }
            ApiFormat::Anthropic => {
                anthropic::complete(&self.client, platform, key.as_deref(), request.prompt).await
            }
            ApiFormat::Google => {
                google::complete(&self.client, platform, key.as_deref(), request.prompt).await
            }
        }
    }
}

/// POST a JSON body and decode a JSON answer, classifying every failure
pub(crate) async fn post_json<B, R>(
    client: &Client,
    url: &str,
    headers: &[(&str, String)],
    extra_headers: &BTreeMap<String, String>,
    body: &B,
) -> Result<R, RequestError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let mut builder = client.post(url).header("Content-Type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, value);
    }
    for (name, value) in extra_headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let response = builder.json(body).send().await.map_err(RequestError::from)?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to get error response text".to_string());
        return Err(RequestError::from_status(status.as_u16(), &error_text));
    }

    let text = response.text().await.map_err(RequestError::from)?;
    serde_json::from_str::<R>(&text).map_err(|e| {
        RequestError::Rejected(format!("Malformed response ({}): {}", e, truncate(&text, 200)))
    })
}

/// Strip trailing slashes and any of `suffixes` from a configured base URL
pub(crate) fn normalize_base_url(api_url: &str, suffixes: &[&str]) -> String {
    let mut base = api_url.trim().trim_end_matches('/').to_string();
    for suffix in suffixes {
        if let Some(stripped) = base.strip_suffix(suffix) {
            base = stripped.trim_end_matches('/').to_string();
        }
    }
    base
}

/// Split a leading `<think>...</think>` section from the answer
///
/// Returns `(reasoning, answer)`.
pub fn split_think(text: &str) -> (String, String) {
    match text.split_once("</think>") {
        Some((think, answer)) => {
            let think = think.trim().trim_start_matches("<think>").trim().to_string();
            (think, answer.trim().to_string())
        }
        None => (String::new(), text.trim().to_string()),
    }
}

/// Whether the tail of `text` collapsed into a repeated one or two character pattern
///
/// Whitespace is ignored. A single character repeated 100 times or a two
/// character unit repeated 50 times counts as degenerate.
pub fn is_degraded(text: &str) -> bool {
    let compact: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    let tail = &compact[compact.len().saturating_sub(DEGRADATION_WINDOW)..];

    has_periodic_run(tail, 1) || has_periodic_run(tail, 2)
}

fn has_periodic_run(chars: &[char], period: usize) -> bool {
    if chars.len() < DEGRADATION_MIN_RUN {
        return false;
    }

    // A stretch of `m` consecutive positions matching the char `period` back
    // spans `m + period` characters with that period.
    let mut matching = 0usize;
    for i in period..chars.len() {
        if chars[i] == chars[i - period] {
            matching += 1;
            if matching + period >= DEGRADATION_MIN_RUN {
                return true;
            }
        } else {
            matching = 0;
        }
    }
    false
}

/// Normalise a raw answer into usable destination text
pub fn normalize_completion(completion: &Completion) -> Result<String, RequestError> {
    let (_, answer) = split_think(&completion.text);
    let reasoning = completion.reasoning();
    if !reasoning.is_empty() {
        debug!(
            "Separated {} chars of reasoning from the answer: {}",
            reasoning.chars().count(),
            truncate(&reasoning, 200)
        );
    }

    if answer.is_empty() {
        return Err(RequestError::Rejected("Backend returned an empty answer".to_string()));
    }
    if is_degraded(&answer) {
        return Err(RequestError::Rejected(
            "Backend answer degenerated into repeated characters".to_string(),
        ));
    }

    Ok(answer)
}

/// Executes single translation requests against any platform
#[derive(Debug, Clone)]
pub struct BackendRequester {
    backend: Arc<dyn Backend>,
    timeout: Duration,
    usage: Arc<UsageStats>,
}

impl BackendRequester {
    /// Create a requester over `backend` with a per-request timeout
    pub fn new(backend: Arc<dyn Backend>, timeout: Duration, usage: Arc<UsageStats>) -> Self {
        Self {
            backend,
            timeout,
            usage,
        }
    }

    /// Usage accumulated by this requester
    pub fn usage(&self) -> &Arc<UsageStats> {
        &self.usage
    }

    /// Send `prompt` for item `item_id` to `platform` and return destination text
    pub async fn translate(
        &self,
        item_id: &str,
        prompt: &str,
        platform: &PlatformConfig,
    ) -> Result<String, RequestError> {
        debug!("Requesting item {} from platform '{}' ({})", item_id, platform.name, platform.api_format);

        let request = CompletionRequest {
            item_id,
            prompt,
            platform,
        };

        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, self.backend.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(RequestError::Transport(format!(
                "Request timed out after {}s",
                self.timeout.as_secs_f32()
            ))),
        };
        let elapsed = started.elapsed();

        let result = outcome.and_then(|completion| {
            self.usage.record_tokens(
                &platform.name,
                completion.input_tokens,
                completion.output_tokens,
            );
            normalize_completion(&completion)
        });

        match &result {
            Ok(_) => self.usage.record_success(&platform.name, elapsed),
            Err(error) => {
                self.usage.record_failure(&platform.name, elapsed);
                if let RequestError::ExhaustedCredential(message) = error {
                    warn!(
                        "Credential exhausted on platform '{}': {} (check quota, billing or API key)",
                        platform.name, message
                    );
                } else {
                    debug!("Request for item {} on '{}' failed: {}", item_id, platform.name, error);
                }
            }
        }

        result
    }
}
