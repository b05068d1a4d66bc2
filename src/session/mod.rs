/*!
 * Translation session context.
 *
 * A `Session` bundles everything the dispatcher and the fix orchestrator
 * need: the store, the read-only configuration and glossary, the backend
 * requester, the cancellation flag, the admission rate limiter and the
 * optional event sink. The caller
 * that opens a session owns its lifecycle and closes it, which checkpoints
 * the store's write-ahead log.
 */

use anyhow::{Context, Result};
use log::info;
use std::path::Path;
use std::sync::Arc;

use crate::app_config::Config;
use crate::database::ItemStore;
use crate::detection::ProblemDetector;
use crate::events::EventSink;
use crate::glossary::Glossary;
use crate::prompts::PromptEnhancer;
use crate::providers::{Backend, BackendRequester, HttpBackend, UsageStats};

pub mod cancel;
pub mod limiter;

pub use cancel::CancelFlag;
pub use limiter::RateLimiter;

/// Meta key holding the session identifier
pub const META_SESSION_ID: &str = "session_id";

/// Meta key holding the session language pair
pub const META_LANGUAGES: &str = "languages";

/// Meta key holding the session start time
pub const META_STARTED_AT: &str = "started_at";

/// Explicit context shared by every component of one session
pub struct Session {
    config: Arc<Config>,
    store: ItemStore,
    glossary: Arc<Glossary>,
    requester: BackendRequester,
    cancel: CancelFlag,
    limiter: Arc<RateLimiter>,
    events: EventSink,
}

impl Session {
    /// Open a session over a store file using HTTP backends
    pub fn open<P: AsRef<Path>>(path: P, config: Config) -> Result<Self> {
        let store = ItemStore::open(path)?;
        let backend = HttpBackend::new(config.request_timeout())
            .context("Failed to create HTTP backend")?;
        Self::with_backend(store, config, Arc::new(backend))
    }

    /// Open a session over an in-memory store using HTTP backends
    pub fn in_memory(config: Config) -> Result<Self> {
        let store = ItemStore::new_in_memory()?;
        let backend = HttpBackend::new(config.request_timeout())
            .context("Failed to create HTTP backend")?;
        Self::with_backend(store, config, Arc::new(backend))
    }

    /// Assemble a session from an open store and any backend
    pub fn with_backend(store: ItemStore, config: Config, backend: Arc<dyn Backend>) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let glossary = Arc::new(config.glossary());
        let requester = BackendRequester::new(backend, config.request_timeout(), Arc::new(UsageStats::default()));
        let limiter = Arc::new(RateLimiter::per_minute(config.rpm_threshold));

        info!(
            "Session ready: {} -> {}, {} platform(s), {} glossary term(s), {} worker(s)",
            config.source_language,
            config.target_language,
            config.platforms.len(),
            glossary.len(),
            config.worker_limit()
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            glossary,
            requester,
            cancel: CancelFlag::new(),
            limiter,
            events: EventSink::disabled(),
        })
    }

    /// Publish progress on `events`
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Record the glossary rules and session properties in the store
    ///
    /// Returns the session identifier, which is kept when the store is
    /// reopened.
    pub async fn record_setup(&self) -> Result<String> {
        let session_id = match self.store.get_meta::<String>(META_SESSION_ID).await? {
            Some(id) => id,
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                self.store.set_meta(META_SESSION_ID, &id).await?;
                id
            }
        };

        self.store.save_glossary(&self.glossary).await?;
        self.store
            .set_meta(
                META_LANGUAGES,
                &(self.config.source_language, self.config.target_language),
            )
            .await?;
        self.store
            .set_meta(META_STARTED_AT, &chrono::Utc::now().to_rfc3339())
            .await?;

        info!("Session {} recorded", session_id);
        Ok(session_id)
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn store(&self) -> &ItemStore {
        &self.store
    }

    pub fn glossary(&self) -> &Arc<Glossary> {
        &self.glossary
    }

    pub fn requester(&self) -> &BackendRequester {
        &self.requester
    }

    pub fn usage(&self) -> &Arc<UsageStats> {
        self.requester.usage()
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    /// Stop admitting new work
    pub fn cancel(&self) {
        info!("Session cancellation requested");
        self.cancel.cancel();
    }

    /// Detector for the session's language pair and glossary
    pub fn detector(&self) -> ProblemDetector {
        ProblemDetector::new(
            self.config.source_language,
            self.config.target_language,
            self.glossary.clone(),
        )
    }

    /// Prompt enhancer for the session's language pair and glossary
    pub fn enhancer(&self) -> PromptEnhancer {
        PromptEnhancer::new(
            self.config.source_language,
            self.config.target_language,
            self.glossary.clone(),
        )
    }

    /// End the session, checkpointing the store
    pub fn close(self) -> Result<()> {
        self.store.close()
    }
}
