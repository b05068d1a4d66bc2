/*!
 * First-pass translation.
 *
 * Items are translated concurrently on the active platform, bounded by the
 * worker limit and paced by the session rate limiter. Each task acquires a
 * slot, makes one request, writes the outcome through the store and releases
 * the slot. Failures mark the item `failed` and are left for an explicit
 * repair pass; the dispatcher never falls back to other platforms.
 *
 * Ids the store does not know are reported without a request. A store write
 * that fails is reported for that item only.
 */

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;

use crate::app_config::{Config, PlatformConfig};
use crate::database::{Item, ItemStatus, ItemStore, Mutation};
use crate::errors::FailureKind;
use crate::events::{EventSink, SessionEvent};
use crate::glossary::Glossary;
use crate::prompts::first_pass_prompt;
use crate::providers::BackendRequester;
use crate::session::{CancelFlag, RateLimiter, Session};

/// Outcome of one first-pass task
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Destination text written, item is `done`
    Translated,
    /// Request failed, item is `failed`
    Failed(FailureKind, String),
    /// Not admitted because the session was cancelled; item unchanged
    Skipped,
    /// The store refused the item or its result
    StoreError(String),
}

/// Concurrent worker pool for the first translation pass
pub struct TaskDispatcher {
    config: Arc<Config>,
    store: ItemStore,
    requester: BackendRequester,
    glossary: Arc<Glossary>,
    cancel: CancelFlag,
    limiter: Arc<RateLimiter>,
    events: EventSink,
}

impl TaskDispatcher {
    pub fn new(session: &Session) -> Self {
        Self {
            config: session.config().clone(),
            store: session.store().clone(),
            requester: session.requester().clone(),
            glossary: session.glossary().clone(),
            cancel: session.cancel_flag().clone(),
            limiter: session.limiter().clone(),
            events: session.events().clone(),
        }
    }

    /// Translate `items` on the active platform
    ///
    /// Returns one outcome per distinct item id, in completion order. Only
    /// an unusable active platform or a failed id lookup fails the call.
    pub async fn run_all(&self, items: Vec<Item>) -> Result<Vec<(String, DispatchOutcome)>> {
        let platform = self
            .config
            .active_platform()
            .context("Cannot start first pass")?;

        let items = dedupe(items);
        let known = self
            .store
            .known_ids(items.iter().map(|item| item.id.clone()).collect())
            .await?;
        let total = items.len();
        let limit = self.config.worker_limit();
        self.events.emit(SessionEvent::DispatchStarted { total });
        info!(
            "Translating {} item(s) on '{}' with up to {} worker(s)",
            total, platform.name, limit
        );

        let semaphore = Semaphore::new(limit);
        let completed = AtomicUsize::new(0);

        let outcomes: Vec<(String, DispatchOutcome)> = stream::iter(items)
            .map(|item| {
                let semaphore = &semaphore;
                let completed = &completed;
                let known = &known;
                async move {
                    let outcome = if !known.contains(&item.id) {
                        warn!("Not translating item {}: unknown to the store", item.id);
                        DispatchOutcome::StoreError(format!("Unknown item id: {}", item.id))
                    } else {
                        match semaphore.acquire().await {
                            Ok(_permit) => {
                                if self.limiter.acquire(&self.cancel).await {
                                    self.translate_item(&item, platform).await
                                } else {
                                    debug!("Skipping item {}: session cancelled", item.id);
                                    DispatchOutcome::Skipped
                                }
                            }
                            Err(_) => DispatchOutcome::Skipped,
                        }
                    };

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    self.events.emit(SessionEvent::ItemFinished {
                        item_id: item.id.clone(),
                        outcome: outcome.clone(),
                        completed: done,
                        total,
                    });
                    (item.id, outcome)
                }
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        let translated = count(&outcomes, |o| matches!(o, DispatchOutcome::Translated));
        let skipped = count(&outcomes, |o| matches!(o, DispatchOutcome::Skipped));
        let failed = outcomes.len() - translated - skipped;
        info!(
            "First pass finished: {} translated, {} failed, {} skipped",
            translated, failed, skipped
        );
        self.events.emit(SessionEvent::DispatchFinished {
            translated,
            failed,
            skipped,
        });

        Ok(outcomes)
    }

    /// Translate every stored item that has not been attempted yet
    pub async fn run_pending(&self) -> Result<Vec<(String, DispatchOutcome)>> {
        let items = self.store.items_with_status(ItemStatus::Pending).await?;
        self.run_all(items).await
    }

    async fn translate_item(&self, item: &Item, platform: &PlatformConfig) -> DispatchOutcome {
        let prompt = first_pass_prompt(
            self.config.source_language,
            self.config.target_language,
            &self.glossary,
            &item.source_text,
        );

        let (mutation, outcome) = match self.requester.translate(&item.id, &prompt, platform).await {
            Ok(text) => (Mutation::translated(item.id.as_str(), text), DispatchOutcome::Translated),
            Err(e) => {
                warn!("First pass failed for item {}: {}", item.id, e);
                (
                    Mutation::failed(item.id.as_str()),
                    DispatchOutcome::Failed(e.kind(), e.to_string()),
                )
            }
        };

        match self.store.apply_batch(vec![mutation]).await {
            Ok(()) => outcome,
            Err(e) => {
                error!("Could not store first-pass result of item {}: {:#}", item.id, e);
                DispatchOutcome::StoreError(format!("{:#}", e))
            }
        }
    }
}

/// Keep the first item for each id
fn dedupe(items: Vec<Item>) -> Vec<Item> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| {
            let fresh = seen.insert(item.id.clone());
            if !fresh {
                warn!("Ignoring duplicate item id {} in first pass", item.id);
            }
            fresh
        })
        .collect()
}

fn count(outcomes: &[(String, DispatchOutcome)], predicate: impl Fn(&DispatchOutcome) -> bool) -> usize {
    outcomes.iter().filter(|(_, o)| predicate(o)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::ApiFormat;
    use crate::events;
    use crate::language::Language;
    use crate::providers::mock::{MockBackend, MockBehavior};

    fn config(max_workers: usize) -> Config {
        Config {
            source_language: Language::Zh,
            target_language: Language::En,
            activate_platform: 0,
            platforms: vec![PlatformConfig::new("main", ApiFormat::OpenAI).with_keys(["k"])],
            max_workers,
            ..Config::default()
        }
    }

    async fn session(config: Config, backend: MockBackend, ids: &[&str]) -> Session {
        let session = Session::with_backend(ItemStore::new_in_memory().unwrap(), config, Arc::new(backend))
            .unwrap();
        session
            .store()
            .ingest(ids.iter().map(|id| (id.to_string(), format!("源文 {}", id))).collect())
            .await
            .unwrap();
        session
    }

    #[test]
    fn test_dedupe_shouldKeepFirstOccurrence() {
        let items = vec![Item::new("a", "1"), Item::new("b", "2"), Item::new("a", "3")];
        let kept = dedupe(items);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].source_text, "1");
    }

    #[tokio::test]
    async fn test_runPending_shouldWriteResultsThroughStore() {
        let backend = MockBackend::new(MockBehavior::Intermittent { fail_every: 2 });
        let session = session(config(2), backend, &["1", "2", "3", "4"]).await;

        let outcomes = TaskDispatcher::new(&session).run_pending().await.unwrap();

        assert_eq!(outcomes.len(), 4);
        let counts = session.store().status_counts().await.unwrap();
        assert_eq!(counts.done + counts.failed, 4);
        assert_eq!(counts.failed, 2);
        assert_eq!(counts.pending, 0);
    }

    #[tokio::test]
    async fn test_runAll_whenCancelled_shouldSkipAndLeavePending() {
        let backend = MockBackend::tagged();
        let session = session(config(2), backend.clone(), &["1", "2"]).await;
        session.cancel();

        let outcomes = TaskDispatcher::new(&session).run_pending().await.unwrap();

        assert!(outcomes.iter().all(|(_, o)| *o == DispatchOutcome::Skipped));
        assert_eq!(backend.request_count(), 0);
        assert_eq!(session.store().status_counts().await.unwrap().pending, 2);
    }

    #[tokio::test]
    async fn test_runAll_shouldPublishEvents() {
        let (sink, mut receiver) = events::channel();
        let session = session(config(1), MockBackend::tagged(), &["1"]).await.with_events(sink);

        TaskDispatcher::new(&session).run_pending().await.unwrap();

        assert_eq!(receiver.try_recv().unwrap(), SessionEvent::DispatchStarted { total: 1 });
        assert_eq!(
            receiver.try_recv().unwrap(),
            SessionEvent::ItemFinished {
                item_id: "1".to_string(),
                outcome: DispatchOutcome::Translated,
                completed: 1,
                total: 1,
            }
        );
        assert_eq!(
            receiver.try_recv().unwrap(),
            SessionEvent::DispatchFinished {
                translated: 1,
                failed: 0,
                skipped: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_runAll_withUnknownId_shouldReportItAndFinishOthers() {
        let (sink, mut receiver) = events::channel();
        let backend = MockBackend::tagged();
        let session = session(config(2), backend.clone(), &["a", "b"]).await.with_events(sink);
        let items = vec![Item::new("a", "源文 a"), Item::new("ghost", "幽灵"), Item::new("b", "源文 b")];

        let mut outcomes = TaskDispatcher::new(&session).run_all(items).await.unwrap();
        outcomes.sort_by(|x, y| x.0.cmp(&y.0));

        assert_eq!(outcomes[0], ("a".to_string(), DispatchOutcome::Translated));
        assert_eq!(outcomes[1], ("b".to_string(), DispatchOutcome::Translated));
        assert!(matches!(&outcomes[2], (id, DispatchOutcome::StoreError(_)) if id == "ghost"));
        assert_eq!(backend.request_count(), 2);
        assert_eq!(session.store().status_counts().await.unwrap().done, 2);

        let mut finished = None;
        while let Ok(event) = receiver.try_recv() {
            if let SessionEvent::DispatchFinished { .. } = event {
                finished = Some(event);
            }
        }
        assert_eq!(
            finished,
            Some(SessionEvent::DispatchFinished {
                translated: 2,
                failed: 1,
                skipped: 0,
            })
        );
    }

    #[tokio::test]
    async fn test_runAll_withRpmThreshold_shouldPaceAdmission() {
        let config = Config {
            rpm_threshold: 120,
            ..config(4)
        };
        let session = session(config, MockBackend::tagged(), &["1", "2", "3", "4"]).await;
        let started = std::time::Instant::now();

        let outcomes = TaskDispatcher::new(&session).run_pending().await.unwrap();

        assert!(outcomes.iter().all(|(_, o)| *o == DispatchOutcome::Translated));
        assert!(started.elapsed() >= std::time::Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_runAll_withEmptyPlatformList_shouldFailBeforeAdmission() {
        let config = Config {
            platforms: Vec::new(),
            ..config(1)
        };
        let backend = MockBackend::tagged();
        let session = session(config, backend.clone(), &["1"]).await;

        assert!(TaskDispatcher::new(&session).run_pending().await.is_err());
        assert_eq!(backend.request_count(), 0);
    }
}
