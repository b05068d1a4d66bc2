/*!
 * Retry and fallback state machine for defective items.
 *
 * For each problem the valid-platform list is computed once. Platforms are
 * tried strictly in order, one request each, with the same repair prompt.
 * A response is accepted only when the original defect kind is cleared;
 * anything else advances to the next platform. When the list runs out the
 * item's destination text is put back to its value before the repair.
 *
 * Independent problems are repaired concurrently up to the worker limit and
 * paced by the session rate limiter. Only the first problem per item is
 * repaired in one pass.
 */

use anyhow::{Result, bail};
use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::app_config::Config;
use crate::database::{ItemStore, Mutation};
use crate::detection::{FixProblem, ProblemDetector};
use crate::errors::{FailureKind, truncate};
use crate::events::{EventSink, SessionEvent};
use crate::fixer::report::{AttemptOutcome, AttemptRecord, FixReport, FixResult};
use crate::platforms::{ValidPlatform, valid_platforms};
use crate::prompts::PromptEnhancer;
use crate::providers::BackendRequester;
use crate::session::{CancelFlag, RateLimiter, Session};

/// Characters of a rejected candidate kept in the attempt log
const CANDIDATE_PREVIEW_CHARS: usize = 80;

/// Repairs detected problems by falling back across platforms
pub struct FixOrchestrator {
    config: Arc<Config>,
    store: ItemStore,
    requester: BackendRequester,
    detector: ProblemDetector,
    enhancer: PromptEnhancer,
    cancel: CancelFlag,
    limiter: Arc<RateLimiter>,
    events: EventSink,
}

impl FixOrchestrator {
    pub fn new(session: &Session) -> Self {
        Self {
            config: session.config().clone(),
            store: session.store().clone(),
            requester: session.requester().clone(),
            detector: session.detector(),
            enhancer: session.enhancer(),
            cancel: session.cancel_flag().clone(),
            limiter: session.limiter().clone(),
            events: session.events().clone(),
        }
    }

    /// Repair one problem
    ///
    /// Per-attempt failures never escape; only store errors do.
    pub async fn fix_problem(&self, problem: &FixProblem) -> Result<FixResult> {
        let item_id = problem.item.id.as_str();
        let original = match self.store.get_item(item_id).await? {
            Some(item) => item.destination_text,
            None => bail!("Unknown item id: {}", item_id),
        };

        let platforms = valid_platforms(&self.config);
        if platforms.is_empty() {
            error!(
                "Cannot repair item {}: no platform has an API key. Configure a key for at least one platform",
                item_id
            );
            return Ok(FixResult::configuration_error(problem));
        }

        let kind = problem.kind();
        let prompt = self.enhancer.build(problem);
        let mut attempt_log = Vec::with_capacity(platforms.len());

        for (position, candidate) in platforms.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!("Repair of item {} cancelled after {} attempt(s)", item_id, attempt_log.len());
                self.restore(item_id, &original).await?;
                return Ok(FixResult::cancelled(problem, original, attempt_log));
            }

            debug!(
                "Repairing {} in item {}: attempt {}/{} on '{}' (index {})",
                kind,
                item_id,
                position + 1,
                platforms.len(),
                candidate.display_name,
                candidate.index
            );

            match self.requester.translate(item_id, &prompt, &candidate.platform).await {
                Ok(text) => {
                    if self.detector.is_cleared(kind, &problem.item.source_text, &text) {
                        self.store
                            .apply_batch(vec![Mutation::translated(item_id, text.as_str())])
                            .await?;
                        attempt_log.push(attempt(candidate, AttemptOutcome::Resolved));
                        info!(
                            "Repaired {} in item {} on '{}' after {} attempt(s)",
                            kind,
                            item_id,
                            candidate.display_name,
                            attempt_log.len()
                        );
                        return Ok(FixResult::resolved(
                            problem,
                            text,
                            candidate.display_name.clone(),
                            attempt_log,
                        ));
                    }

                    warn!(
                        "{} persisted in item {} after answer from '{}'",
                        kind, item_id, candidate.display_name
                    );
                    attempt_log.push(attempt(
                        candidate,
                        AttemptOutcome::Failed {
                            kind: FailureKind::ValidationFailure,
                            message: format!(
                                "{} persisted in: {}",
                                kind,
                                truncate(&text, CANDIDATE_PREVIEW_CHARS)
                            ),
                        },
                    ));
                }
                Err(e) => {
                    warn!(
                        "Repair attempt for item {} on '{}' failed: {}",
                        item_id, candidate.display_name, e
                    );
                    attempt_log.push(attempt(
                        candidate,
                        AttemptOutcome::Failed {
                            kind: e.kind(),
                            message: e.to_string(),
                        },
                    ));
                }
            }
        }

        self.restore(item_id, &original).await?;
        error!(
            "Could not repair {} in item {}: all {} platform(s) exhausted",
            kind,
            item_id,
            platforms.len()
        );
        Ok(FixResult::exhausted(problem, original, attempt_log))
    }

    /// Repair independent problems concurrently
    ///
    /// Results are appended to the report in completion order.
    pub async fn fix_all(&self, problems: Vec<FixProblem>) -> FixReport {
        let problems = dedupe(problems);
        let total = problems.len();
        let limit = self.config.worker_limit();
        self.events.emit(SessionEvent::FixStarted { total });
        info!("Repairing {} problem(s) with up to {} worker(s)", total, limit);

        let semaphore = Semaphore::new(limit);
        let report = Mutex::new(FixReport::new());

        stream::iter(problems)
            .map(|problem| {
                let semaphore = &semaphore;
                let report = &report;
                async move {
                    let _permit = match semaphore.acquire().await {
                        Ok(permit) => permit,
                        Err(_) => return,
                    };
                    // A refused token means cancellation, which fix_problem reports itself
                    self.limiter.acquire(&self.cancel).await;

                    let result = match self.fix_problem(&problem).await {
                        Ok(result) => result,
                        Err(e) => {
                            error!("Store error while repairing item {}: {:#}", problem.item.id, e);
                            FixResult::store_error(&problem, &e)
                        }
                    };

                    let completed = {
                        let mut report = report.lock();
                        report.push(result.clone());
                        report.total()
                    };
                    self.events.emit(SessionEvent::FixProgress {
                        result: Box::new(result),
                        completed,
                        total,
                    });
                }
            })
            .buffer_unordered(limit)
            .collect::<Vec<()>>()
            .await;

        let report = report.into_inner();
        let summary = report.summary();
        info!(
            "Repair pass finished: {} fixed, {} failed of {}",
            summary.fixed, summary.failed, summary.total
        );
        self.events.emit(SessionEvent::FixFinished { summary });
        report
    }

    /// Detect problems over every stored item and repair them
    pub async fn fix_store(&self) -> Result<FixReport> {
        let items = self.store.items().await?;
        let problems = self.detector.detect_all(&items);
        info!("Detected {} problem(s) in {} item(s)", problems.len(), items.len());
        Ok(self.fix_all(problems).await)
    }

    async fn restore(&self, item_id: &str, original: &str) -> Result<()> {
        if self.store.restore_destination(item_id, original).await? {
            debug!("Put back destination text of item {}", item_id);
        }
        Ok(())
    }
}

/// Keep the first problem for each item
fn dedupe(problems: Vec<FixProblem>) -> Vec<FixProblem> {
    let mut seen = HashSet::with_capacity(problems.len());
    problems
        .into_iter()
        .filter(|problem| {
            let fresh = seen.insert(problem.item.id.clone());
            if !fresh {
                warn!(
                    "Ignoring second {} problem for item {}: one repair per item",
                    problem.kind(),
                    problem.item.id
                );
            }
            fresh
        })
        .collect()
}

fn attempt(platform: &ValidPlatform, outcome: AttemptOutcome) -> AttemptRecord {
    AttemptRecord {
        platform: platform.display_name.clone(),
        index: platform.index,
        outcome,
    }
}
