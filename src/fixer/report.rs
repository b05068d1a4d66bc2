/*!
 * Repair outcomes and the session report.
 *
 * A `FixResult` is created once per repaired problem and never changed
 * afterwards. The `FixReport` keeps them in completion order.
 */

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::detection::{DefectKind, FixProblem};
use crate::errors::FailureKind;

/// What happened on one platform during a repair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The candidate cleared the defect
    Resolved,
    /// The platform did not produce an acceptable candidate
    Failed { kind: FailureKind, message: String },
}

/// One repair attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Platform display name
    pub platform: String,
    /// Position of the platform in the configuration
    pub index: usize,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

/// Outcome of repairing one problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixResult {
    pub item_id: String,
    pub defect: DefectKind,
    pub details: String,
    pub source_text: String,
    pub success: bool,
    /// Platforms tried
    pub attempts: usize,
    /// Destination text after the repair (restored text on failure)
    pub final_text: String,
    /// Platform that produced the accepted text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    /// Classification of the failure that ended the repair
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Error summary on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Attempts in the order they were made
    #[serde(default)]
    pub attempt_log: Vec<AttemptRecord>,
}

impl FixResult {
    fn base(problem: &FixProblem, final_text: String) -> Self {
        Self {
            item_id: problem.item.id.clone(),
            defect: problem.kind(),
            details: problem.details(),
            source_text: problem.item.source_text.clone(),
            success: false,
            attempts: 0,
            final_text,
            resolved_by: None,
            failure: None,
            error: None,
            attempt_log: Vec::new(),
        }
    }

    /// The defect cleared on the last attempt of `attempt_log`
    pub fn resolved(problem: &FixProblem, text: String, platform: String, attempt_log: Vec<AttemptRecord>) -> Self {
        Self {
            success: true,
            attempts: attempt_log.len(),
            resolved_by: Some(platform),
            attempt_log,
            ..Self::base(problem, text)
        }
    }

    /// Every attempt failed; `restored_text` is what the item holds again
    pub fn exhausted(problem: &FixProblem, restored_text: String, attempt_log: Vec<AttemptRecord>) -> Self {
        let last_failure = attempt_log.iter().rev().find_map(|a| match &a.outcome {
            AttemptOutcome::Failed { kind, .. } => Some(*kind),
            AttemptOutcome::Resolved => None,
        });
        let error = format!(
            "{} persisted after {} platform(s): {}",
            problem.kind(),
            attempt_log.len(),
            summarize_failures(&attempt_log)
        );

        Self {
            attempts: attempt_log.len(),
            failure: last_failure,
            error: Some(error),
            attempt_log,
            ..Self::base(problem, restored_text)
        }
    }

    /// Repair stopped by cancellation before the platform list was exhausted
    pub fn cancelled(problem: &FixProblem, restored_text: String, attempt_log: Vec<AttemptRecord>) -> Self {
        let error = format!("Cancelled after {} attempt(s)", attempt_log.len());
        Self {
            attempts: attempt_log.len(),
            failure: attempt_log.iter().rev().find_map(|a| match &a.outcome {
                AttemptOutcome::Failed { kind, .. } => Some(*kind),
                AttemptOutcome::Resolved => None,
            }),
            error: Some(error),
            attempt_log,
            ..Self::base(problem, restored_text)
        }
    }

    /// No platform with credentials is configured
    pub fn configuration_error(problem: &FixProblem) -> Self {
        Self {
            failure: Some(FailureKind::Configuration),
            error: Some(
                "No usable platform configured: add an API key to at least one platform".to_string(),
            ),
            ..Self::base(problem, problem.item.destination_text.clone())
        }
    }

    /// The store could not be read or written during the repair
    pub fn store_error(problem: &FixProblem, error: &anyhow::Error) -> Self {
        Self {
            error: Some(format!("Store error: {:#}", error)),
            ..Self::base(problem, problem.item.destination_text.clone())
        }
    }
}

fn summarize_failures(attempt_log: &[AttemptRecord]) -> String {
    attempt_log
        .iter()
        .filter_map(|a| match &a.outcome {
            AttemptOutcome::Failed { kind, .. } => Some(format!("{} ({})", a.platform, kind)),
            AttemptOutcome::Resolved => None,
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Summary counters of a report
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FixSummary {
    pub total: usize,
    pub fixed: usize,
    pub failed: usize,
    /// Fixed share in percent
    pub success_rate: f64,
}

/// Session-scoped list of repair outcomes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixReport {
    results: Vec<FixResult>,
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    generated_at: String,
    summary: FixSummary,
    results: &'a [FixResult],
}

impl FixReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a result
    pub fn push(&mut self, result: FixResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[FixResult] {
        &self.results
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn fixed(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.fixed()
    }

    pub fn summary(&self) -> FixSummary {
        let total = self.total();
        let fixed = self.fixed();
        FixSummary {
            total,
            fixed,
            failed: total - fixed,
            success_rate: if total == 0 {
                0.0
            } else {
                fixed as f64 * 100.0 / total as f64
            },
        }
    }

    /// Results that did not succeed
    pub fn failed_items(&self) -> Vec<&FixResult> {
        self.results.iter().filter(|r| !r.success).collect()
    }

    /// Result for an item, if it was repaired in this session
    pub fn find(&self, item_id: &str) -> Option<&FixResult> {
        self.results.iter().find(|r| r.item_id == item_id)
    }

    pub fn to_json(&self) -> Result<String> {
        let document = ReportDocument {
            generated_at: chrono::Utc::now().to_rfc3339(),
            summary: self.summary(),
            results: &self.results,
        };
        serde_json::to_string_pretty(&document).context("Failed to serialize fix report")
    }

    /// Write the report as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write fix report: {:?}", path))
    }
}
