/*!
 * Repair pass.
 *
 * - `orchestrator`: per-problem fallback across valid platforms
 * - `report`: immutable outcomes and the session report
 */

pub mod orchestrator;
pub mod report;

pub use orchestrator::FixOrchestrator;
pub use report::{AttemptOutcome, AttemptRecord, FixReport, FixResult, FixSummary};
