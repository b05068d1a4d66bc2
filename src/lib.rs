/*!
 * # transfix - translation task execution and repair
 *
 * A Rust library that runs the translation pass of an AI-assisted batch
 * translator and repairs its defects.
 *
 * ## Features
 *
 * - Concurrent first-pass translation of items on the active platform
 * - Platforms speaking OpenAI, Anthropic, Google or SakuraLLM protocols
 * - Detection of untranslated items, source-script residue and glossary misses
 * - Automatic repair by falling back across every platform with credentials
 * - Transactional SQLite session store in write-ahead log mode
 * - JSON repair report and progress events
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `language`: Supported languages and their scripts
 * - `glossary`: Required term mappings
 * - `platforms`: Valid-platform list computation
 * - `providers`: Backend requester and protocol clients:
 *   - `providers::openai`: OpenAI-compatible client (also SakuraLLM)
 *   - `providers::anthropic`: Anthropic client
 *   - `providers::google`: Google client
 *   - `providers::mock`: Scripted backend for tests
 * - `detection`: Problem detector
 * - `prompts`: First-pass and repair prompts
 * - `fixer`: Fix orchestrator and repair report
 * - `dispatcher`: First-pass worker pool
 * - `database`: Item store
 * - `session`: Session context and cancellation
 * - `events`: Progress event channel
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod database;
pub mod detection;
pub mod dispatcher;
pub mod errors;
pub mod events;
pub mod fixer;
pub mod glossary;
pub mod language;
pub mod platforms;
pub mod prompts;
pub mod providers;
pub mod session;

// Re-export main types for easier usage
pub use app_config::{ApiFormat, Config, PlatformConfig};
pub use database::{Item, ItemStatus, ItemStore, Mutation};
pub use detection::{Defect, DefectKind, FixProblem, ProblemDetector};
pub use dispatcher::{DispatchOutcome, TaskDispatcher};
pub use errors::{AppError, ConfigError, FailureKind, RequestError};
pub use events::{EventSink, SessionEvent};
pub use fixer::{FixOrchestrator, FixReport, FixResult};
pub use glossary::{Glossary, GlossaryEntry};
pub use language::Language;
pub use platforms::{ValidPlatform, valid_platforms};
pub use providers::{Backend, BackendRequester, HttpBackend};
pub use session::Session;
