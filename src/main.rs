// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use indicatif::{ProgressBar, ProgressStyle};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, error, info, warn};
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use transfix::app_config::{Config, LogLevel};
use transfix::database::connection::DatabaseConnection;
use transfix::events::{self, SessionEvent};
use transfix::{FixOrchestrator, FixReport, Session, TaskDispatcher, valid_platforms};

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest items, translate them, then repair every detected defect
    Translate {
        /// JSON file with an array of {"id", "source_text"} objects
        #[arg(short, long, value_name = "FILE")]
        items: PathBuf,

        /// Session store (defaults to the user data directory)
        #[arg(long, value_name = "FILE")]
        db: Option<PathBuf>,

        /// Where to write the repair report
        #[arg(short, long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Repair defects in an existing session store
    Fix {
        /// Session store (defaults to the user data directory)
        #[arg(long, value_name = "FILE")]
        db: Option<PathBuf>,

        /// Where to write the repair report
        #[arg(short, long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Show the platforms a repair would try, in order
    Platforms,

    /// Generate shell completions for transfix
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// transfix - translate items with AI platforms and repair what comes back wrong
#[derive(Parser, Debug)]
#[command(name = "transfix")]
#[command(version)]
#[command(about = "AI translation pass with automatic defect repair")]
#[command(long_about = "transfix translates items on the active platform, detects untranslated \
items, source-script residue and glossary misses, and repairs them by trying every platform \
that has credentials.

EXAMPLES:
    transfix translate --items items.json              # Translate and repair
    transfix translate -i items.json -r report.json    # Also write a repair report
    transfix fix --db session.db                       # Repair an existing session
    transfix platforms                                 # Show the fallback order
    transfix completions bash > transfix.bash          # Generate bash completions

CONFIGURATION:
    Configuration is stored in transfix.json by default. You can specify a different
    config file with --config. If the config file doesn't exist, a default one
    will be created automatically.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "transfix.json")]
    config: PathBuf,

    /// Set logging level
    #[arg(short, long, global = true, value_enum)]
    log_level: Option<CliLogLevel>,
}

/// One entry of the items file
#[derive(Debug, Deserialize)]
struct ItemInput {
    id: String,
    source_text: String,
}

// @struct: Custom logger implementation; filtering follows log::max_level
struct CustomLogger;

impl CustomLogger {
    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger))?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI colour for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let _ = writeln!(
                std::io::stderr(),
                "{}{} {:<5} {}\x1B[0m",
                Self::color_for_level(record.level()),
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(shell, &mut cmd, "transfix", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_or_create_config(&cli.config, cli.log_level)?;
    log::set_max_level(config.log_level.to_level_filter());

    let outcome = match cli.command {
        Commands::Translate { items, db, report } => run_translate(config, &items, db, report).await,
        Commands::Fix { db, report } => run_fix(config, db, report).await,
        Commands::Platforms => show_platforms(&config),
        Commands::Completions { .. } => Ok(()),
    };

    if let Err(e) = &outcome {
        error!("{:#}", e);
    }
    outcome
}

fn load_or_create_config(path: &Path, log_level: Option<CliLogLevel>) -> Result<Config> {
    let mut config = if path.exists() {
        Config::load(path)?
    } else {
        warn!("Config file not found at {:?}, creating default config.", path);
        let config = Config::default();
        config.save(path)?;
        config
    };

    if let Some(level) = log_level {
        config.log_level = level.into();
    }

    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

fn store_path(db: Option<PathBuf>) -> Result<PathBuf> {
    let path = match db {
        Some(path) => path,
        None => DatabaseConnection::default_database_path()?,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create store directory: {:?}", parent))?;
    }
    Ok(path)
}

fn read_items(path: &Path) -> Result<Vec<(String, String)>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read items file: {:?}", path))?;
    let items: Vec<ItemInput> =
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse items file: {:?}", path))?;
    if items.is_empty() {
        bail!("Items file {:?} contains no items", path);
    }
    Ok(items.into_iter().map(|i| (i.id, i.source_text)).collect())
}

/// Open a session with progress display and Ctrl-C cancellation
fn open_session(config: Config, db: Option<PathBuf>) -> Result<(Session, JoinHandle<()>)> {
    let path = store_path(db)?;
    let (sink, receiver) = events::channel();
    let session = Session::open(&path, config)?.with_events(sink);
    info!("Using session store {:?}", path);

    let cancel = session.cancel_flag().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted: finishing in-flight requests, no new work will start");
            cancel.cancel();
        }
    });

    Ok((session, spawn_progress(receiver)))
}

async fn run_translate(config: Config, items: &Path, db: Option<PathBuf>, report: Option<PathBuf>) -> Result<()> {
    let inputs = read_items(items)?;
    let (session, progress) = open_session(config, db)?;
    session.record_setup().await?;

    let added = session.store().ingest(inputs).await?;
    info!("Ingested {} new item(s)", added);

    TaskDispatcher::new(&session).run_pending().await?;
    let fix_report = FixOrchestrator::new(&session).fix_store().await?;

    finish(session, progress, fix_report, report).await
}

async fn run_fix(config: Config, db: Option<PathBuf>, report: Option<PathBuf>) -> Result<()> {
    let (session, progress) = open_session(config, db)?;
    session.record_setup().await?;

    let fix_report = FixOrchestrator::new(&session).fix_store().await?;

    finish(session, progress, fix_report, report).await
}

async fn finish(session: Session, progress: JoinHandle<()>, fix_report: FixReport, report: Option<PathBuf>) -> Result<()> {
    let counts = session.store().status_counts().await?;
    info!("Items: {}", counts);

    for (platform, usage) in session.usage().snapshot() {
        info!(
            "Usage on '{}': {} request(s), {} failed, {} input / {} output tokens, {:.1}s",
            platform,
            usage.requests,
            usage.failures,
            usage.input_tokens,
            usage.output_tokens,
            usage.api_time_ms as f64 / 1000.0
        );
    }

    for failed in fix_report.failed_items() {
        warn!(
            "Item {} not repaired ({}): {}",
            failed.item_id,
            failed.defect,
            failed.error.as_deref().unwrap_or("unknown error")
        );
    }

    let summary = fix_report.summary();
    info!(
        "Repair summary: {} fixed, {} failed of {} ({:.1}%)",
        summary.fixed, summary.failed, summary.total, summary.success_rate
    );

    if let Some(path) = report {
        fix_report.save(&path)?;
        info!("Report written to {:?}", path);
    }

    session.close()?;
    let _ = progress.await;
    Ok(())
}

fn show_platforms(config: &Config) -> Result<()> {
    let platforms = valid_platforms(config);
    if platforms.is_empty() {
        warn!("No platform has an API key; repairs will fail with a configuration error");
        return Ok(());
    }

    for (position, valid) in platforms.iter().enumerate() {
        println!(
            "{}. {} [index {}] {} {}",
            position + 1,
            valid.display_name,
            valid.index,
            valid.platform.api_format,
            valid.platform.model
        );
    }
    Ok(())
}

fn progress_bar(total: usize, message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} items ({percent}%) {msg} {eta}")
        .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style.progress_chars("█▓▒░"));
    bar.set_message(message);
    bar
}

/// Drive progress bars from session events until every sender is gone
fn spawn_progress(mut receiver: UnboundedReceiver<SessionEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut bar: Option<ProgressBar> = None;
        while let Some(event) = receiver.recv().await {
            match event {
                SessionEvent::DispatchStarted { total } => bar = Some(progress_bar(total, "Translating")),
                SessionEvent::FixStarted { total } => bar = Some(progress_bar(total, "Repairing")),
                SessionEvent::ItemFinished { completed, .. } | SessionEvent::FixProgress { completed, .. } => {
                    if let Some(bar) = &bar {
                        bar.set_position(completed as u64);
                    }
                }
                SessionEvent::DispatchFinished { .. } | SessionEvent::FixFinished { .. } => {
                    if let Some(bar) = bar.take() {
                        bar.finish_and_clear();
                    }
                }
            }
        }
    })
}
