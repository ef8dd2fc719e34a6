// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::PathBuf;

use babelbook::app_config::{Config, LogLevel};
use babelbook::app_controller::Controller;
use babelbook::book::load_book;

/// CLI wrapper for LogLevel to implement ValueEnum
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

/// babelbook - structure-preserving EPUB translation
///
/// Translates EPUB books between languages using chat-completion AI
/// backends while preserving the original markup structure.
#[derive(Parser, Debug)]
#[command(name = "babelbook")]
#[command(version = "0.1.0")]
#[command(about = "AI-powered EPUB book translation")]
#[command(long_about = "babelbook translates EPUB books using AI chat-completion backends.

EXAMPLES:
    babelbook book.epub book.zh.epub en          # English to Chinese (default target)
    babelbook book.epub book.fr.epub en fr       # English to French
    babelbook --preview 0 book.epub out.epub en  # Preview the first chapter
    babelbook --no-memory book.epub out.epub en  # Skip the translation memory

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    file with --config. If the config file doesn't exist, a default one will be
    created automatically; set the provider API key before the first real run.

SUPPORTED PROVIDERS:
    openai - OpenAI chat completions API (requires API key)
    azure  - Azure-hosted OpenAI deployment (requires endpoint and deployment)")]
struct CommandLineOptions {
    /// Input EPUB file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output EPUB file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Source language code (e.g. 'en', 'fr')
    #[arg(value_name = "SOURCE_LANG")]
    source_language: String,

    /// Target language code
    #[arg(value_name = "TARGET_LANG", default_value = "zh")]
    target_language: String,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Print a plain-text preview of the given chapter index and exit
    #[arg(long, value_name = "CHAPTER")]
    preview: Option<usize>,

    /// Disable the translation memory for this run
    #[arg(long)]
    no_memory: bool,
}

/// Custom logger writing colored, timestamped lines to stderr
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

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
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S%.3f");
            let color = Self::color_for_level(record.level());
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {:5} {}\x1B[0m",
                color,
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
    // Start at info; the effective level is applied after the config loads
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    if let Some(level) = cli.log_level {
        log::set_max_level(LogLevel::from(level).to_level_filter());
    }

    let mut config = Config::load_or_create(&cli.config)?;
    config.source_language = cli.source_language.clone();
    config.target_language = cli.target_language.clone();
    if cli.no_memory {
        config.memory.enabled = false;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }

    config.validate().context("Configuration validation failed")?;

    if cli.log_level.is_none() {
        log::set_max_level(config.log_level.to_level_filter());
    }

    let controller = Controller::with_config(config.clone())?;

    if let Some(chapter_index) = cli.preview {
        let loaded = load_book(&cli.input, &config.source_language, &config.target_language)?;
        let preview = controller.preview_chapter(&loaded, chapter_index)?;
        println!("{}", preview);
        return Ok(());
    }

    // Ctrl-C requests cooperative cancellation; in-flight requests finish
    // and the partially translated book is discarded.
    let cancel = controller.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Cancellation requested, stopping new translation calls");
            cancel.cancel();
        }
    });

    controller.run(&cli.input, &cli.output).await
}
