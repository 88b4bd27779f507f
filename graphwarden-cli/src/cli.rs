//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// GraphWarden -- OCSF normalization and graph detection.
///
/// Use `graphwarden <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "graphwarden", version, about, long_about = None)]
pub struct Cli {
    /// Path to the graphwarden.toml configuration file.
    ///
    /// A missing file falls back to defaults plus environment overrides.
    #[arg(short, long, global = true, default_value = "graphwarden.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest events, one per line.
    Ingest(IngestArgs),

    /// Run queue workers against the configured broker.
    Consume(ConsumeArgs),

    /// Run detection rules against the graph.
    Detect(DetectArgs),

    /// Manage detection rules.
    Rules(RulesArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

/// Ingestion mode as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Direct,
    Queued,
}

// ---- ingest ----

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Input file with one event per line, or `-` for stdin.
    pub input: PathBuf,

    /// Source format hint (ocsf, syslog, cef, leef, raw). Omit to auto-detect.
    #[arg(short, long)]
    pub format: Option<String>,

    /// Ingestion mode. Defaults to `ingest.default_mode`.
    #[arg(short, long)]
    pub mode: Option<ModeArg>,

    /// Run all enabled rules after ingestion in the same process.
    #[arg(long)]
    pub detect: bool,
}

// ---- consume ----

#[derive(Args, Debug)]
pub struct ConsumeArgs {
    /// Number of workers in the consumer group.
    #[arg(short, long, default_value_t = 1)]
    pub workers: usize,

    /// Stop after this many messages per worker.
    #[arg(long)]
    pub max_messages: Option<u64>,
}

// ---- detect ----

#[derive(Args, Debug)]
pub struct DetectArgs {
    /// Run a single rule instead of all enabled rules.
    #[arg(long)]
    pub rule: Option<String>,

    /// Events to load into the in-memory graph before detection.
    #[arg(long)]
    pub events: Option<PathBuf>,

    /// Source format hint for `--events`.
    #[arg(short, long, requires = "events")]
    pub format: Option<String>,
}

// ---- rules ----

#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub action: RulesAction,
}

#[derive(Subcommand, Debug)]
pub enum RulesAction {
    /// List rules loaded from `detection.rules_path`.
    List {
        /// Filter by enabled flag.
        #[arg(long)]
        enabled: Option<bool>,

        /// Filter by tag.
        #[arg(long)]
        tag: Option<String>,
    },
    /// Validate a rule file or directory without running it.
    Validate {
        /// Rule file (.json/.yml/.yaml) or directory.
        path: PathBuf,
    },
}

// ---- config ----

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only one section (general, schema, graph, queue, ingest, detection).
        #[arg(long)]
        section: Option<String>,
    },
}
