#![forbid(unsafe_code)]

mod cmd;
mod output;

use std::env;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use output::{CliError, OutputMode};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "chorus: inspect a local store of replicated documents and chat",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Write",
        about = "Import wire envelopes",
        long_about = "Import a JSONL stream of commit envelopes into the local store. \
                      Re-importing the same stream is a no-op.",
        after_help = "EXAMPLES:\n    # Import a captured feed\n    chorus import --input feed.jsonl\n\n    # Read from stdin and name new channels\n    cat feed.jsonl | chorus import --name general"
    )]
    Import(cmd::import::ImportArgs),

    #[command(
        next_help_heading = "Read",
        about = "List chat messages",
        long_about = "List a channel's chat messages in timestamp order.",
        after_help = "EXAMPLES:\n    # By channel id or document id\n    chorus messages doc-1\n\n    # Emit machine-readable output\n    chorus messages doc-1 --json"
    )]
    Messages(cmd::messages::MessagesArgs),

    #[command(
        next_help_heading = "Read",
        about = "List document revisions",
        long_about = "List a channel's document revisions with their history index.",
        after_help = "EXAMPLES:\n    # Full history\n    chorus history doc-1\n\n    # A time window\n    chorus history doc-1 --from 2026-01-01T00:00:00Z --to 2026-02-01T00:00:00Z"
    )]
    History(cmd::history::HistoryArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show per-character authorship",
        long_about = "Show who wrote each part of a document, now or at a history index.",
        after_help = "EXAMPLES:\n    # The current document\n    chorus blame doc-1\n\n    # As of the third revision\n    chorus blame doc-1 --at 2"
    )]
    Blame(cmd::blame::BlameArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Check store integrity",
        long_about = "Check the schema version, indexes, and that every snapshot matches its newest revision.",
        after_help = "EXAMPLES:\n    # Check only\n    chorus verify\n\n    # Rebuild stale snapshots from history\n    chorus verify --repair"
    )]
    Verify(cmd::verify::VerifyArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CHORUS_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "chorus=debug,info"
        } else {
            "chorus=info,warn"
        })
    });

    let format = env::var("CHORUS_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }
    let output = cli.output_mode();

    let result = env::current_dir()
        .map_err(anyhow::Error::from)
        .and_then(|project_root| match &cli.command {
            Commands::Import(args) => cmd::import::run_import(args, output, &project_root),
            Commands::Messages(args) => cmd::messages::run_messages(args, output, &project_root),
            Commands::History(args) => cmd::history::run_history(args, output, &project_root),
            Commands::Blame(args) => cmd::blame::run_blame(args, output, &project_root),
            Commands::Verify(args) => cmd::verify::run_verify(args, output, &project_root),
        });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if output::render_error(output, &CliError::from_anyhow(&err)).is_err() {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}
