//! `corpus` command-line entry point.
//!
//! - `corpus ingest`: register archives and run the pipeline until every
//!   source is processed, failed, or the run is interrupted (Ctrl-C stops at
//!   the next batch boundary; rerunning resumes).
//! - `corpus status`: per-source state and row counts.
//! - `corpus move-index`: dump the move-class table as JSON.
//!
//! Logs go to stderr (and optionally a file); stdout carries only reports.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use corpus::persistence::{Persistence, RawGameRepository, SourceRepository};
use corpus::{
    config, load_manifest, Database, NewSource, Pipeline, PipelineConfig, RunSummary,
    SqlitePersistence,
};
use tokio::sync::watch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "corpus", about = "Build a chess training corpus from PGN archives")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Also write logs to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest archives into the corpus database.
    Ingest(IngestArgs),
    /// Show per-source progress and row counts.
    Status {
        /// Database path (default: CORPUS_DB_PATH or the data directory).
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Print the move-class index as JSON.
    MoveIndex,
}

#[derive(Args)]
struct IngestArgs {
    /// Archive paths or http(s) URLs (.pgn, .pgn.zst, .pgn.gz).
    sources: Vec<String>,

    /// JSON manifest listing archives.
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Database path (default: CORPUS_DB_PATH or the data directory).
    #[arg(long)]
    db: Option<PathBuf>,

    /// Rows per storage transaction.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Sources processed concurrently.
    #[arg(long)]
    workers: Option<usize>,

    /// Seconds a claim may go unrenewed before a new run takes it over.
    #[arg(long)]
    claim_timeout_secs: Option<u64>,

    /// Skip games where a known rating is below this.
    #[arg(long)]
    min_elo: Option<i32>,

    /// Skip games where a known rating is above this.
    #[arg(long)]
    max_elo: Option<i32>,

    /// Print the run summary as JSON instead of text.
    #[arg(long)]
    summary_json: bool,
}

impl IngestArgs {
    fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::from_env();
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size.max(1);
        }
        if let Some(workers) = self.workers {
            config.workers = workers.max(1);
        }
        if let Some(secs) = self.claim_timeout_secs {
            config.claim_timeout = Duration::from_secs(secs);
        }
        config.min_elo = self.min_elo;
        config.max_elo = self.max_elo;
        config
    }
}

fn default_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the subscriber. The returned guard must live until exit so the
/// file writer flushes.
fn init_tracing(verbose: u8, log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbose)));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("log file {} has no file name", path.display()))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;

            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_span_events(FmtSpan::CLOSE);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn open_database(db: Option<PathBuf>) -> anyhow::Result<Database> {
    let path = db.unwrap_or_else(config::get_db_path);
    tracing::info!("Using database: {}", path.display());
    Database::open(&path)
        .await
        .with_context(|| format!("failed to open database {}", path.display()))
}

async fn ingest(args: IngestArgs) -> anyhow::Result<ExitCode> {
    let config = args.pipeline_config();

    let mut sources: Vec<NewSource> = args.sources.iter().map(NewSource::new).collect();
    if let Some(manifest) = &args.manifest {
        sources.extend(load_manifest(manifest)?);
    }

    let db = open_database(args.db).await?;
    let store = Arc::new(SqlitePersistence::new(&db));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping at the next batch boundary");
            let _ = shutdown_tx.send(true);
        }
    });

    let summary = Pipeline::new(store, config)
        .with_sources(sources)
        .with_shutdown(shutdown_rx)
        .run()
        .await?;
    db.close().await;

    if args.summary_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    Ok(if summary.all_processed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_summary(summary: &RunSummary) {
    for report in &summary.reports {
        println!(
            "{:?}\t{}\tgames={} dup={} malformed={} skipped={} partial={} snapshots={} dropped={}",
            report.outcome,
            report.uri,
            report.games_inserted,
            report.duplicates,
            report.malformed,
            report.skipped,
            report.games_partial,
            report.snapshots_written,
            report.plies_dropped,
        );
        if let Some(error) = &report.error {
            println!("\t{error}");
        }
    }
    for uri in &summary.unfinished_sources {
        println!("unfinished\t{uri}");
    }
    let counts = &summary.counts;
    println!(
        "corpus: {} sources, {} games ({} pending), {} snapshots",
        counts.sources, counts.raw_games, counts.pending_games, counts.snapshots
    );
}

async fn status(db: Option<PathBuf>) -> anyhow::Result<ExitCode> {
    let db = open_database(db).await?;
    let store = SqlitePersistence::new(&db);

    let sources = store.sources().list_sources().await?;
    let counts = store.games().count_rows().await?;
    db.close().await;

    for source in &sources {
        println!(
            "{}\t{:?}\tsplit={}\t{}{}",
            source.id,
            source.status,
            source.games_split,
            source.uri,
            source
                .error
                .as_deref()
                .map(|e| format!("\t{e}"))
                .unwrap_or_default(),
        );
    }
    println!("{}", serde_json::to_string_pretty(&counts)?);
    Ok(ExitCode::SUCCESS)
}

fn move_index_json() -> serde_json::Value {
    let index = chess::move_index();
    serde_json::json!({
        "version": index.version(),
        "size": index.len(),
        "entries": index.entries().collect::<Vec<_>>(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.verbose, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Ingest(args) => ingest(args).await,
        Commands::Status { db } => status(db).await,
        Commands::MoveIndex => {
            println!("{}", serde_json::to_string_pretty(&move_index_json())?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_ingest_flags() {
        let cli = Cli::try_parse_from([
            "corpus",
            "-vv",
            "ingest",
            "a.pgn.zst",
            "b.pgn",
            "--batch-size",
            "50",
            "--workers",
            "4",
            "--min-elo",
            "1200",
            "--claim-timeout-secs",
            "30",
            "--summary-json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Ingest(args) = cli.command else {
            panic!("expected ingest");
        };
        assert_eq!(args.sources, vec!["a.pgn.zst", "b.pgn"]);
        assert!(args.summary_json);

        let config = args.pipeline_config();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.workers, 4);
        assert_eq!(config.min_elo, Some(1200));
        assert_eq!(config.max_elo, None);
        assert_eq!(config.claim_timeout, Duration::from_secs(30));
    }

    #[test]
    fn zero_sizes_are_clamped() {
        let cli = Cli::try_parse_from(["corpus", "ingest", "--batch-size", "0", "--workers", "0"]).unwrap();
        let Commands::Ingest(args) = cli.command else {
            panic!("expected ingest");
        };
        let config = args.pipeline_config();
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn verbosity_levels() {
        assert_eq!(default_level(0), "info");
        assert_eq!(default_level(1), "debug");
        assert_eq!(default_level(5), "trace");
    }

    #[test]
    fn move_index_dump() {
        let json = move_index_json();
        assert_eq!(json["version"], 1);
        assert_eq!(json["size"], chess::MOVE_SPACE_SIZE);
        assert_eq!(json["entries"].as_array().unwrap().len(), chess::MOVE_SPACE_SIZE);
        assert_eq!(json["entries"][0]["uci"], "a1b1");
    }
}
