use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use epg_matcher::{
    config::Config,
    matching::progress::format_remaining,
    models::{GuideSource, LogLevel, RunEvent, RunOutcome, RunSummary},
    service::RunConfig,
    MatcherService,
};

#[derive(Parser)]
#[command(name = "epg-matcher")]
#[command(version)]
#[command(about = "Match M3U playlist channels against XMLTV EPG sources")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a matching pass over a playlist
    Match {
        /// Playlist file to match
        #[arg(short, long, value_name = "FILE")]
        playlist: PathBuf,

        /// EPG source: local file path or http(s) URL (repeatable)
        #[arg(short, long = "epg", value_name = "SOURCE", required = true)]
        epg: Vec<GuideSource>,

        /// Worker pool size (0 = derive from CPU count)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Fuzzy similarity threshold (0.0 - 1.0)
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Directory for the annotated playlist and reports
        #[arg(short, long, value_name = "DIR")]
        results_dir: Option<PathBuf>,

        /// Disable the tvg-id tier
        #[arg(long)]
        no_tvg_id: bool,

        /// Disable the tvg-name tier
        #[arg(long)]
        no_tvg_name: bool,

        /// Disable the display-name tier
        #[arg(long)]
        no_display_name: bool,

        /// Disable the normalized-name tier
        #[arg(long)]
        no_normalized: bool,

        /// Disable the fuzzy tier
        #[arg(long)]
        no_fuzzy: bool,
    },

    /// Inspect or maintain the guide source cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Print the total cache size
    Size,
    /// List cache entries with size, age and expiry
    List,
    /// Delete every cache entry
    Clear,
    /// Delete only expired entries
    DeleteExpired,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("epg_matcher={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load_from(&cli.config)?;

    match cli.command {
        Command::Match {
            playlist,
            epg,
            workers,
            threshold,
            results_dir,
            no_tvg_id,
            no_tvg_name,
            no_display_name,
            no_normalized,
            no_fuzzy,
        } => {
            let mut config = config;
            if let Some(dir) = results_dir {
                config.output.results_dir = dir;
            }
            let mut tiers = config.matching.tiers;
            tiers.tvg_id &= !no_tvg_id;
            tiers.tvg_name &= !no_tvg_name;
            tiers.display_name &= !no_display_name;
            tiers.normalized &= !no_normalized;
            tiers.fuzzy &= !no_fuzzy;

            let run = RunConfig {
                sources: epg,
                tiers,
                workers: workers.unwrap_or(config.matching.workers),
                fuzzy_threshold: threshold.unwrap_or(config.matching.fuzzy_threshold),
            };

            let mut service = MatcherService::new(config)?;
            let count = service.load_playlist(&playlist)?;
            info!("Playlist loaded: {} entries", count);

            let rx = service.start(run)?;
            let outcome = consume_events(rx).await;
            match outcome {
                RunOutcome::Completed(summary) => print_summary(&summary, false),
                RunOutcome::Cancelled(summary) => print_summary(&summary, true),
                RunOutcome::Failed(message) => {
                    error!("Run failed: {}", message);
                    std::process::exit(1);
                }
            }
        }

        Command::Cache { command } => {
            let service = MatcherService::new(config)?;
            match command {
                CacheCommand::Size => {
                    let bytes = service.cache_size().await?;
                    println!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0);
                }
                CacheCommand::List => {
                    let entries = service.list_cache_entries().await?;
                    if entries.is_empty() {
                        println!("Cache is empty");
                    }
                    for entry in entries {
                        println!(
                            "{:<40} {:>10.2} MB  age {:<12} {}",
                            entry.file_name,
                            entry.size_bytes as f64 / 1024.0 / 1024.0,
                            humantime::format_duration(std::time::Duration::from_secs(
                                entry.age.as_secs()
                            ))
                            .to_string(),
                            if entry.expired { "expired" } else { "fresh" }
                        );
                    }
                }
                CacheCommand::Clear => {
                    let freed = service.clear_cache().await?;
                    println!("Freed {:.2} MB", freed as f64 / 1024.0 / 1024.0);
                }
                CacheCommand::DeleteExpired => {
                    let (count, freed) = service.delete_expired_cache_entries().await?;
                    println!(
                        "Deleted {} expired entries, freed {:.2} MB",
                        count,
                        freed as f64 / 1024.0 / 1024.0
                    );
                }
            }
        }
    }

    Ok(())
}

/// Single subscriber loop over the run's event stream.
async fn consume_events(
    mut rx: tokio::sync::mpsc::UnboundedReceiver<RunEvent>,
) -> RunOutcome {
    loop {
        match rx.recv().await {
            Some(RunEvent::Log(level, message)) => match level {
                LogLevel::Info | LogLevel::Success => info!("{}", message),
                LogLevel::Warning => warn!("{}", message),
                LogLevel::Error => error!("{}", message),
                LogLevel::Match | LogLevel::Unmatched => debug!("{}", message),
            },
            Some(RunEvent::Progress(sample)) => {
                info!(
                    "Progress: {}/{} ({:.1}%), ETA {}",
                    sample.completed,
                    sample.total,
                    sample.percentage,
                    format_remaining(sample.remaining)
                );
            }
            Some(RunEvent::Done(outcome)) => return outcome,
            // Sender dropped without a terminal event; treat as failure
            None => return RunOutcome::Failed("event stream closed unexpectedly".to_string()),
        }
    }
}

fn print_summary(summary: &RunSummary, cancelled: bool) {
    if cancelled {
        warn!(
            "Run cancelled after {}/{} entries",
            summary.completed_entries, summary.total_entries
        );
    }
    info!(
        "Matched {}/{} entries ({:.1}%)",
        summary.matched_entries,
        summary.total_entries,
        summary.match_rate()
    );
    for (label, count) in &summary.tier_counts {
        info!("  {}: {}", label, count);
    }
    if let Some(path) = &summary.playlist_path {
        info!("Playlist: {}", path.display());
    }
    if let Some(path) = &summary.csv_path {
        info!("Statistics: {}", path.display());
    }
    if let Some(path) = &summary.report_path {
        info!("Report: {}", path.display());
    }
}
