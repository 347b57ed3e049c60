//! Service facade over the matching pipeline
//!
//! Owns the loaded playlist, the cache store, and the lifecycle of at most
//! one matching run at a time. `start` validates, spawns the run as a task,
//! and hands back an event receiver; the caller consumes `RunEvent`s from a
//! single subscriber loop. `stop` requests cooperative cancellation through
//! the run's token; in-flight batches finish, queued ones are abandoned, and
//! the run still produces (partial) outputs and a terminal `Done` event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::config::{Config, MatchingConfig, TierToggles};
use crate::errors::{MatcherError, RunError};
use crate::matching::{GuideIndex, MatchEngine, MatchOptions, ProgressTracker};
use crate::models::{
    CacheEntryInfo, GuideSource, LogLevel, RunEvent, RunOutcome, RunSummary,
};
use crate::playlist::{OutputComposer, Playlist};
use crate::sources::SourceLoader;

/// Per-run parameters supplied by the caller.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub sources: Vec<GuideSource>,
    pub tiers: TierToggles,
    /// Worker pool size; 0 derives from the machine
    pub workers: usize,
    pub fuzzy_threshold: f64,
}

pub struct MatcherService {
    config: Config,
    cache: CacheStore,
    playlist: Option<Arc<Playlist>>,
    active: Arc<AtomicBool>,
    cancel: Option<CancellationToken>,
}

impl MatcherService {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let cache = CacheStore::new(&config.cache)?;
        Ok(Self {
            config,
            cache,
            playlist: None,
            active: Arc::new(AtomicBool::new(false)),
            cancel: None,
        })
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Load (or replace) the playlist; returns the parsed entry count.
    /// Rejected while a run is active.
    pub fn load_playlist(&mut self, path: &std::path::Path) -> Result<usize, MatcherError> {
        if self.is_running() {
            return Err(RunError::AlreadyRunning.into());
        }
        let playlist = Playlist::load(path)?;
        let count = playlist.entry_count();
        info!(
            "Loaded playlist {} ({} lines, {} entries)",
            path.display(),
            playlist.lines.len(),
            count
        );
        self.playlist = Some(Arc::new(playlist));
        Ok(count)
    }

    /// Discard the loaded playlist. Rejected while a run is active.
    pub fn reset(&mut self) -> Result<(), MatcherError> {
        if self.is_running() {
            return Err(RunError::AlreadyRunning.into());
        }
        self.playlist = None;
        Ok(())
    }

    /// Start a matching run and return its event stream.
    ///
    /// The returned receiver yields log and progress events and exactly one
    /// terminal [`RunEvent::Done`].
    pub fn start(
        &mut self,
        run: RunConfig,
    ) -> Result<mpsc::UnboundedReceiver<RunEvent>, MatcherError> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(RunError::AlreadyRunning.into());
        }
        let Some(playlist) = self.playlist.clone() else {
            self.active.store(false, Ordering::SeqCst);
            return Err(RunError::NoPlaylist.into());
        };
        if !run.tiers.any_enabled() {
            self.active.store(false, Ordering::SeqCst);
            return Err(RunError::NoTiersEnabled.into());
        }

        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());

        let workers = MatchingConfig {
            workers: run.workers,
            fuzzy_threshold: run.fuzzy_threshold,
            tiers: run.tiers,
        }
        .effective_workers();
        let threshold = run.fuzzy_threshold.clamp(0.0, 1.0);

        let (tx, rx) = mpsc::unbounded_channel();
        let events = tx.clone();
        let ctx = RunContext {
            playlist,
            sources: run.sources,
            tiers: run.tiers,
            workers,
            threshold,
            loader: SourceLoader::new(self.cache.clone()),
            composer: OutputComposer::new(self.config.output.results_dir.clone()),
            cancel,
            tx,
        };
        let active = Arc::clone(&self.active);
        tokio::spawn(supervise(
            async move { ctx.execute().await },
            active,
            events,
        ));

        Ok(rx)
    }

    /// Request cooperative cancellation of the active run, if any.
    pub fn stop(&self) {
        if let Some(cancel) = &self.cancel {
            if self.is_running() {
                info!("Cancellation requested");
                cancel.cancel();
            }
        }
    }

    pub async fn cache_size(&self) -> Result<u64, MatcherError> {
        Ok(self.cache.total_size().await?)
    }

    pub async fn list_cache_entries(&self) -> Result<Vec<CacheEntryInfo>, MatcherError> {
        Ok(self.cache.list_entries().await?)
    }

    pub async fn clear_cache(&self) -> Result<u64, MatcherError> {
        Ok(self.cache.clear().await?)
    }

    pub async fn delete_expired_cache_entries(&self) -> Result<(usize, u64), MatcherError> {
        Ok(self.cache.delete_expired().await?)
    }
}

/// Drive a run to its terminal event. The run itself executes on an inner
/// task so that a panic anywhere inside it surfaces as a `JoinError` here:
/// the run slot is still released and the subscriber still receives exactly
/// one `Done`, instead of the service staying wedged as active.
async fn supervise<F>(
    run: F,
    active: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<RunEvent>,
) where
    F: std::future::Future<Output = RunOutcome> + Send + 'static,
{
    let outcome = match tokio::spawn(run).await {
        Ok(outcome) => outcome,
        Err(e) => RunOutcome::Failed(format!("matching run aborted: {e}")),
    };
    // Release the run slot before the terminal event so a consumer reacting
    // to Done can immediately start the next run.
    active.store(false, Ordering::SeqCst);
    let _ = tx.send(RunEvent::Done(outcome));
}

/// Everything one run needs, moved into its task.
struct RunContext {
    playlist: Arc<Playlist>,
    sources: Vec<GuideSource>,
    tiers: TierToggles,
    workers: usize,
    threshold: f64,
    loader: SourceLoader,
    composer: OutputComposer,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl RunContext {
    fn log(&self, level: LogLevel, message: String) {
        let _ = self.tx.send(RunEvent::Log(level, message));
    }

    async fn execute(&self) -> RunOutcome {
        let started = Instant::now();

        self.log(
            LogLevel::Info,
            format!("Loading {} guide source(s)", self.sources.len()),
        );
        let guide = match self.loader.load_all(&self.sources).await {
            Ok(guide) => guide,
            Err(e) => {
                warn!("Guide load failed: {}", e);
                return RunOutcome::Failed(e.to_string());
            }
        };
        self.log(
            LogLevel::Success,
            format!(
                "Loaded {} channels from {} source(s)",
                guide.channels.len(),
                guide.sources_loaded
            ),
        );

        let sources_loaded = guide.sources_loaded;
        let index = Arc::new(GuideIndex::build(guide.channels));
        self.log(
            LogLevel::Info,
            format!(
                "Indexed {} channels ({} with identifiers)",
                index.channel_count(),
                index.id_count()
            ),
        );

        let entries = self.playlist.entries.clone();
        let total = entries.len();
        self.log(
            LogLevel::Info,
            format!("Matching {} entries with {} workers", total, self.workers),
        );

        let engine = MatchEngine::new(
            Arc::clone(&index),
            MatchOptions {
                tiers: self.tiers,
                workers: self.workers,
                fuzzy_threshold: self.threshold,
            },
            self.cancel.clone(),
        );

        let mut tracker = ProgressTracker::new();
        let tx = self.tx.clone();
        let outcome = engine
            .run(entries, move |batch, completed, total| {
                for result in batch {
                    let event = match (&result.matched_channel, result.tier) {
                        (Some(channel), Some(tier)) => RunEvent::Log(
                            LogLevel::Match,
                            format!(
                                "{} -> {} [{}] ({})",
                                result.entry.display_name,
                                channel,
                                tier.label(),
                                result.source_label.as_deref().unwrap_or("")
                            ),
                        ),
                        _ => RunEvent::Log(
                            LogLevel::Unmatched,
                            format!("{} unmatched", result.entry.display_name),
                        ),
                    };
                    let _ = tx.send(event);
                }
                let _ = tx.send(RunEvent::Progress(tracker.on_progress(completed, total)));
            })
            .await;

        let unmatched_names: Vec<String> = outcome
            .results
            .values()
            .filter(|r| !r.is_matched())
            .map(|r| r.entry.display_name.clone())
            .collect();

        let mut summary = RunSummary {
            total_entries: total,
            completed_entries: outcome.completed,
            matched_entries: outcome.matched,
            guide_channels: index.channel_count(),
            sources_loaded,
            elapsed: started.elapsed(),
            workers: self.workers,
            tier_counts: OutputComposer::tier_counts(&outcome.results),
            unmatched_names,
            ..Default::default()
        };

        match self.composer.write_all(
            &self.playlist.path,
            &self.playlist.lines,
            &outcome.results,
            &summary,
            &self.tiers,
            self.threshold,
            outcome.cancelled,
        ) {
            Ok(paths) => {
                summary.playlist_path = Some(paths.playlist);
                summary.csv_path = Some(paths.csv);
                summary.report_path = Some(paths.report);
            }
            Err(e) => return RunOutcome::Failed(format!("Failed to write outputs: {e}")),
        }

        self.log(
            LogLevel::Success,
            format!(
                "Matched {}/{} entries ({:.1}%) in {:.1}s",
                summary.matched_entries,
                summary.total_entries,
                summary.match_rate(),
                summary.elapsed.as_secs_f64()
            ),
        );

        if outcome.cancelled {
            RunOutcome::Cancelled(summary)
        } else {
            RunOutcome::Completed(summary)
        }
    }
}
