//! Tiered matching pipeline and concurrent batch scheduler
//!
//! Per entry, tiers run in fixed priority order (tvg-id, tvg-name, display
//! name, normalized name, fuzzy); the first hit wins and lower tiers are not
//! attempted. Entries are partitioned into batches dispatched onto a bounded
//! worker pool; workers share only the read-only index and the cancellation
//! token, and return their batch's results to the single coordinating task.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::config::TierToggles;
use crate::matching::index::GuideIndex;
use crate::matching::normalize_name;
use crate::matching::similarity::similarity;
use crate::models::{MatchResult, MatchTier, PlaylistEntry};

/// Fuzzy-scan prefilter: candidates whose normalized-name length differs by
/// more than this many characters are skipped without scoring.
const FUZZY_LEN_WINDOW: usize = 10;

/// Largest batch handed to a single worker.
const MAX_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone)]
pub struct MatchOptions {
    pub tiers: TierToggles,
    pub workers: usize,
    pub fuzzy_threshold: f64,
}

/// What the scheduler produced: per-line results plus running totals.
#[derive(Debug, Default)]
pub struct EngineOutcome {
    /// Results keyed by original line index, so reassembly is independent of
    /// batch completion order.
    pub results: BTreeMap<usize, MatchResult>,
    pub matched: usize,
    pub completed: usize,
    pub cancelled: bool,
}

pub struct MatchEngine {
    index: Arc<GuideIndex>,
    options: MatchOptions,
    cancel: CancellationToken,
}

impl MatchEngine {
    pub fn new(index: Arc<GuideIndex>, options: MatchOptions, cancel: CancellationToken) -> Self {
        Self {
            index,
            options,
            cancel,
        }
    }

    /// batch size = clamp(total / (workers x 10), 1, 50)
    pub fn batch_size(total: usize, workers: usize) -> usize {
        (total / (workers.max(1) * 10)).clamp(1, MAX_BATCH_SIZE)
    }

    /// Run the full batch schedule.
    ///
    /// `on_batch` runs on the coordinating task after every batch completion
    /// with that batch's results and the running (completed, total) counts;
    /// all shared-state mutation happens there, single-writer.
    pub async fn run<F>(&self, entries: Vec<PlaylistEntry>, mut on_batch: F) -> EngineOutcome
    where
        F: FnMut(&[MatchResult], usize, usize),
    {
        let total = entries.len();
        let workers = self.options.workers.max(1);
        let batch_size = Self::batch_size(total, workers);
        debug!(
            "Scheduling {} entries in batches of {} across {} workers",
            total, batch_size, workers
        );

        let mut batches: VecDeque<Vec<PlaylistEntry>> = {
            let mut queue = VecDeque::new();
            let mut entries = entries.into_iter();
            loop {
                let batch: Vec<PlaylistEntry> = entries.by_ref().take(batch_size).collect();
                if batch.is_empty() {
                    break;
                }
                queue.push_back(batch);
            }
            queue
        };

        let mut outcome = EngineOutcome::default();
        let mut join_set: JoinSet<Vec<MatchResult>> = JoinSet::new();

        for _ in 0..workers {
            if !self.spawn_batch(&mut join_set, &mut batches) {
                break;
            }
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(batch_results) => {
                    outcome.completed += batch_results.len();
                    outcome.matched += batch_results.iter().filter(|r| r.is_matched()).count();
                    for result in &batch_results {
                        outcome
                            .results
                            .insert(result.entry.line_index, result.clone());
                    }
                    on_batch(&batch_results, outcome.completed, total);
                }
                Err(e) => {
                    // A panicking worker loses its batch; the run continues
                    // and those entries stay absent from the result map.
                    error!("Match worker failed: {}", e);
                }
            }
            self.spawn_batch(&mut join_set, &mut batches);
        }

        outcome.cancelled = self.cancel.is_cancelled() || outcome.completed < total;
        outcome
    }

    /// Submit the next batch unless cancelled or exhausted.
    fn spawn_batch(
        &self,
        join_set: &mut JoinSet<Vec<MatchResult>>,
        batches: &mut VecDeque<Vec<PlaylistEntry>>,
    ) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let Some(batch) = batches.pop_front() else {
            return false;
        };

        let index = Arc::clone(&self.index);
        let tiers = self.options.tiers;
        let threshold = self.options.fuzzy_threshold;
        let cancel = self.cancel.clone();
        join_set.spawn_blocking(move || match_batch(batch, &index, &tiers, threshold, &cancel));
        true
    }
}

/// Match one batch; pure computation over the shared read-only index.
/// Cancellation is checked before each entry; abandoned entries simply never
/// produce a result.
fn match_batch(
    batch: Vec<PlaylistEntry>,
    index: &GuideIndex,
    tiers: &TierToggles,
    threshold: f64,
    cancel: &CancellationToken,
) -> Vec<MatchResult> {
    let mut results = Vec::with_capacity(batch.len());
    for entry in batch {
        if cancel.is_cancelled() {
            break;
        }
        results.push(match_entry(entry, index, tiers, threshold));
    }
    results
}

/// Resolve a single entry through the tier pipeline.
pub fn match_entry(
    entry: PlaylistEntry,
    index: &GuideIndex,
    tiers: &TierToggles,
    threshold: f64,
) -> MatchResult {
    if tiers.tvg_id && !entry.tvg_id.is_empty() {
        if let Some(channel) = index.by_id(&entry.tvg_id) {
            return MatchResult::matched(entry, MatchTier::TvgId, channel);
        }
    }

    if tiers.tvg_name && !entry.tvg_name.is_empty() {
        if let Some(channel) = index.by_secondary_name(&entry.tvg_name) {
            return MatchResult::matched(entry, MatchTier::TvgName, channel);
        }
    }

    if tiers.display_name && !entry.display_name.is_empty() {
        if let Some(channel) = index.by_display_name(&entry.display_name) {
            return MatchResult::matched(entry, MatchTier::DisplayName, channel);
        }
    }

    let normalized = if tiers.normalized || tiers.fuzzy {
        normalize_name(&entry.display_name)
    } else {
        String::new()
    };

    if tiers.normalized && !normalized.is_empty() {
        if let Some(channel) = index.by_normalized_name(&normalized) {
            return MatchResult::matched(entry, MatchTier::Normalized, channel);
        }
    }

    if tiers.fuzzy && !normalized.is_empty() {
        let entry_len = normalized.chars().count();
        let mut best: Option<(&crate::matching::index::IndexedChannel, f64)> = None;

        for candidate in index.all_channels() {
            let candidate_len = candidate.normalized_name.chars().count();
            if entry_len.abs_diff(candidate_len) > FUZZY_LEN_WINDOW {
                continue;
            }
            let score = similarity(&normalized, &candidate.normalized_name);
            if score > threshold && best.map_or(true, |(_, b)| score > b) {
                best = Some((candidate, score));
            }
        }

        if let Some((candidate, _)) = best {
            return MatchResult::matched(entry, MatchTier::Fuzzy, &candidate.channel);
        }
    }

    MatchResult::unmatched(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GuideChannel;

    fn channel(id: &str, name: &str) -> GuideChannel {
        GuideChannel {
            guide_id: id.to_string(),
            display_name: name.to_string(),
            source_label: "guide.xml".to_string(),
        }
    }

    fn entry(display: &str, tvg_id: &str, tvg_name: &str, line: usize) -> PlaylistEntry {
        PlaylistEntry {
            raw_line: format!(
                "#EXTINF:-1 tvg-id=\"{tvg_id}\" tvg-name=\"{tvg_name}\",{display}\n"
            ),
            display_name: display.to_string(),
            tvg_id: tvg_id.to_string(),
            tvg_name: tvg_name.to_string(),
            line_index: line,
        }
    }

    fn all_tiers() -> TierToggles {
        TierToggles::default()
    }

    #[test]
    fn batch_size_is_clamped() {
        assert_eq!(MatchEngine::batch_size(0, 4), 1);
        assert_eq!(MatchEngine::batch_size(10, 4), 1);
        assert_eq!(MatchEngine::batch_size(1000, 4), 25);
        assert_eq!(MatchEngine::batch_size(100_000, 4), 50);
    }

    #[test]
    fn tvg_id_outranks_every_other_tier() {
        // "Channel A" would also hit exact, normalized and fuzzy tiers for
        // the second guide channel; the identifier still wins.
        let index = GuideIndex::build(vec![
            channel("ida", "Totally Different"),
            channel("idb", "Channel A"),
        ]);
        let result = match_entry(entry("Channel A", "ida", "", 0), &index, &all_tiers(), 0.8);
        assert_eq!(result.tier, Some(MatchTier::TvgId));
        assert_eq!(result.matched_channel.as_deref(), Some("Totally Different"));
    }

    #[test]
    fn tier_order_falls_through() {
        let index = GuideIndex::build(vec![channel("bbc1", "BBC One")]);

        let by_id = match_entry(entry("x", "bbc1", "", 0), &index, &all_tiers(), 0.8);
        assert_eq!(by_id.tier, Some(MatchTier::TvgId));

        let by_name = match_entry(entry("x", "", "bbc1", 0), &index, &all_tiers(), 0.8);
        assert_eq!(by_name.tier, Some(MatchTier::TvgName));

        let by_display = match_entry(entry("BBC One", "", "", 0), &index, &all_tiers(), 0.8);
        assert_eq!(by_display.tier, Some(MatchTier::DisplayName));

        let by_norm = match_entry(entry("BBC ONE HD", "", "", 0), &index, &all_tiers(), 0.8);
        assert_eq!(by_norm.tier, Some(MatchTier::Normalized));
    }

    #[test]
    fn tvg_name_equal_to_another_channels_display_name_does_not_match() {
        // tvg-name only consults identifiers reused as names; a tvg-name
        // that collides with some channel's display name falls through, and
        // the entry's own display name decides the match.
        let index = GuideIndex::build(vec![
            channel("a", "BBC One"),
            channel("b", "Other"),
        ]);
        let result = match_entry(entry("Other", "", "BBC One", 0), &index, &all_tiers(), 0.8);
        assert_eq!(result.tier, Some(MatchTier::DisplayName));
        assert_eq!(result.matched_channel.as_deref(), Some("Other"));
    }

    #[test]
    fn disabled_tiers_are_skipped() {
        let index = GuideIndex::build(vec![channel("bbc1", "BBC One")]);
        let mut tiers = all_tiers();
        tiers.tvg_id = false;

        let result = match_entry(entry("x", "bbc1", "", 0), &index, &tiers, 0.8);
        assert!(!result.is_matched());

        let none = TierToggles {
            tvg_id: false,
            tvg_name: false,
            display_name: false,
            normalized: false,
            fuzzy: false,
        };
        let result = match_entry(entry("BBC One", "bbc1", "bbc1", 0), &index, &none, 0.8);
        assert!(!result.is_matched());
        assert_eq!(result.tier_label(), "unmatched");
    }

    #[test]
    fn fuzzy_respects_the_threshold() {
        // normalize("Cinemax 2") = "cinemax2", normalize("Cinemax") =
        // "cinemax": ratio 14/15, above 0.8 but below 0.95
        let index = GuideIndex::build(vec![channel("cmax", "Cinemax")]);

        let hit = match_entry(entry("Cinemax 2", "", "", 0), &index, &all_tiers(), 0.8);
        assert_eq!(hit.tier, Some(MatchTier::Fuzzy));
        assert_eq!(hit.matched_channel.as_deref(), Some("Cinemax"));

        let miss = match_entry(entry("Cinemax 2", "", "", 0), &index, &all_tiers(), 0.95);
        assert!(!miss.is_matched());
    }

    #[test]
    fn fuzzy_skips_candidates_outside_the_length_window() {
        let long_name = "a very long channel name that keeps going";
        let index = GuideIndex::build(vec![channel("long", long_name)]);
        let result = match_entry(entry("short", "", "", 0), &index, &all_tiers(), 0.1);
        assert!(!result.is_matched());
    }

    #[tokio::test]
    async fn scheduler_preserves_line_indices() {
        let index = Arc::new(GuideIndex::build(vec![channel("bbc1", "BBC One")]));
        let entries: Vec<PlaylistEntry> = (0..137)
            .map(|i| entry(&format!("Channel {i}"), "bbc1", "", i * 2 + 1))
            .collect();
        let engine = MatchEngine::new(
            index,
            MatchOptions {
                tiers: all_tiers(),
                workers: 4,
                fuzzy_threshold: 0.8,
            },
            CancellationToken::new(),
        );

        let outcome = engine.run(entries, |_, _, _| {}).await;
        assert_eq!(outcome.completed, 137);
        assert_eq!(outcome.matched, 137);
        assert!(!outcome.cancelled);
        let indices: Vec<usize> = outcome.results.keys().copied().collect();
        let expected: Vec<usize> = (0..137).map(|i| i * 2 + 1).collect();
        assert_eq!(indices, expected);
    }

    #[tokio::test]
    async fn cancellation_stops_batch_submission() {
        // 120 entries, one worker: batch size 12, ten batches
        let entries: Vec<PlaylistEntry> = (0..120)
            .map(|i| entry(&format!("Channel {i}"), "bbc1", "", i))
            .collect();
        let cancel = CancellationToken::new();
        let engine = MatchEngine::new(
            Arc::new(GuideIndex::build(vec![channel("bbc1", "BBC One")])),
            MatchOptions {
                tiers: all_tiers(),
                workers: 1,
                fuzzy_threshold: 0.8,
            },
            cancel.clone(),
        );

        let cancel_after_first = cancel.clone();
        let outcome = engine
            .run(entries, move |_, _, _| cancel_after_first.cancel())
            .await;

        assert!(outcome.cancelled);
        // Only the single already-dispatched batch completed
        assert_eq!(outcome.completed, 12);
        assert_eq!(outcome.results.len(), 12);
    }

    #[tokio::test]
    async fn pre_cancelled_run_completes_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let engine = MatchEngine::new(
            Arc::new(GuideIndex::build(vec![channel("bbc1", "BBC One")])),
            MatchOptions {
                tiers: all_tiers(),
                workers: 2,
                fuzzy_threshold: 0.8,
            },
            cancel,
        );
        let entries = vec![entry("BBC One", "", "", 0)];
        let outcome = engine.run(entries, |_, _, _| {}).await;
        assert_eq!(outcome.completed, 0);
        assert!(outcome.cancelled);
    }
}
