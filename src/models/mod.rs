//! Core data model shared across the matcher
//!
//! Everything here is plain data: guide channels loaded from XMLTV sources,
//! parsed playlist entries keyed by their original line index, and the match
//! results/report rows the engine produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// One channel loaded from an EPG source. Immutable after load.
#[derive(Debug, Clone, PartialEq)]
pub struct GuideChannel {
    /// Channel identifier from the XMLTV `id` attribute (may be empty)
    pub guide_id: String,
    /// Display name from the `display-name` element
    pub display_name: String,
    /// Label of the source file this channel came from
    pub source_label: String,
}

/// A guide source to load: either a local file or an http(s) URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuideSource {
    File(PathBuf),
    Url(String),
}

/// Classify a raw user-supplied source string. Anything that is not an
/// http(s) URL is a local path, so parsing cannot fail.
impl std::str::FromStr for GuideSource {
    type Err = std::convert::Infallible;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Ok(if raw.starts_with("http://") || raw.starts_with("https://") {
            Self::Url(raw.to_string())
        } else {
            Self::File(PathBuf::from(raw))
        })
    }
}

impl GuideSource {
    pub fn describe(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Url(url) => url.clone(),
        }
    }
}

/// One channel record parsed out of the playlist.
///
/// `line_index` is the join key back into the untouched playlist line
/// sequence; non-entry lines (headers, player directives, stream URLs) are
/// interleaved and must be re-emitted at their original positions.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistEntry {
    /// Original raw line, verbatim, including trailing newline
    pub raw_line: String,
    /// Free-text display name after the final comma
    pub display_name: String,
    /// `tvg-id` attribute, empty when absent
    pub tvg_id: String,
    /// `tvg-name` attribute, empty when absent
    pub tvg_name: String,
    /// Zero-based index into the original line sequence
    pub line_index: usize,
}

/// The matching tier that resolved an entry, in fixed priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchTier {
    TvgId,
    TvgName,
    DisplayName,
    Normalized,
    Fuzzy,
}

impl MatchTier {
    pub const ALL: [MatchTier; 5] = [
        MatchTier::TvgId,
        MatchTier::TvgName,
        MatchTier::DisplayName,
        MatchTier::Normalized,
        MatchTier::Fuzzy,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MatchTier::TvgId => "tvg-id match",
            MatchTier::TvgName => "tvg-name match",
            MatchTier::DisplayName => "display-name match",
            MatchTier::Normalized => "normalized match",
            MatchTier::Fuzzy => "fuzzy match",
        }
    }
}

/// Result of matching a single playlist entry. Produced exactly once per
/// entry, immutable once created.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub entry: PlaylistEntry,
    pub tier: Option<MatchTier>,
    /// Display name of the matched guide channel
    pub matched_channel: Option<String>,
    /// Source label of the matched guide channel
    pub source_label: Option<String>,
}

impl MatchResult {
    pub fn matched(entry: PlaylistEntry, tier: MatchTier, channel: &GuideChannel) -> Self {
        Self {
            entry,
            tier: Some(tier),
            matched_channel: Some(channel.display_name.clone()),
            source_label: Some(channel.source_label.clone()),
        }
    }

    pub fn unmatched(entry: PlaylistEntry) -> Self {
        Self {
            entry,
            tier: None,
            matched_channel: None,
            source_label: None,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.tier.is_some()
    }

    pub fn tier_label(&self) -> &'static str {
        self.tier.map(|t| t.label()).unwrap_or("unmatched")
    }
}

/// Advisory progress sample emitted as batches complete.
#[derive(Debug, Clone)]
pub struct ProgressSample {
    pub completed: usize,
    pub total: usize,
    pub percentage: f64,
    /// Entries per second, once enough samples accumulated
    pub speed: Option<f64>,
    pub remaining: Option<Duration>,
    pub eta: Option<DateTime<Utc>>,
}

/// Severity of a user-facing run log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
    Match,
    Unmatched,
}

/// Typed event stream consumed by a single subscriber loop (CLI or UI).
#[derive(Debug, Clone)]
pub enum RunEvent {
    Log(LogLevel, String),
    Progress(ProgressSample),
    Done(RunOutcome),
}

/// Terminal state of a matching run.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(RunSummary),
    Cancelled(RunSummary),
    Failed(String),
}

/// Aggregate statistics for a finished (or cancelled) run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub total_entries: usize,
    pub completed_entries: usize,
    pub matched_entries: usize,
    pub guide_channels: usize,
    pub sources_loaded: usize,
    pub elapsed: Duration,
    pub workers: usize,
    /// (tier label, count) in tier priority order, unmatched last
    pub tier_counts: Vec<(String, usize)>,
    pub unmatched_names: Vec<String>,
    /// Paths written by the output composer
    pub playlist_path: Option<PathBuf>,
    pub csv_path: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
}

impl RunSummary {
    pub fn match_rate(&self) -> f64 {
        if self.total_entries == 0 {
            0.0
        } else {
            self.matched_entries as f64 / self.total_entries as f64 * 100.0
        }
    }
}

/// One cache directory entry, for maintenance listings.
#[derive(Debug, Clone)]
pub struct CacheEntryInfo {
    pub file_name: String,
    pub size_bytes: u64,
    pub age: Duration,
    pub expired: bool,
}
