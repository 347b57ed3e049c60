//! Output reconstruction and reporting
//!
//! Re-emits the original playlist line sequence verbatim, substituting only
//! the lines present in the match-result map, so output line count always
//! equals input line count. Alongside the annotated playlist a CSV
//! statistics table and a text report are written, all timestamped so
//! repeated runs never overwrite each other.

use chrono::Local;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::TierToggles;
use crate::models::{MatchResult, MatchTier, RunSummary};

/// Unmatched names listed in the text report before truncation.
const UNMATCHED_REPORT_CAP: usize = 50;

/// Paths written by a composition pass.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub playlist: PathBuf,
    pub csv: PathBuf,
    pub report: PathBuf,
}

pub struct OutputComposer {
    results_dir: PathBuf,
}

impl OutputComposer {
    pub fn new(results_dir: PathBuf) -> Self {
        Self { results_dir }
    }

    /// Append the matched source label after the display-name segment.
    /// Nothing else on the line is altered; lines whose display name cannot
    /// be located come back unchanged.
    pub fn annotate_line(raw: &str, display_name: &str, source_label: &str) -> String {
        if display_name.is_empty() {
            return raw.to_string();
        }
        match raw.rfind(display_name) {
            Some(pos) => {
                let end = pos + display_name.len();
                format!("{}{} [matched: {}]{}", &raw[..pos], display_name, source_label, &raw[end..])
            }
            None => raw.to_string(),
        }
    }

    /// Rebuild the full line sequence: verbatim everywhere except matched
    /// entry lines, which get the source annotation.
    pub fn compose_playlist(lines: &[String], results: &BTreeMap<usize, MatchResult>) -> Vec<String> {
        lines
            .iter()
            .enumerate()
            .map(|(index, line)| match results.get(&index) {
                Some(result) if result.is_matched() => Self::annotate_line(
                    line,
                    &result.entry.display_name,
                    result.source_label.as_deref().unwrap_or(""),
                ),
                _ => line.clone(),
            })
            .collect()
    }

    /// Per-tier result counts in tier priority order, unmatched last.
    pub fn tier_counts(results: &BTreeMap<usize, MatchResult>) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = MatchTier::ALL
            .iter()
            .map(|tier| (tier.label().to_string(), 0))
            .collect();
        let mut unmatched = 0usize;
        for result in results.values() {
            match result.tier {
                Some(tier) => {
                    let slot = MatchTier::ALL.iter().position(|t| *t == tier).unwrap_or(0);
                    counts[slot].1 += 1;
                }
                None => unmatched += 1,
            }
        }
        counts.push(("unmatched".to_string(), unmatched));
        counts
    }

    /// Write the annotated playlist, CSV statistics and text report.
    /// Partial (cancelled) runs are marked distinctly in the filename.
    pub fn write_all(
        &self,
        playlist_path: &Path,
        lines: &[String],
        results: &BTreeMap<usize, MatchResult>,
        summary: &RunSummary,
        tiers: &TierToggles,
        threshold: f64,
        cancelled: bool,
    ) -> anyhow::Result<OutputPaths> {
        std::fs::create_dir_all(&self.results_dir)?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let stem = playlist_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "playlist".to_string());
        let status = if cancelled { "partial" } else { "matched" };

        let playlist_out = self
            .results_dir
            .join(format!("{stem}_{status}_{timestamp}.m3u"));
        let csv_out = self.results_dir.join(format!("match_stats_{timestamp}.csv"));
        let report_out = self
            .results_dir
            .join(format!("match_report_{timestamp}.txt"));

        let composed = Self::compose_playlist(lines, results);
        std::fs::write(&playlist_out, composed.concat())?;

        std::fs::write(&csv_out, Self::render_csv(results))?;
        std::fs::write(
            &report_out,
            Self::render_report(playlist_path, summary, tiers, threshold, cancelled),
        )?;

        info!(
            "Wrote {} lines to {} ({} + statistics + report)",
            lines.len(),
            playlist_out.display(),
            status
        );

        Ok(OutputPaths {
            playlist: playlist_out,
            csv: csv_out,
            report: report_out,
        })
    }

    /// CSV statistics, one row per entry in line order. UTF-8 BOM so Excel
    /// opens non-ASCII channel names correctly.
    fn render_csv(results: &BTreeMap<usize, MatchResult>) -> String {
        let mut out = String::from("\u{feff}");
        out.push_str("original_name,matched_channel,match_tier,source,tvg_id\n");
        for result in results.values() {
            let row = [
                result.entry.display_name.as_str(),
                result.matched_channel.as_deref().unwrap_or("unmatched"),
                result.tier_label(),
                result.source_label.as_deref().unwrap_or(""),
                result.entry.tvg_id.as_str(),
            ];
            let escaped: Vec<String> = row.iter().map(|f| csv_field(f)).collect();
            out.push_str(&escaped.join(","));
            out.push('\n');
        }
        out
    }

    fn render_report(
        playlist_path: &Path,
        summary: &RunSummary,
        tiers: &TierToggles,
        threshold: f64,
        cancelled: bool,
    ) -> String {
        let mut out = String::new();
        let rule = "=".repeat(70);
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(
            out,
            "EPG matching report{}",
            if cancelled { " (partial run)" } else { "" }
        );
        let _ = writeln!(out, "{rule}\n");

        let _ = writeln!(
            out,
            "Generated: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        let _ = writeln!(
            out,
            "Elapsed: {}",
            humantime::format_duration(std::time::Duration::from_millis(
                summary.elapsed.as_millis() as u64
            ))
        );
        let _ = writeln!(out, "Workers: {}\n", summary.workers);

        let _ = writeln!(out, "Playlist: {}", playlist_path.display());
        let _ = writeln!(out, "Guide sources loaded: {}", summary.sources_loaded);
        let _ = writeln!(out, "Guide channels: {}", summary.guide_channels);
        let _ = writeln!(out, "Total entries: {}", summary.total_entries);
        let _ = writeln!(out, "Matched: {}", summary.matched_entries);
        let _ = writeln!(out, "Match rate: {:.1}%\n", summary.match_rate());

        let _ = writeln!(out, "Enabled tiers:");
        for (label, enabled) in [
            ("tvg-id", tiers.tvg_id),
            ("tvg-name", tiers.tvg_name),
            ("display-name", tiers.display_name),
            ("normalized", tiers.normalized),
            ("fuzzy", tiers.fuzzy),
        ] {
            let _ = writeln!(out, "  [{}] {}", if enabled { "x" } else { " " }, label);
        }
        let _ = writeln!(out, "Fuzzy threshold: {threshold}\n");

        let _ = writeln!(out, "Per-tier counts:");
        for (label, count) in &summary.tier_counts {
            let _ = writeln!(out, "  {label}: {count}");
        }

        if !summary.unmatched_names.is_empty() {
            let _ = writeln!(out, "\n{}", "-".repeat(60));
            let _ = writeln!(
                out,
                "Unmatched channels ({}):",
                summary.unmatched_names.len()
            );
            let _ = writeln!(out, "{}", "-".repeat(60));
            for name in summary.unmatched_names.iter().take(UNMATCHED_REPORT_CAP) {
                let _ = writeln!(out, "{name}");
            }
            if summary.unmatched_names.len() > UNMATCHED_REPORT_CAP {
                let _ = writeln!(
                    out,
                    "... {} more not shown",
                    summary.unmatched_names.len() - UNMATCHED_REPORT_CAP
                );
            }
        }

        out
    }
}

/// Quote a CSV field when it contains a delimiter, quote, or newline.
fn csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GuideChannel, PlaylistEntry};

    fn entry(display: &str, line_index: usize, raw: &str) -> PlaylistEntry {
        PlaylistEntry {
            raw_line: raw.to_string(),
            display_name: display.to_string(),
            tvg_id: String::new(),
            tvg_name: String::new(),
            line_index,
        }
    }

    fn matched(display: &str, line_index: usize, raw: &str) -> MatchResult {
        let channel = GuideChannel {
            guide_id: "id".to_string(),
            display_name: display.to_string(),
            source_label: "guide.xml".to_string(),
        };
        MatchResult::matched(entry(display, line_index, raw), MatchTier::TvgId, &channel)
    }

    #[test]
    fn annotation_appends_after_display_name_only() {
        let raw = "#EXTINF:-1 tvg-id=\"bbc1\",BBC One\n";
        let annotated = OutputComposer::annotate_line(raw, "BBC One", "uk.xml");
        assert_eq!(
            annotated,
            "#EXTINF:-1 tvg-id=\"bbc1\",BBC One [matched: uk.xml]\n"
        );
    }

    #[test]
    fn annotation_targets_the_last_occurrence() {
        // Name also appears in an attribute; only the trailing segment moves
        let raw = "#EXTINF:-1 tvg-name=\"ESPN\",ESPN\n";
        let annotated = OutputComposer::annotate_line(raw, "ESPN", "us.xml");
        assert_eq!(
            annotated,
            "#EXTINF:-1 tvg-name=\"ESPN\",ESPN [matched: us.xml]\n"
        );
    }

    #[test]
    fn line_count_is_always_preserved() {
        let lines: Vec<String> = vec![
            "#EXTM3U\n".into(),
            "#EXTINF:-1,BBC One\n".into(),
            "http://example.com/1\n".into(),
            "#EXTINF:-1,Unknown\n".into(),
            "http://example.com/2\n".into(),
        ];
        let mut results = BTreeMap::new();
        results.insert(1, matched("BBC One", 1, &lines[1]));
        results.insert(
            3,
            MatchResult::unmatched(entry("Unknown", 3, &lines[3])),
        );

        let composed = OutputComposer::compose_playlist(&lines, &results);
        assert_eq!(composed.len(), lines.len());
        assert!(composed[1].contains("[matched: guide.xml]"));
        assert_eq!(composed[0], lines[0]);
        assert_eq!(composed[3], lines[3]);
        assert_eq!(composed[4], lines[4]);
    }

    #[test]
    fn csv_escapes_delimiters_and_quotes() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn tier_counts_cover_all_tiers_plus_unmatched() {
        let mut results = BTreeMap::new();
        results.insert(0, matched("A", 0, "#EXTINF:-1,A\n"));
        results.insert(
            1,
            MatchResult::unmatched(entry("B", 1, "#EXTINF:-1,B\n")),
        );

        let counts = OutputComposer::tier_counts(&results);
        assert_eq!(counts.len(), MatchTier::ALL.len() + 1);
        assert_eq!(counts[0], ("tvg-id match".to_string(), 1));
        assert_eq!(counts.last().unwrap(), &("unmatched".to_string(), 1));
    }

    #[test]
    fn write_all_emits_three_timestamped_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let composer = OutputComposer::new(tmp.path().to_path_buf());
        let lines: Vec<String> = vec!["#EXTM3U\n".into(), "#EXTINF:-1,BBC One\n".into()];
        let mut results = BTreeMap::new();
        results.insert(1, matched("BBC One", 1, &lines[1]));

        let summary = RunSummary {
            total_entries: 1,
            completed_entries: 1,
            matched_entries: 1,
            tier_counts: OutputComposer::tier_counts(&results),
            ..Default::default()
        };

        let paths = composer
            .write_all(
                Path::new("input.m3u"),
                &lines,
                &results,
                &summary,
                &TierToggles::default(),
                0.8,
                false,
            )
            .unwrap();

        assert!(paths.playlist.exists());
        assert!(paths.csv.exists());
        assert!(paths.report.exists());
        let name = paths.playlist.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("input_matched_"));

        let written = std::fs::read_to_string(&paths.playlist).unwrap();
        assert_eq!(written.lines().count(), 2);

        let csv = std::fs::read_to_string(&paths.csv).unwrap();
        assert!(csv.starts_with('\u{feff}'));
        assert!(csv.contains("BBC One"));
    }

    #[test]
    fn partial_runs_are_marked_in_the_filename() {
        let tmp = tempfile::TempDir::new().unwrap();
        let composer = OutputComposer::new(tmp.path().to_path_buf());
        let paths = composer
            .write_all(
                Path::new("input.m3u"),
                &["#EXTM3U\n".to_string()],
                &BTreeMap::new(),
                &RunSummary::default(),
                &TierToggles::default(),
                0.8,
                true,
            )
            .unwrap();
        let name = paths.playlist.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("input_partial_"));
    }
}
