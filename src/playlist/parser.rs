//! M3U playlist parsing
//!
//! A single pass over the raw line sequence. `#EXTINF` lines become
//! [`PlaylistEntry`] records; every line, entry or not, is retained verbatim
//! at its original index so the output composer can re-emit the file
//! byte-for-byte around the annotated entries. Player directives
//! (`#KODIPROP`, `#EXTVLCOPT`), stream URLs and blank lines all pass through
//! untouched.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

use crate::errors::MatcherError;
use crate::models::PlaylistEntry;

fn tvg_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"tvg-id="([^"]*)""#).unwrap())
}

fn tvg_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"tvg-name="([^"]*)""#).unwrap())
}

/// A loaded playlist: the verbatim line sequence plus the channel entries
/// parsed out of it.
#[derive(Debug, Clone)]
pub struct Playlist {
    pub path: PathBuf,
    /// Every original line, with its trailing newline where present
    pub lines: Vec<String>,
    pub entries: Vec<PlaylistEntry>,
}

impl Playlist {
    /// Read a playlist file (lossy UTF-8, like the sources it comes from).
    pub fn load(path: &Path) -> Result<Self, MatcherError> {
        let bytes = std::fs::read(path).map_err(|e| MatcherError::Playlist {
            path: path.display().to_string(),
            source: e,
        })?;
        let content = String::from_utf8_lossy(&bytes);
        let playlist = Self::parse(path, &content);
        debug!(
            "Loaded playlist {} ({} lines, {} entries)",
            path.display(),
            playlist.lines.len(),
            playlist.entries.len()
        );
        Ok(playlist)
    }

    /// Parse playlist text, splitting into newline-preserving lines.
    pub fn parse(path: &Path, content: &str) -> Self {
        let lines = split_keep_newlines(content);
        let entries = lines
            .iter()
            .enumerate()
            .filter_map(|(index, line)| parse_entry(line, index))
            .collect();
        Self {
            path: path.to_path_buf(),
            lines,
            entries,
        }
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

/// Split text into lines that keep their own trailing `\n` (and `\r\n`),
/// so concatenating them reproduces the input exactly.
fn split_keep_newlines(content: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, b) in content.bytes().enumerate() {
        if b == b'\n' {
            lines.push(content[start..=i].to_string());
            start = i + 1;
        }
    }
    if start < content.len() {
        lines.push(content[start..].to_string());
    }
    lines
}

/// Parse one line as a channel entry, or `None` for pass-through lines.
/// Missing attributes default to empty strings; parsing never aborts.
fn parse_entry(line: &str, index: usize) -> Option<PlaylistEntry> {
    if !line.starts_with("#EXTINF") {
        return None;
    }

    let tvg_id = tvg_id_pattern()
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let tvg_name = tvg_name_pattern()
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    // Display name is the free text after the final comma
    let display_name = line
        .rsplit_once(',')
        .map(|(_, name)| name.trim().to_string())
        .unwrap_or_default();

    Some(PlaylistEntry {
        raw_line: line.to_string(),
        display_name,
        tvg_id,
        tvg_name,
        line_index: index,
    })
}
