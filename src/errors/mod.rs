//! Error type definitions for the EPG matcher
//!
//! Errors are split by layer: source acquisition/parsing, cache storage, and
//! run-state violations at the service boundary. Entry-level match failures
//! are never errors; an entry that cannot be classified is simply unmatched.

use thiserror::Error;

/// Top-level error type for the matcher library
#[derive(Error, Debug)]
pub enum MatcherError {
    /// Guide source acquisition or parsing errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Cache storage errors
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Run lifecycle violations
    #[error("Run error: {0}")]
    Run(#[from] RunError),

    /// Playlist file I/O
    #[error("Playlist error: {path} - {source}")]
    Playlist {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Guide source handling errors
///
/// These are per-source and recoverable: the run logs them, skips the source,
/// and continues. They become fatal only when zero guide channels load across
/// all sources.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Network fetch failures (connection, timeout, TLS)
    #[error("Fetch failed: {url} - {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx response from a remote source
    #[error("HTTP error: {url} - status {status}")]
    HttpStatus { url: String, status: u16 },

    /// Gzip decompression failures
    #[error("Decompression failed: {label} - {message}")]
    Decompress { label: String, message: String },

    /// Malformed XMLTV content
    #[error("Parse error: {label} - {message}")]
    Parse { label: String, message: String },

    /// Local source file I/O
    #[error("Read failed: {path} - {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// No guide channels loaded from any source
    #[error("No guide channels loaded from {attempted} source(s)")]
    NoChannels { attempted: usize },
}

/// Cache storage errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Filesystem failures in the cache directory
    #[error("Cache I/O: {path} - {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// URL that cannot be turned into a cache key
    #[error("Invalid source URL: {url}")]
    InvalidUrl { url: String },
}

/// Run lifecycle errors at the service boundary
#[derive(Error, Debug)]
pub enum RunError {
    /// A matching run is already in flight
    #[error("A matching run is already active")]
    AlreadyRunning,

    /// No playlist has been loaded yet
    #[error("No playlist loaded")]
    NoPlaylist,

    /// Every matching tier has been disabled
    #[error("At least one matching tier must be enabled")]
    NoTiersEnabled,
}

impl SourceError {
    pub fn parse<L: Into<String>, M: Into<String>>(label: L, message: M) -> Self {
        Self::Parse {
            label: label.into(),
            message: message.into(),
        }
    }

    pub fn decompress<L: Into<String>, M: Into<String>>(label: L, message: M) -> Self {
        Self::Decompress {
            label: label.into(),
            message: message.into(),
        }
    }
}

impl CacheError {
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
