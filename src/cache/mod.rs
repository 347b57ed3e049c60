//! Disk-backed cache for remotely fetched guide sources
//!
//! Entries are keyed by a filename derived from the source URL. An entry
//! older than the TTL is treated as absent and refetched. Before any fetch
//! the aggregate directory size is checked against a high-water mark and the
//! oldest entries (by mtime) are evicted down to a low-water mark.
//!
//! The store is an explicit, injectable instance with configurable root, TTL
//! and size thresholds so tests can run against a temporary directory.

use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::CacheConfig;
use crate::errors::{CacheError, MatcherError, SourceError};
use crate::models::CacheEntryInfo;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Result of acquiring a source through the cache.
#[derive(Debug, Clone)]
pub struct CacheOutcome {
    pub path: PathBuf,
    pub was_cached: bool,
    pub size_bytes: u64,
}

#[derive(Clone)]
pub struct CacheStore {
    dir: PathBuf,
    ttl: Duration,
    high_water_bytes: u64,
    low_water_bytes: u64,
    client: reqwest::Client,
}

impl CacheStore {
    pub fn new(config: &CacheConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .user_agent(concat!("epg-matcher/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            dir: config.dir.clone(),
            ttl: Duration::from_secs(config.ttl_hours * 3600),
            high_water_bytes: config.high_water_mb * BYTES_PER_MB,
            low_water_bytes: config.low_water_mb * BYTES_PER_MB,
            client,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Derive the cache filename for a URL: last non-empty path segment,
    /// query stripped, unsafe characters replaced.
    pub fn cache_file_name(url: &str) -> Result<String, CacheError> {
        let parsed = Url::parse(url).map_err(|_| CacheError::InvalidUrl {
            url: url.to_string(),
        })?;
        let segment = parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .unwrap_or("guide.xml");
        let sanitized: String = segment
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if sanitized.is_empty() {
            return Err(CacheError::InvalidUrl {
                url: url.to_string(),
            });
        }
        Ok(sanitized)
    }

    /// Fetch a URL through the cache.
    ///
    /// A fresh entry is returned without network access. An expired entry is
    /// deleted first and the URL refetched. Eviction runs before any fetch.
    pub async fn acquire(&self, url: &str) -> Result<CacheOutcome, MatcherError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CacheError::io(&self.dir, e))?;

        let file_name = Self::cache_file_name(url)?;
        let local_path = self.dir.join(&file_name);

        if let Ok(metadata) = fs::metadata(&local_path).await {
            let age = Self::entry_age(&metadata);
            if age < self.ttl {
                debug!(
                    "Cache hit for {} ({} bytes, age {:?})",
                    url,
                    metadata.len(),
                    age
                );
                return Ok(CacheOutcome {
                    path: local_path,
                    was_cached: true,
                    size_bytes: metadata.len(),
                });
            }
            debug!("Cache entry for {} expired (age {:?}), refetching", url, age);
            fs::remove_file(&local_path)
                .await
                .map_err(|e| CacheError::io(&local_path, e))?;
        }

        let total = self.total_size().await?;
        if total > self.high_water_bytes {
            let freed = self.evict_to_low_water().await?;
            info!(
                "Cache eviction freed {:.1} MB (was {:.1} MB)",
                freed as f64 / BYTES_PER_MB as f64,
                total as f64 / BYTES_PER_MB as f64
            );
        }

        let size = self.fetch_to_disk(url, &local_path).await?;
        Ok(CacheOutcome {
            path: local_path,
            was_cached: false,
            size_bytes: size,
        })
    }

    /// Stream a URL to disk via a temp file, renamed into place on success.
    async fn fetch_to_disk(&self, url: &str, dest: &Path) -> Result<u64, MatcherError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::Fetch {
                url: url.to_string(),
                source: e,
            })?;

        if !response.status().is_success() {
            return Err(SourceError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            }
            .into());
        }

        let part_path = dest.with_file_name(format!(
            "{}.part",
            dest.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "download".to_string())
        ));

        let mut file = fs::File::create(&part_path)
            .await
            .map_err(|e| CacheError::io(&part_path, e))?;

        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| SourceError::Fetch {
                url: url.to_string(),
                source: e,
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|e| CacheError::io(&part_path, e))?;
            downloaded += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| CacheError::io(&part_path, e))?;
        drop(file);

        fs::rename(&part_path, dest)
            .await
            .map_err(|e| CacheError::io(dest, e))?;

        info!("Downloaded {} ({} bytes)", url, downloaded);
        Ok(downloaded)
    }

    /// Total size of all cache entries in bytes.
    pub async fn total_size(&self) -> Result<u64, CacheError> {
        let mut total = 0u64;
        for (_, metadata) in self.scan_entries().await? {
            total += metadata.len();
        }
        Ok(total)
    }

    /// List cache entries with size, age, and expiry status.
    pub async fn list_entries(&self) -> Result<Vec<CacheEntryInfo>, CacheError> {
        let mut entries = Vec::new();
        for (path, metadata) in self.scan_entries().await? {
            let age = Self::entry_age(&metadata);
            entries.push(CacheEntryInfo {
                file_name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                size_bytes: metadata.len(),
                age,
                expired: age >= self.ttl,
            });
        }
        entries.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(entries)
    }

    /// Delete every cache entry; returns bytes freed.
    pub async fn clear(&self) -> Result<u64, CacheError> {
        let mut freed = 0u64;
        for (path, metadata) in self.scan_entries().await? {
            fs::remove_file(&path)
                .await
                .map_err(|e| CacheError::io(&path, e))?;
            freed += metadata.len();
        }
        info!(
            "Cache cleared, {:.2} MB freed",
            freed as f64 / BYTES_PER_MB as f64
        );
        Ok(freed)
    }

    /// Delete only expired entries; returns (count, bytes freed).
    pub async fn delete_expired(&self) -> Result<(usize, u64), CacheError> {
        let mut count = 0usize;
        let mut freed = 0u64;
        for (path, metadata) in self.scan_entries().await? {
            if Self::entry_age(&metadata) >= self.ttl {
                fs::remove_file(&path)
                    .await
                    .map_err(|e| CacheError::io(&path, e))?;
                count += 1;
                freed += metadata.len();
            }
        }
        Ok((count, freed))
    }

    /// Evict oldest entries (by mtime) until the directory is at or below
    /// the low-water mark; returns bytes freed.
    pub async fn evict_to_low_water(&self) -> Result<u64, CacheError> {
        let mut entries = self.scan_entries().await?;
        entries.sort_by_key(|(_, metadata)| {
            metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH)
        });

        let mut remaining: u64 = entries.iter().map(|(_, m)| m.len()).sum();
        let mut freed = 0u64;
        for (path, metadata) in entries {
            if remaining <= self.low_water_bytes {
                break;
            }
            match fs::remove_file(&path).await {
                Ok(()) => {
                    remaining -= metadata.len();
                    freed += metadata.len();
                    debug!("Evicted cache entry {}", path.display());
                }
                Err(e) => warn!("Failed to evict {}: {}", path.display(), e),
            }
        }
        Ok(freed)
    }

    /// Flat scan of the cache directory, skipping in-progress `.part` files.
    async fn scan_entries(&self) -> Result<Vec<(PathBuf, std::fs::Metadata)>, CacheError> {
        let mut found = Vec::new();
        let mut reader = match fs::read_dir(&self.dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(CacheError::io(&self.dir, e)),
        };
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "part") {
                continue;
            }
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| CacheError::io(&path, e))?;
            if metadata.is_file() {
                found.push((path, metadata));
            }
        }
        Ok(found)
    }

    fn entry_age(metadata: &std::fs::Metadata) -> Duration {
        metadata
            .modified()
            .ok()
            .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
            .unwrap_or(Duration::ZERO)
    }
}
