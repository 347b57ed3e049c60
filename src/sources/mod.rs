//! Guide source acquisition and XMLTV channel extraction
//!
//! Sources are local files or http(s) URLs; URLs go through the disk cache.
//! Payloads may be gzip-compressed regardless of filename, so compression is
//! detected from the magic bytes rather than the extension. Only `<channel>`
//! elements are extracted; programme data is skipped entirely.
//!
//! A failing source is logged and skipped so one bad URL cannot ruin a run.
//! The load becomes an error only when no source yields any channels.

use flate2::read::GzDecoder;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::errors::{MatcherError, SourceError};
use crate::models::{GuideChannel, GuideSource};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub struct SourceLoader {
    cache: CacheStore,
}

/// Everything loaded across a set of sources.
#[derive(Debug)]
pub struct LoadedGuide {
    pub channels: Vec<GuideChannel>,
    /// Number of sources that yielded at least one channel
    pub sources_loaded: usize,
}

impl SourceLoader {
    pub fn new(cache: CacheStore) -> Self {
        Self { cache }
    }

    /// Load all sources, skipping failures. Errors only when nothing loads.
    pub async fn load_all(&self, sources: &[GuideSource]) -> Result<LoadedGuide, MatcherError> {
        let mut channels = Vec::new();
        let mut sources_loaded = 0usize;

        for source in sources {
            match self.load_source(source).await {
                Ok(mut loaded) if !loaded.is_empty() => {
                    info!(
                        "Loaded {} channels from {}",
                        loaded.len(),
                        source.describe()
                    );
                    channels.append(&mut loaded);
                    sources_loaded += 1;
                }
                Ok(_) => warn!("No channels found in {}", source.describe()),
                Err(e) => warn!("Skipping source {}: {}", source.describe(), e),
            }
        }

        if channels.is_empty() {
            return Err(SourceError::NoChannels {
                attempted: sources.len(),
            }
            .into());
        }
        Ok(LoadedGuide {
            channels,
            sources_loaded,
        })
    }

    /// Load one source into guide channels.
    pub async fn load_source(&self, source: &GuideSource) -> Result<Vec<GuideChannel>, MatcherError> {
        let (bytes, label) = match source {
            GuideSource::File(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| SourceError::Read {
                        path: path.display().to_string(),
                        source: e,
                    })?;
                (bytes, source_label(path))
            }
            GuideSource::Url(url) => {
                let outcome = self.cache.acquire(url).await?;
                debug!(
                    "Source {} resolved to {} (cached: {})",
                    url,
                    outcome.path.display(),
                    outcome.was_cached
                );
                let bytes = tokio::fs::read(&outcome.path)
                    .await
                    .map_err(|e| SourceError::Read {
                        path: outcome.path.display().to_string(),
                        source: e,
                    })?;
                (bytes, source_label(&outcome.path))
            }
        };

        let bytes = decompress_if_gzip(bytes, &label)?;
        Ok(parse_channels(&bytes, &label)?)
    }
}

/// Source label used in annotations and reports: the file's base name.
fn source_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Transparently unwrap gzip payloads, detected by magic bytes.
fn decompress_if_gzip(bytes: Vec<u8>, label: &str) -> Result<Vec<u8>, SourceError> {
    if !bytes.starts_with(&GZIP_MAGIC) {
        return Ok(bytes);
    }
    let mut decoder = GzDecoder::new(bytes.as_slice());
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| SourceError::decompress(label, e.to_string()))?;
    debug!(
        "Decompressed {} from {} to {} bytes",
        label,
        bytes.len(),
        decoded.len()
    );
    Ok(decoded)
}

/// Streaming XMLTV parse: collect `<channel id>` / first `<display-name>`
/// pairs, skip everything else (notably the programme bulk).
fn parse_channels(bytes: &[u8], label: &str) -> Result<Vec<GuideChannel>, SourceError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut channels = Vec::new();
    let mut buf = Vec::new();

    let mut current_id: Option<String> = None;
    let mut current_name: Option<String> = None;
    let mut in_display_name = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"channel" => {
                    let id = e
                        .try_get_attribute("id")
                        .map_err(|err| SourceError::parse(label, err.to_string()))?
                        .map(|attr| {
                            attr.unescape_value()
                                .map(|v| v.into_owned())
                                .map_err(|err| SourceError::parse(label, err.to_string()))
                        })
                        .transpose()?
                        .unwrap_or_default();
                    current_id = Some(id);
                    current_name = None;
                }
                b"display-name" if current_id.is_some() => {
                    in_display_name = true;
                }
                _ => {}
            },
            Ok(Event::Text(ref e)) if in_display_name => {
                // First display-name wins; later ones are alternates
                if current_name.is_none() {
                    let text = e
                        .unescape()
                        .map_err(|err| SourceError::parse(label, err.to_string()))?;
                    let text = text.trim();
                    if !text.is_empty() {
                        current_name = Some(text.to_string());
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"display-name" => in_display_name = false,
                b"channel" => {
                    if let Some(id) = current_id.take() {
                        let display_name = current_name.take().unwrap_or_default();
                        if !id.is_empty() || !display_name.is_empty() {
                            channels.push(GuideChannel {
                                guide_id: id,
                                display_name,
                                source_label: label.to_string(),
                            });
                        }
                    }
                    in_display_name = false;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(SourceError::parse(label, e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(channels)
}
