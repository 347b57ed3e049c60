//! Lookup index over loaded guide channels
//!
//! Built once per run, then shared read-only across the worker pool. Four
//! O(1) maps back the exact tiers; the full channel list (with precomputed
//! normalized names) backs the fuzzy scan.

use std::collections::HashMap;

use crate::matching::normalize_name;
use crate::models::GuideChannel;

/// A guide channel plus its precomputed normalized name, for the fuzzy scan.
#[derive(Debug, Clone)]
pub struct IndexedChannel {
    pub channel: GuideChannel,
    pub normalized_name: String,
}

#[derive(Debug, Default)]
pub struct GuideIndex {
    by_id: HashMap<String, GuideChannel>,
    /// Identifier doubles as a secondary name key; some sources reuse it in
    /// the playlist's tvg-name attribute.
    by_id_as_name: HashMap<String, GuideChannel>,
    by_display_name: HashMap<String, GuideChannel>,
    by_normalized_name: HashMap<String, GuideChannel>,
    all_channels: Vec<IndexedChannel>,
}

impl GuideIndex {
    /// Build the index. Channels with an empty identifier or empty name are
    /// kept only in the fallback list. Colliding keys are last-write-wins,
    /// so determinism follows the (stable) source supply order.
    pub fn build(channels: Vec<GuideChannel>) -> Self {
        let mut index = Self::default();

        for channel in channels {
            let normalized = normalize_name(&channel.display_name);

            if !channel.guide_id.is_empty() && !channel.display_name.is_empty() {
                index
                    .by_id
                    .insert(channel.guide_id.clone(), channel.clone());
                index
                    .by_id_as_name
                    .insert(channel.guide_id.clone(), channel.clone());
                index
                    .by_display_name
                    .insert(channel.display_name.clone(), channel.clone());
                if !normalized.is_empty() {
                    index
                        .by_normalized_name
                        .insert(normalized.clone(), channel.clone());
                }
            }

            index.all_channels.push(IndexedChannel {
                channel,
                normalized_name: normalized,
            });
        }

        index
    }

    pub fn by_id(&self, id: &str) -> Option<&GuideChannel> {
        self.by_id.get(id)
    }

    /// Lookup for the tvg-name tier: identifiers reused as names only.
    /// A tvg-name that happens to equal some channel's display name must
    /// not match here; the display-name tier resolves the entry's own name.
    pub fn by_secondary_name(&self, name: &str) -> Option<&GuideChannel> {
        self.by_id_as_name.get(name)
    }

    pub fn by_display_name(&self, name: &str) -> Option<&GuideChannel> {
        self.by_display_name.get(name)
    }

    pub fn by_normalized_name(&self, normalized: &str) -> Option<&GuideChannel> {
        self.by_normalized_name.get(normalized)
    }

    pub fn all_channels(&self) -> &[IndexedChannel] {
        &self.all_channels
    }

    pub fn id_count(&self) -> usize {
        self.by_id.len()
    }

    pub fn channel_count(&self) -> usize {
        self.all_channels.len()
    }
}
