//! Stirr provider
//!
//! Channels are discovered across lineups; the guide comes from the
//! per-channel programme feeds.

pub mod catalog;
pub mod client;
pub mod guide;
pub mod types;

pub use client::{StirrClient, StirrSettings};

use crate::models::{Guide, GuideWindow, ProviderInfo};
use crate::services::provider::{ChannelSource, ChannelStream};

pub const PROVIDER_KEY: &str = "stirr";

/// Lineup used when none is configured; its channels are pinned first
pub const DEFAULT_LINEUP: &str = "national";

pub struct StirrProvider {
    client: StirrClient,
    lineups: Vec<String>,
    concurrency: usize,
}

impl StirrProvider {
    pub fn new(client: StirrClient, lineups: Vec<String>, concurrency: usize) -> Self {
        Self {
            client,
            lineups,
            concurrency: concurrency.max(1),
        }
    }
}

impl ChannelSource for StirrProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            key: PROVIDER_KEY,
            display_name: "Stirr",
            supports_channels: true,
            supports_guide: true,
            channel_cache_ttl: 86_400,
            guide_cache_ttl: 21_600,
        }
    }

    fn channels(&self) -> ChannelStream {
        catalog::list_channels(self.client.clone(), self.lineups.clone(), self.concurrency)
    }

    fn guide(&self, window: GuideWindow) -> Guide {
        guide::build_guide(self.client.clone(), self.channels(), window, self.concurrency)
    }
}
