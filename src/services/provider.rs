//! Provider contract and host registry
//!
//! Each upstream (Xumo, Stirr) implements [`ChannelSource`]. Both operations
//! return lazy streams: no upstream request is made until the caller polls,
//! and a caller that stops early never triggers fetches for channels it did
//! not reach.

use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;

use crate::models::{Channel, Guide, GuideWindow, ProviderInfo};
use crate::services::feed::FeedError;

/// Lazy, single-pass channel listing keyed by `Channel::id`. An `Err` item is
/// a fatal setup failure and is always the last item.
pub type ChannelStream = BoxStream<'static, Result<Channel, ProviderError>>;

/// Provider errors that reach the caller.
///
/// Per-channel failures never show up here: those channels are skipped and
/// logged inside the provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Required session parameters or configuration could not be resolved
    #[error("{provider} setup failed: {reason}")]
    Setup { provider: &'static str, reason: String },
    /// A feed the whole listing depends on failed
    #[error("upstream feed failed: {0}")]
    Feed(#[from] FeedError),
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

impl ProviderError {
    pub fn setup(provider: &'static str, reason: impl Into<String>) -> Self {
        ProviderError::Setup {
            provider,
            reason: reason.into(),
        }
    }
}

/// Capability shared by every upstream provider
pub trait ChannelSource: Send + Sync {
    /// Registration record for the host registry
    fn info(&self) -> ProviderInfo;

    /// Channels the provider can currently play
    fn channels(&self) -> ChannelStream;

    /// Guide covering `window`; building it performs no I/O
    fn guide(&self, window: GuideWindow) -> Guide;
}

/// Providers registered at startup, in registration order
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn ChannelSource>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider; a later registration with the same key replaces it
    pub fn register(&mut self, provider: Arc<dyn ChannelSource>) {
        let key = provider.info().key;
        self.providers.retain(|p| p.info().key != key);
        tracing::info!(provider = key, "Registered channel source provider");
        self.providers.push(provider);
    }

    pub fn get(&self, key: &str) -> Result<Arc<dyn ChannelSource>, ProviderError> {
        self.providers
            .iter()
            .find(|p| p.info().key == key)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(key.to_string()))
    }

    pub fn infos(&self) -> Vec<ProviderInfo> {
        self.providers.iter().map(|p| p.info()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Drain a channel stream, keeping the first channel seen for each id
pub async fn collect_channels(mut channels: ChannelStream) -> Result<Vec<Channel>, ProviderError> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    while let Some(channel) = channels.next().await {
        let channel = channel?;
        if seen.insert(channel.id.clone()) {
            out.push(channel);
        }
    }

    Ok(out)
}
