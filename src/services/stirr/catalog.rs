//! Stirr channel listing
//!
//! Lineups are the configured names plus every station the auto-selection
//! page advertises. Channels are walked lineup by lineup; a channel id seen in
//! an earlier lineup is not fetched again. Each surviving channel costs one
//! status request and one media request, run on a bounded pool.

use async_stream::stream;
use futures::{Stream, StreamExt};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::client::StirrClient;
use super::types::{LineupChannel, Thumbnail};
use super::{DEFAULT_LINEUP, PROVIDER_KEY};
use crate::models::Channel;
use crate::services::feed::FeedError;
use crate::services::metrics;
use crate::services::provider::ChannelStream;

/// Status titles starting with this mark retired placeholder channels
pub const PLACEHOLDER_PREFIX: &str = "[X]";

pub const DEFAULT_ART: &str = "https://stirr.com/stirr-logo-1920x1080.png";

/// Sort prefix pinning the distinguished lineup first
const PINNED_SORT_PREFIX: &str = "0000 ";

const SORT_COUNTER_BASE: u32 = 1000;

/// Per-listing sort key assignment.
///
/// Channels of the distinguished lineup sort by title behind a fixed prefix;
/// everything else gets the next counter value, so the order follows
/// traversal order.
#[derive(Debug)]
pub struct SortKeys {
    next: u32,
}

impl Default for SortKeys {
    fn default() -> Self {
        Self { next: SORT_COUNTER_BASE }
    }
}

impl SortKeys {
    pub fn assign(&mut self, lineup: &str, title: &str) -> String {
        if lineup == DEFAULT_LINEUP {
            return format!("{}{}", PINNED_SORT_PREFIX, title);
        }
        let key = self.next.to_string();
        self.next += 1;
        key
    }
}

/// Pick channel art from media thumbnails.
///
/// Candidates are square or 1920 wide and not EPG artwork. The narrowest
/// wins, then the tallest among equals.
pub fn select_art(thumbnails: &[Thumbnail]) -> String {
    thumbnails
        .iter()
        .filter_map(|thumb| {
            let (width, height) = (thumb.width()?, thumb.height()?);
            let qualifies = (width == height || width == 1920) && !thumb.url.contains("epg");
            qualifies.then(|| (width, height, rewrite_art_url(&thumb.url)))
        })
        .min_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
        .map(|(_, _, url)| url)
        .unwrap_or_else(|| DEFAULT_ART.to_string())
}

/// Force https and ask for the original rendition instead of the thumbnail
fn rewrite_art_url(url: &str) -> String {
    let url = match url.strip_prefix("http://") {
        Some(rest) => format!("https://{}", rest),
        None => url.to_string(),
    };
    url.replace("/thumb/", "/original/")
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Fetch status and media for one channel and build it without a sort key.
///
/// Returns `None` when the channel is skipped.
pub async fn build_channel(client: &StirrClient, entry: &LineupChannel) -> Option<Channel> {
    let status = match client.fetch_status(&entry.id).await {
        Ok(status) => status,
        Err(e) => {
            warn!(provider = PROVIDER_KEY, channel = %entry.id, "Skipping channel, status fetch failed: {}", e);
            metrics::record_skip(PROVIDER_KEY, "status");
            return None;
        }
    };

    let status_title = status.channel().title.as_deref().unwrap_or_default();
    if status_title.starts_with(PLACEHOLDER_PREFIX) {
        debug!(provider = PROVIDER_KEY, channel = %entry.id, "Skipping placeholder channel");
        metrics::record_skip(PROVIDER_KEY, "placeholder");
        return None;
    }

    let art = match client.fetch_media(&entry.id).await {
        Ok(media) => select_art(&media.thumbnails()),
        Err(FeedError::Http(404)) => DEFAULT_ART.to_string(),
        Err(e) => {
            warn!(provider = PROVIDER_KEY, channel = %entry.id, "Skipping channel, media fetch failed: {}", e);
            metrics::record_skip(PROVIDER_KEY, "media");
            return None;
        }
    };

    let call_sign = trimmed(Some(status_title));
    let title = trimmed(entry.display_name.as_deref())
        .or_else(|| call_sign.clone())
        .unwrap_or_else(|| entry.id.clone());

    let mut channel = Channel::new(Channel::qualified_id(PROVIDER_KEY, &entry.id), title.clone());
    channel.title = Some(title);
    channel.call_sign = call_sign;
    channel.description = trimmed(status.channel().description.as_deref());
    channel.logo = entry.logo();
    channel.channel_art = Some(art);
    channel.stream_url = status.stream_url().unwrap_or_default().to_string();
    Some(channel)
}

/// Configured lineups followed by discovered stations not already listed.
///
/// A broken auto-selection feed stops discovery but keeps what was found.
pub async fn discover_lineups(client: &StirrClient, configured: &[String]) -> Vec<String> {
    let mut lineups = configured.to_vec();
    let mut stations = client.stream_stations();

    while let Some(station) = stations.next().await {
        match station {
            Ok(station) => {
                let station = station.trim().to_string();
                if !station.is_empty() && !lineups.contains(&station) {
                    debug!(provider = PROVIDER_KEY, lineup = %station, "Discovered lineup");
                    lineups.push(station);
                }
            }
            Err(e) if e.is_record_error() => {
                warn!(provider = PROVIDER_KEY, "Ignoring malformed station entry: {}", e);
            }
            Err(e) => {
                warn!(provider = PROVIDER_KEY, "Lineup discovery failed: {}", e);
                break;
            }
        }
    }

    lineups
}

/// Entries of one lineup whose ids have not been seen in this listing.
///
/// A lineup feed failure ends this lineup only.
fn unseen_entries<'a>(
    client: &StirrClient,
    lineup: &'a str,
    seen: &'a mut HashSet<String>,
) -> impl Stream<Item = LineupChannel> + Send + 'a {
    let mut entries = client.stream_lineup(lineup);
    stream! {
        while let Some(entry) = entries.next().await {
            match entry {
                Ok(entry) => {
                    if seen.insert(entry.id.clone()) {
                        yield entry;
                    }
                }
                Err(e) if e.is_record_error() => {
                    warn!(provider = PROVIDER_KEY, lineup, "Skipping undecodable lineup entry: {}", e);
                    metrics::record_skip(PROVIDER_KEY, "decode");
                }
                Err(e) => {
                    warn!(provider = PROVIDER_KEY, lineup, "Lineup channel list failed: {}", e);
                    break;
                }
            }
        }
    }
}

/// Stream the Stirr channels across all lineups.
///
/// The seen-set and sort counter live inside this call, so concurrent
/// listings never share them.
pub fn list_channels(client: StirrClient, configured: Vec<String>, concurrency: usize) -> ChannelStream {
    stream! {
        let lineups = discover_lineups(&client, &configured).await;
        info!(provider = PROVIDER_KEY, lineups = lineups.len(), "Listing channels");

        let mut seen = HashSet::new();
        let mut sort_keys = SortKeys::default();
        let mut emitted = 0usize;

        for lineup in &lineups {
            let channels = unseen_entries(&client, lineup, &mut seen)
                .map(|entry| {
                    let client = client.clone();
                    async move { build_channel(&client, &entry).await }
                })
                .buffered(concurrency.max(1));
            futures::pin_mut!(channels);

            while let Some(channel) = channels.next().await {
                let Some(mut channel) = channel else {
                    continue;
                };
                channel.sort_key = Some(sort_keys.assign(lineup, &channel.name));
                emitted += 1;
                metrics::record_channel(PROVIDER_KEY);
                yield Ok(channel);
            }
        }

        info!(provider = PROVIDER_KEY, channels = emitted, seen = seen.len(), "Channel listing complete");
    }
    .boxed()
}
