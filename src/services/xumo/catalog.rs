//! Xumo channel listing
//!
//! Joins the small on-now feed against the streamed catalog: only channels
//! with a live simulcast asset are playable and kept.

use async_stream::stream;
use futures::{future, StreamExt};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

use super::client::XumoClient;
use super::types::CatalogChannel;
use super::PROVIDER_KEY;
use crate::models::Channel;
use crate::services::metrics;
use crate::services::provider::{ChannelStream, ProviderError};

/// Logo color variant requested from the image service
const LOGO_COLOR: &str = "White";

lazy_static! {
    static ref LINE_BREAKS: Regex = Regex::new(r"(\r\n|\n|\r)").unwrap();
    static ref DOUBLE_QUOTES: Regex = Regex::new(r#"("|“|”)"#).unwrap();
}

/// Collapse line breaks to spaces and drop double quotes
pub fn clean_description(description: &str) -> String {
    let flattened = LINE_BREAKS.replace_all(description, " ");
    DOUBLE_QUOTES.replace_all(&flattened, "").to_string()
}

/// Map a catalog entry to a canonical channel
pub fn build_channel(client: &XumoClient, record: &CatalogChannel, stream_url: String) -> Channel {
    let upstream_id = record.guid.value.as_str();
    let title = record.title.clone().unwrap_or_default();

    Channel {
        id: Channel::qualified_id(PROVIDER_KEY, upstream_id),
        name: title.clone(),
        title: Some(title).filter(|t| !t.is_empty()),
        number: record.channel_number(),
        call_sign: record.callsign.clone(),
        description: record.description.as_deref().map(clean_description),
        logo: Some(client.logo_url(upstream_id, LOGO_COLOR)),
        channel_art: Some(client.channel_art_url(upstream_id)),
        category: record.category(),
        stream_url,
        sort_key: None,
    }
}

/// Stream the playable Xumo channels.
///
/// Session bootstrap, the on-now feed and the catalog feed are fatal when they
/// fail; a catalog entry that does not decode is skipped. A guid repeated in
/// the catalog is emitted once, on its first occurrence.
pub fn list_channels(client: XumoClient, concurrency: usize) -> ChannelStream {
    stream! {
        let session = match client.resolve_session().await {
            Ok(session) => session,
            Err(e) => {
                yield Err(e);
                return;
            }
        };

        let on_now = match client.fetch_on_now(&session).await {
            Ok(on_now) => on_now,
            Err(e) => {
                error!("Xumo on-now feed failed: {}", e);
                yield Err(e);
                return;
            }
        };

        let mut seen = HashSet::new();
        let joined = client.stream_catalog(&session).filter_map(move |record| {
            let joined = match record {
                Ok(record) => match on_now.get(&record.guid.value) {
                    Some(_) if !seen.insert(record.guid.value.clone()) => {
                        debug!(provider = PROVIDER_KEY, channel = %record.guid.value, "Skipping repeated catalog entry");
                        metrics::record_skip(PROVIDER_KEY, "duplicate");
                        None
                    }
                    Some(asset_id) => Some(Ok((record, asset_id.clone()))),
                    None => {
                        metrics::record_skip(PROVIDER_KEY, "not_live");
                        None
                    }
                },
                Err(e) if e.is_record_error() => {
                    warn!("Skipping undecodable Xumo catalog entry: {}", e);
                    metrics::record_skip(PROVIDER_KEY, "decode");
                    None
                }
                Err(e) => Some(Err(ProviderError::from(e))),
            };
            future::ready(joined)
        });

        let resolver = client.clone();
        let channels = joined
            .map(move |item| {
                let client = resolver.clone();
                async move {
                    let (record, asset_id) = item?;
                    let stream_url = client.resolve_stream_url(&asset_id).await;
                    Ok::<_, ProviderError>(build_channel(&client, &record, stream_url))
                }
            })
            .buffered(concurrency.max(1));
        futures::pin_mut!(channels);

        let (mut emitted, mut playable) = (0usize, 0usize);
        while let Some(channel) = channels.next().await {
            match channel {
                Ok(channel) => {
                    emitted += 1;
                    if channel.is_playable() {
                        playable += 1;
                    }
                    metrics::record_channel(PROVIDER_KEY);
                    yield Ok(channel);
                }
                Err(e) => {
                    error!("Xumo catalog feed failed: {}", e);
                    yield Err(e);
                    return;
                }
            }
        }

        info!(provider = PROVIDER_KEY, channels = emitted, playable, "Channel listing complete");
    }
    .boxed()
}
