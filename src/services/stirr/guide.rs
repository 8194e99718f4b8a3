//! Stirr guide from the per-channel programme feeds

use async_stream::stream;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::Response;
use tracing::warn;

use super::client::StirrClient;
use super::types::Programme;
use super::PROVIDER_KEY;
use crate::models::{Airing, AiringStream, Channel, Guide, GuideEntry, GuideEntryStream, GuideWindow};
use crate::services::feed::records_from_response;
use crate::services::ids::hash_id;
use crate::services::metrics;
use crate::services::provider::{ChannelStream, ProviderError};

/// Upstream programme timestamp, e.g. `20240101180000 +0000`
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S %z";

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Two-letter language from a tag such as `en-US`
fn language(tag: Option<&str>) -> Option<String> {
    tag.map(|t| t.trim().chars().take(2).collect::<String>())
        .filter(|l| !l.is_empty())
}

/// Map a programme entry to an airing; `None` when its times are unusable
pub fn build_airing(channel_id: &str, programme: &Programme) -> Option<Airing> {
    let start = parse_timestamp(&programme.start)?;
    let stop = parse_timestamp(&programme.stop)?;

    let title = programme.title.clone().unwrap_or_default();
    let desc = programme.desc.clone().unwrap_or_default();
    let title_text = title.value.unwrap_or_default();
    let desc_text = desc.value.unwrap_or_default();

    let mut airing = Airing::new(
        format!("{}{}", channel_id, start.timestamp()),
        channel_id,
        start,
        stop,
        title_text.clone(),
    )?;

    let series_id = hash_id(&title_text);
    airing.program_id = Some(format!("{}.{}", series_id, hash_id(&desc_text)));
    airing.series_id = Some(series_id);
    airing.description = Some(desc_text).filter(|d| !d.is_empty());
    airing.title_lang = language(title.lang.as_deref());
    airing.description_lang = language(desc.lang.as_deref());
    airing.is_live = programme.is_live();

    // Category sentinels only ever turn flags on
    for category in programme.categories() {
        match category {
            "HD" => airing.is_hd = true,
            "Live" => airing.is_live = true,
            "New" => airing.is_new = true,
            "Stereo" => airing.is_stereo = true,
            "CC" => airing.has_closed_captioning = true,
            _ => {}
        }
        airing.categories.push(category.to_string());
    }

    Some(airing)
}

/// Airings in an open programme feed that overlap `window`
fn programme_airings(channel_id: String, response: Response, window: GuideWindow) -> AiringStream {
    let (start, end) = (window.start, window.end());
    stream! {
        let records = records_from_response::<Programme>(response, StirrClient::programme_pointer());
        futures::pin_mut!(records);

        while let Some(record) = records.next().await {
            match record {
                Ok(programme) => {
                    let Some(airing) = build_airing(&channel_id, &programme) else {
                        continue;
                    };
                    if airing.overlaps(start, end) {
                        metrics::record_airing(PROVIDER_KEY);
                        yield airing;
                    }
                }
                Err(e) if e.is_record_error() => {
                    warn!(provider = PROVIDER_KEY, channel = %channel_id, "Skipping undecodable programme: {}", e);
                }
                Err(e) => {
                    warn!(provider = PROVIDER_KEY, channel = %channel_id, "Programme feed ended early: {}", e);
                    break;
                }
            }
        }
    }
    .boxed()
}

/// Guide entries for `channels`.
///
/// Programme feeds are opened on a bounded pool as the entries are polled; a
/// channel whose feed cannot be opened is left out.
pub fn guide_entries(
    client: StirrClient,
    channels: ChannelStream,
    window: GuideWindow,
    concurrency: usize,
) -> GuideEntryStream {
    stream! {
        let opened = channels
            .map(|channel| {
                let client = client.clone();
                async move {
                    let channel: Channel = channel?;
                    let upstream_id = channel.upstream_id(PROVIDER_KEY).unwrap_or(channel.id.as_str());
                    let response = client.open_programme(upstream_id).await;
                    Ok::<_, ProviderError>((channel, response))
                }
            })
            .buffered(concurrency.max(1));
        futures::pin_mut!(opened);

        while let Some(item) = opened.next().await {
            match item {
                Ok((channel, Ok(response))) => {
                    let airings = programme_airings(channel.id.clone(), response, window);
                    yield Ok(GuideEntry::new(channel, airings));
                }
                Ok((channel, Err(e))) => {
                    warn!(provider = PROVIDER_KEY, channel = %channel.id, "Skipping guide entry, programme fetch failed: {}", e);
                    metrics::record_skip(PROVIDER_KEY, "programme");
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
    }
    .boxed()
}

pub fn build_guide(client: StirrClient, channels: ChannelStream, window: GuideWindow, concurrency: usize) -> Guide {
    Guide::new(window, guide_entries(client, channels, window, concurrency))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::stirr::catalog::list_channels;
    use crate::services::stirr::client::StirrSettings;
    use chrono::TimeZone;
    use futures::stream;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn programme(json: &str) -> Programme {
        serde_json::from_str(json).unwrap()
    }

    fn test_client(server: &MockServer) -> StirrClient {
        StirrClient::new(
            reqwest::Client::new(),
            StirrSettings {
                base_url: format!("{}/v3/", server.uri()),
                station_selection_url: format!("{}/stationAutoSelection", server.uri()),
            },
        )
        .unwrap()
    }

    fn channel(id: &str) -> Channel {
        Channel::new(Channel::qualified_id(PROVIDER_KEY, id), id)
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(
            parse_timestamp("20240101183000 -0500"),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 23, 30, 0).unwrap())
        );
        assert_eq!(parse_timestamp("2024-01-01"), None);
    }

    #[test]
    fn test_build_airing_fields() {
        let airing = build_airing(
            "stirr.a",
            &programme(
                r#"{"start":"20240101000000 +0000","stop":"20240101013000 +0000",
                    "title":{"value":"Evening News","lang":"en-US"},
                    "desc":{"value":"Headlines","lang":"es"},
                    "sinclair:isLiveProgram":"false",
                    "category":[{"value":"HD"},{"value":"CC"},{"value":"News"}]}"#,
            ),
        )
        .unwrap();

        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(airing.id, format!("stirr.a{}", start.timestamp()));
        assert_eq!(airing.length, 5400);
        assert_eq!(airing.series_id, Some(hash_id("Evening News")));
        assert_eq!(
            airing.program_id,
            Some(format!("{}.{}", hash_id("Evening News"), hash_id("Headlines")))
        );
        assert_eq!(airing.title_lang.as_deref(), Some("en"));
        assert_eq!(airing.description_lang.as_deref(), Some("es"));
        assert!(airing.is_hd);
        assert!(airing.has_closed_captioning);
        assert!(!airing.is_live);
        assert!(!airing.is_new);
    }

    #[test]
    fn test_live_flag_is_never_cleared() {
        let airing = build_airing(
            "stirr.a",
            &programme(
                r#"{"start":"20240101000000 +0000","stop":"20240101010000 +0000",
                    "sinclair:isLiveProgram":true,"category":[{"value":"New"}]}"#,
            ),
        )
        .unwrap();
        assert!(airing.is_live);
        assert!(airing.is_new);

        let airing = build_airing(
            "stirr.a",
            &programme(r#"{"start":"20240101000000 +0000","stop":"20240101010000 +0000","category":{"value":"Live"}}"#),
        )
        .unwrap();
        assert!(airing.is_live);
    }

    #[test]
    fn test_inverted_programme_is_dropped() {
        assert!(build_airing(
            "stirr.a",
            &programme(r#"{"start":"20240101010000 +0000","stop":"20240101010000 +0000"}"#)
        )
        .is_none());
    }

    #[tokio::test]
    async fn test_guide_filters_window_and_skips_failed_channels() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/program/stirr/ott/a"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"channel":[{"id":"a","programme":[
                    {"start":"20231231220000 +0000","stop":"20231231230000 +0000","title":{"value":"Before"}},
                    {"start":"20231231233000 +0000","stop":"20240101003000 +0000","title":{"value":"Spans"}},
                    {"start":"20240101010000 +0000","stop":"20240101020000 +0000","title":{"value":"Inside"}},
                    {"start":"20240101030000 +0000","stop":"20240101040000 +0000","title":{"value":"After"}}
                ]}]}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v3/program/stirr/ott/b"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v3/program/stirr/ott/c"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"channel":[]}"#))
            .mount(&server)
            .await;

        let window = GuideWindow {
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            duration_secs: 3 * 3600,
        };
        let channels: ChannelStream =
            stream::iter(vec![Ok(channel("a")), Ok(channel("b")), Ok(channel("c"))]).boxed();
        let guide = build_guide(test_client(&server), channels, window, 2);

        let mut entries = guide.entries;
        let mut seen = Vec::new();
        while let Some(entry) = entries.next().await {
            let entry = entry.unwrap();
            let titles: Vec<String> = entry.airings.map(|a| a.title).collect().await;
            seen.push((entry.channel.id, titles));
        }

        assert_eq!(
            seen,
            vec![
                ("stirr.a".to_string(), vec!["Spans".to_string(), "Inside".to_string()]),
                ("stirr.c".to_string(), vec![]),
            ]
        );
    }

    #[tokio::test]
    async fn test_guide_fetches_nothing_until_polled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let channels = list_channels(client.clone(), vec!["national".to_string()], 2);
        let guide = build_guide(client, channels, GuideWindow::resolve(Some(0), None).unwrap(), 2);
        drop(guide);
    }

    #[tokio::test]
    async fn test_guide_opens_feeds_only_within_pool() {
        let server = MockServer::start().await;
        let ids = ["a", "b", "c", "d", "e", "f"];
        for (i, id) in ids.iter().enumerate() {
            let expected: std::ops::RangeInclusive<u64> = match i {
                0 => 1..=1,
                1 => 0..=1,
                _ => 0..=0,
            };
            Mock::given(method("GET"))
                .and(path(format!("/v3/program/stirr/ott/{}", id)))
                .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"channel":[]}"#))
                .expect(expected)
                .mount(&server)
                .await;
        }

        let channels: ChannelStream = stream::iter(ids.iter().map(|id| Ok::<_, ProviderError>(channel(id))).collect::<Vec<_>>()).boxed();
        let window = GuideWindow::resolve(Some(0), None).unwrap();
        let mut entries = build_guide(test_client(&server), channels, window, 2).entries;

        let first = entries.next().await.unwrap().unwrap();
        assert_eq!(first.channel.id, "stirr.a");
        drop(first);
        drop(entries);
    }

    #[tokio::test]
    async fn test_guide_surfaces_fatal_listing_error() {
        let server = MockServer::start().await;
        let channels: ChannelStream = stream::iter(vec![Err(ProviderError::setup(PROVIDER_KEY, "boom"))]).boxed();
        let window = GuideWindow::resolve(Some(0), None).unwrap();

        let entries: Vec<_> = build_guide(test_client(&server), channels, window, 1).entries.collect().await;
        assert_eq!(entries.len(), 1);
        assert!(matches!(entries[0], Err(ProviderError::Setup { .. })));
    }
}
