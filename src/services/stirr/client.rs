//! Stirr API client

use reqwest::{Client, Response};
use url::Url;

use super::types::{LineupChannel, MediaFeed, StatusFeed};
use super::PROVIDER_KEY;
use crate::config::Config;
use crate::services::feed::{FeedError, FeedReader, JsonPointer, RecordStream};

/// Station names nested in the auto-selection page
const STATION_POINTER: &str = "/page/-/button/media:content/sinclair:action_config/station";

/// Programme entries of every channel in a programme feed
pub const PROGRAMME_POINTER: &str = "/channel/-/programme";

/// Endpoints for the Stirr client
#[derive(Debug, Clone)]
pub struct StirrSettings {
    pub base_url: String,
    pub station_selection_url: String,
}

impl StirrSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.stirr_base_url.clone(),
            station_selection_url: config.stirr_station_selection_url.clone(),
        }
    }
}

/// Stirr API client
#[derive(Clone)]
pub struct StirrClient {
    feeds: FeedReader,
    base_url: String,
    station_selection_url: String,
}

impl StirrClient {
    pub fn new(http: Client, settings: StirrSettings) -> Result<Self, url::ParseError> {
        Url::parse(&settings.station_selection_url)?;

        let mut base_url = Url::parse(&settings.base_url)?.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            feeds: FeedReader::new(http, PROVIDER_KEY),
            base_url,
            station_selection_url: settings.station_selection_url,
        })
    }

    pub fn lineup_url(&self, lineup: &str) -> String {
        format!("{}channels/stirr?station={}", self.base_url, urlencoding::encode(lineup))
    }

    pub fn status_url(&self, channel_id: &str) -> String {
        format!("{}status/{}", self.base_url, urlencoding::encode(channel_id))
    }

    pub fn media_url(&self, channel_id: &str) -> String {
        format!("{}media/{}", self.base_url, urlencoding::encode(channel_id))
    }

    pub fn programme_url(&self, channel_id: &str) -> String {
        format!("{}program/stirr/ott/{}", self.base_url, urlencoding::encode(channel_id))
    }

    /// Station names advertised by the auto-selection page
    pub fn stream_stations(&self) -> RecordStream<String> {
        self.feeds.stream_records(
            self.station_selection_url.clone(),
            "station_selection",
            STATION_POINTER.into(),
        )
    }

    /// Channel references of one lineup
    pub fn stream_lineup(&self, lineup: &str) -> RecordStream<LineupChannel> {
        self.feeds
            .stream_records(self.lineup_url(lineup), "lineup", "/channel".into())
    }

    pub async fn fetch_status(&self, channel_id: &str) -> Result<StatusFeed, FeedError> {
        self.feeds.fetch_json(&self.status_url(channel_id), "status").await
    }

    pub async fn fetch_media(&self, channel_id: &str) -> Result<MediaFeed, FeedError> {
        self.feeds.fetch_json(&self.media_url(channel_id), "media").await
    }

    /// Open a channel's programme feed; the body is read by the caller
    pub async fn open_programme(&self, channel_id: &str) -> Result<Response, FeedError> {
        self.feeds
            .open(&self.programme_url(channel_id), "programme", None)
            .await
    }

    pub fn programme_pointer() -> JsonPointer {
        JsonPointer::parse(PROGRAMME_POINTER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> StirrClient {
        StirrClient::new(
            Client::new(),
            StirrSettings {
                base_url: format!("{}/api/rest/v3", server.uri()),
                station_selection_url: format!("{}/stationAutoSelection", server.uri()),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_urls() {
        let server = MockServer::start().await;
        let client = test_client(&server);
        assert!(client.lineup_url("wjla").ends_with("/api/rest/v3/channels/stirr?station=wjla"));
        assert!(client.status_url("a b").ends_with("/api/rest/v3/status/a%20b"));
        assert!(client.programme_url("abc").ends_with("/api/rest/v3/program/stirr/ott/abc"));
    }

    #[tokio::test]
    async fn test_stream_stations_accepts_string_or_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stationAutoSelection"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"page":[
                    {"button":{"media:content":{"sinclair:action_config":{"station":"wjla"}}}},
                    {"button":{"media:content":{"sinclair:action_config":{"station":["kutv","national"]}}}},
                    {"title":"no button"}
                ]}"#,
            ))
            .mount(&server)
            .await;

        let stations: Vec<String> = test_client(&server)
            .stream_stations()
            .map(|s| s.unwrap())
            .collect()
            .await;
        assert_eq!(stations, vec!["wjla", "kutv", "national"]);
    }

    #[tokio::test]
    async fn test_stream_lineup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/rest/v3/channels/stirr"))
            .and(query_param("station", "national"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"channel":[{"id":"a","display-name":"A"},{"id":"b"}]}"#,
            ))
            .mount(&server)
            .await;

        let ids: Vec<String> = test_client(&server)
            .stream_lineup("national")
            .map(|c| c.unwrap().id)
            .collect()
            .await;
        assert_eq!(ids, vec!["a", "b"]);
    }
}
