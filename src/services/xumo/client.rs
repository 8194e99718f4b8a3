//! Xumo API client
//!
//! Resolves the session parameters every Xumo request is addressed with and
//! wraps the on-now, catalog and asset endpoints.

use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

use super::types::{is_simulcast, AssetResponse, CatalogChannel, OnNowEntry, OnNowResponse, XumoSession};
use super::PROVIDER_KEY;
use crate::config::Config;
use crate::services::cache::SessionCache;
use crate::services::feed::{FeedReader, RecordStream};
use crate::services::metrics;
use crate::services::provider::ProviderError;

/// Cache key for the resolved session parameters
pub const SESSION_CACHE_KEY: &str = "channels-buddy-xumo.identifiers";

lazy_static! {
    static ref CHANNEL_LIST_ID_REGEX: Regex = Regex::new(r#""channelListId":"(.*?)","#).unwrap();
    static ref GEO_ID_REGEX: Regex = Regex::new(r#""geoId":"(.*?)","#).unwrap();
}

/// Extract both session identifiers from the landing page body.
///
/// Returns `None` unless both are present and non-empty.
pub fn extract_session(body: &str) -> Option<XumoSession> {
    let capture = |regex: &Regex| {
        regex
            .captures(body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|s| !s.is_empty())
    };

    Some(XumoSession {
        channel_list_id: capture(&CHANNEL_LIST_ID_REGEX)?,
        geo_id: capture(&GEO_ID_REGEX)?,
    })
}

/// Uppercase the first letter of each word, lowercase the rest
fn title_case(s: &str) -> String {
    s.to_lowercase()
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize a base URL so relative paths can be appended
fn base_url(raw: &str) -> Result<String, url::ParseError> {
    let url = Url::parse(raw)?;
    let mut s = url.to_string();
    if !s.ends_with('/') {
        s.push('/');
    }
    Ok(s)
}

/// Endpoints and session settings for the Xumo client
#[derive(Debug, Clone)]
pub struct XumoSettings {
    pub landing_url: String,
    pub base_url: String,
    pub image_base_url: String,
    pub user_agent: String,
    pub session_ttl: Duration,
}

impl XumoSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            landing_url: config.xumo_landing_url.clone(),
            base_url: config.xumo_base_url.clone(),
            image_base_url: config.xumo_image_base_url.clone(),
            user_agent: config.user_agent.clone(),
            session_ttl: Duration::from_secs(config.session_cache_ttl_seconds),
        }
    }
}

/// Xumo API client
#[derive(Clone)]
pub struct XumoClient {
    feeds: FeedReader,
    cache: SessionCache,
    landing_url: String,
    base_url: String,
    image_base_url: String,
    user_agent: String,
    session_ttl: Duration,
}

impl XumoClient {
    pub fn new(http: Client, cache: SessionCache, settings: XumoSettings) -> Result<Self, url::ParseError> {
        Url::parse(&settings.landing_url)?;

        Ok(Self {
            feeds: FeedReader::new(http, PROVIDER_KEY),
            cache,
            landing_url: settings.landing_url,
            base_url: base_url(&settings.base_url)?,
            image_base_url: base_url(&settings.image_base_url)?,
            user_agent: settings.user_agent,
            session_ttl: settings.session_ttl,
        })
    }

    // ========================================================================
    // Session bootstrap
    // ========================================================================

    /// Cached session parameters, bootstrapping from the landing page on a miss.
    ///
    /// A failed bootstrap leaves nothing in the cache and is fatal for the call.
    pub async fn resolve_session(&self) -> Result<XumoSession, ProviderError> {
        self.cache
            .get_or_compute(SESSION_CACHE_KEY, self.session_ttl, || self.fetch_session())
            .await
    }

    async fn fetch_session(&self) -> Result<XumoSession, ProviderError> {
        let mut headers = HeaderMap::new();
        let user_agent = HeaderValue::from_str(&self.user_agent)
            .map_err(|e| ProviderError::setup(PROVIDER_KEY, format!("invalid user agent: {}", e)))?;
        headers.insert(USER_AGENT, user_agent);

        let result = match self.feeds.fetch_text(&self.landing_url, "landing", Some(headers)).await {
            Ok(body) => extract_session(&body)
                .ok_or_else(|| ProviderError::setup(PROVIDER_KEY, "failed to get location identifiers")),
            Err(e) => Err(ProviderError::setup(PROVIDER_KEY, format!("landing page fetch failed: {}", e))),
        };

        match &result {
            Ok(session) => {
                info!("Xumo channel list id set to {}", session.channel_list_id);
                info!("Xumo geoId set to {}", session.geo_id);
            }
            Err(e) => error!("Xumo session bootstrap failed: {}", e),
        }
        metrics::record_bootstrap(result.is_ok());

        result
    }

    // ========================================================================
    // Endpoints
    // ========================================================================

    pub fn on_now_url(&self, session: &XumoSession) -> String {
        format!(
            "{}channels/list/{}/onnowandnext.json?f=asset.title&f=asset.descriptions.json",
            self.base_url,
            urlencoding::encode(&session.channel_list_id)
        )
    }

    pub fn catalog_url(&self, session: &XumoSession) -> String {
        format!(
            "{}channels/list/{}.json?geoId={}",
            self.base_url,
            urlencoding::encode(&session.channel_list_id),
            urlencoding::encode(&session.geo_id)
        )
    }

    pub fn asset_url(&self, asset_id: &str) -> String {
        format!(
            "{}assets/asset/{}.json?f=providers",
            self.base_url,
            urlencoding::encode(asset_id)
        )
    }

    pub fn logo_url(&self, channel_id: &str, color: &str) -> String {
        format!(
            "{}channels/channel/{}/1024x768.png?type=color_on{}",
            self.image_base_url,
            channel_id,
            title_case(color)
        )
    }

    pub fn channel_art_url(&self, channel_id: &str) -> String {
        format!(
            "{}channels/channel/{}/1024x768.png?type=channelTile",
            self.image_base_url, channel_id
        )
    }

    // ========================================================================
    // Feeds
    // ========================================================================

    /// Live asset id per upstream channel id, simulcasts only.
    ///
    /// Non-simulcast entries are dropped unread; a simulcast entry missing its
    /// ids is skipped without failing the feed.
    pub async fn fetch_on_now(&self, session: &XumoSession) -> Result<HashMap<String, String>, ProviderError> {
        let on_now: OnNowResponse = self.feeds.fetch_json(&self.on_now_url(session), "on_now").await?;

        let mut live = HashMap::new();
        for raw in on_now.results.into_iter().filter(is_simulcast) {
            match serde_json::from_value::<OnNowEntry>(raw) {
                Ok(entry) => {
                    live.insert(entry.channel_id, entry.id);
                }
                Err(e) => {
                    warn!(provider = PROVIDER_KEY, "Skipping malformed on-now entry: {}", e);
                    metrics::record_skip(PROVIDER_KEY, "on_now");
                }
            }
        }
        Ok(live)
    }

    /// Catalog entries, streamed
    pub fn stream_catalog(&self, session: &XumoSession) -> RecordStream<CatalogChannel> {
        self.feeds
            .stream_records(self.catalog_url(session), "catalog", "/channel/item".into())
    }

    // ========================================================================
    // Stream resolution
    // ========================================================================

    /// Playable stream URL for a live asset, or an empty string when the asset
    /// metadata is missing, malformed or unreachable
    pub async fn resolve_stream_url(&self, asset_id: &str) -> String {
        self.feeds
            .fetch_json::<AssetResponse>(&self.asset_url(asset_id), "asset")
            .await
            .ok()
            .and_then(|asset| asset.stream_url().map(|s| s.to_string()))
            .unwrap_or_default()
    }
}
