//! Xumo feed records
//!
//! Decoded shapes of the landing-page session, the on-now feed, catalog
//! entries and per-asset provider metadata.

use serde::{Deserialize, Serialize};

use crate::services::feed::string_or_number;

/// Session parameters scraped from the landing page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XumoSession {
    pub channel_list_id: String,
    pub geo_id: String,
}

// ============================================================================
// On-now feed
// ============================================================================

/// Content type of a standalone live simulcast
pub const SIMULCAST: &str = "SIMULCAST";

/// On-now feed. Entries stay raw so one malformed entry cannot sink the
/// whole document; see [`is_simulcast`].
#[derive(Debug, Deserialize)]
pub struct OnNowResponse {
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
}

/// What a channel is airing right now
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnNowEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub channel_id: String,
    /// Live asset id
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
}

/// Standalone simulcast rather than a composite/bundle entry, judged on the
/// raw entry before it is decoded
pub fn is_simulcast(raw: &serde_json::Value) -> bool {
    raw.get("contentType").and_then(serde_json::Value::as_str) == Some(SIMULCAST)
}

// ============================================================================
// Catalog feed
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Guid {
    #[serde(deserialize_with = "string_or_number")]
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Genre {
    #[serde(default)]
    pub value: Option<String>,
}

/// Catalog entry under `/channel/item`
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogChannel {
    pub guid: Guid,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub number: Option<serde_json::Value>,
    #[serde(default)]
    pub callsign: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub genre: Vec<Genre>,
}

impl CatalogChannel {
    /// Channel number, accepting numeric or string encodings
    pub fn channel_number(&self) -> Option<u32> {
        match self.number.as_ref()? {
            serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn category(&self) -> Option<String> {
        self.genre.first().and_then(|g| g.value.clone())
    }
}

// ============================================================================
// Asset metadata
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct AssetSource {
    #[serde(default)]
    pub uri: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssetProvider {
    #[serde(default)]
    pub sources: Vec<AssetSource>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssetResponse {
    #[serde(default)]
    pub providers: Vec<AssetProvider>,
}

impl AssetResponse {
    /// First source URI of the first provider
    pub fn stream_url(&self) -> Option<&str> {
        self.providers
            .first()?
            .sources
            .first()?
            .uri
            .as_deref()
            .filter(|u| !u.is_empty())
    }
}
