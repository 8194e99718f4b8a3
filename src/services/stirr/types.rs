//! Stirr feed records

use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use crate::services::feed::string_or_number;

/// Accept either a single object or a list of them
fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        Some(OneOrMany::Many(items)) => items,
        Some(OneOrMany::One(item)) => vec![item],
        None => Vec::new(),
    })
}

/// Numeric field that may arrive as a number or a string
fn dimension(value: &Option<Value>) -> Option<u32> {
    match value.as_ref()? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ============================================================================
// Lineup channel list
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Icon {
    #[serde(default)]
    pub src: Option<String>,
}

/// Channel reference under `/channel` in a lineup listing
#[derive(Debug, Clone, Deserialize)]
pub struct LineupChannel {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "display-name", default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub icon: Option<Icon>,
}

impl LineupChannel {
    pub fn logo(&self) -> Option<String> {
        self.icon
            .as_ref()
            .and_then(|icon| icon.src.clone())
            .filter(|src| !src.is_empty())
    }
}

// ============================================================================
// Status feed
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusItem {
    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusChannel {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub item: Vec<StatusItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusRss {
    #[serde(default)]
    pub channel: StatusChannel,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusFeed {
    #[serde(default)]
    pub rss: StatusRss,
}

impl StatusFeed {
    pub fn channel(&self) -> &StatusChannel {
        &self.rss.channel
    }

    /// Stream link of the first status item
    pub fn stream_url(&self) -> Option<&str> {
        self.rss
            .channel
            .item
            .first()?
            .link
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }
}

// ============================================================================
// Media description feed
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Thumbnail {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    width: Option<Value>,
    #[serde(default)]
    height: Option<Value>,
}

impl Thumbnail {
    pub fn width(&self) -> Option<u32> {
        dimension(&self.width)
    }

    pub fn height(&self) -> Option<u32> {
        dimension(&self.height)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaContent {
    #[serde(rename = "media:thumbnail", default, deserialize_with = "one_or_many")]
    pub thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaItem {
    #[serde(rename = "media:content", default)]
    pub content: Option<MediaContent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaChannel {
    #[serde(default, deserialize_with = "one_or_many")]
    pub item: Vec<MediaItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaRss {
    #[serde(default)]
    pub channel: MediaChannel,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaFeed {
    #[serde(default)]
    pub rss: MediaRss,
}

impl MediaFeed {
    /// Thumbnails of every media item, in feed order
    pub fn thumbnails(&self) -> Vec<Thumbnail> {
        self.rss
            .channel
            .item
            .iter()
            .filter_map(|item| item.content.as_ref())
            .flat_map(|content| content.thumbnails.iter().cloned())
            .collect()
    }
}

// ============================================================================
// Programme feed
// ============================================================================

/// Text with an optional language tag (`{"value": .., "lang": ..}`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LangText {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
}

/// Programme entry under `/channel/-/programme`
#[derive(Debug, Clone, Deserialize)]
pub struct Programme {
    pub start: String,
    pub stop: String,
    #[serde(default)]
    pub title: Option<LangText>,
    #[serde(default)]
    pub desc: Option<LangText>,
    #[serde(rename = "sinclair:isLiveProgram", default)]
    pub is_live_program: Option<Value>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub category: Vec<LangText>,
}

impl Programme {
    /// Upstream live flag, accepting booleans, numbers and strings
    pub fn is_live(&self) -> bool {
        match &self.is_live_program {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"),
            _ => false,
        }
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.category.iter().filter_map(|c| c.value.as_deref())
    }
}
