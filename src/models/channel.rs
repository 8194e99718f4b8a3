use serde::{Deserialize, Serialize};

/// Canonical channel produced by a provider listing.
///
/// `id` is always provider-qualified (`"xumo.42"`, `"stirr.wjla"`) so channels
/// from different providers never collide in the host registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_sign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_art: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Empty when the provider had no playable stream for the channel.
    pub stream_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_key: Option<String>,
}

impl Channel {
    /// Build the provider-qualified identifier for an upstream channel id
    pub fn qualified_id(provider_key: &str, upstream_id: &str) -> String {
        format!("{}.{}", provider_key, upstream_id)
    }

    /// Upstream id when this channel belongs to `provider_key`
    pub fn upstream_id(&self, provider_key: &str) -> Option<&str> {
        self.id.strip_prefix(provider_key)?.strip_prefix('.')
    }

    /// Minimal channel with every optional field empty
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            title: None,
            number: None,
            call_sign: None,
            description: None,
            logo: None,
            channel_art: None,
            category: None,
            stream_url: String::new(),
            sort_key: None,
        }
    }

    /// Title shown in guides: title, then name, skipping blanks
    pub fn display_title(&self) -> Option<&str> {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| Some(self.name.as_str()).filter(|n| !n.trim().is_empty()))
    }

    pub fn is_playable(&self) -> bool {
        !self.stream_url.is_empty()
    }
}
