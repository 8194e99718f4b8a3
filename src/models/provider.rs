use serde::Serialize;

/// Registration record a provider hands to the host registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    pub key: &'static str,
    pub display_name: &'static str,
    pub supports_channels: bool,
    pub supports_guide: bool,
    /// Seconds the host may cache a channel listing
    pub channel_cache_ttl: u64,
    /// Seconds the host may cache guide data
    pub guide_cache_ttl: u64,
}
