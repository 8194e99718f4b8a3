use chrono::{DateTime, TimeZone, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::models::Channel;
use crate::services::provider::ProviderError;

/// Default guide window when the caller gives none (24 hours)
pub const DEFAULT_GUIDE_WINDOW_SECS: u64 = 86_400;

/// Longest guide window a caller may ask for (14 days)
pub const MAX_GUIDE_WINDOW_SECS: u64 = 14 * 86_400;

/// A single scheduled program on a channel.
///
/// Built only through [`Airing::new`], which guarantees `stop_time > start_time`
/// and `length == stop_time - start_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Airing {
    pub id: String,
    pub channel_id: String,
    pub start_time: DateTime<Utc>,
    pub stop_time: DateTime<Utc>,
    /// Duration in seconds
    pub length: i64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_release_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_lang: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_lang: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    pub is_live: bool,
    pub is_new: bool,
    #[serde(rename = "isHD")]
    pub is_hd: bool,
    pub is_stereo: bool,
    pub has_closed_captioning: bool,
    pub is_movie: bool,
}

impl Airing {
    /// Create an airing; `None` when the interval is empty or inverted
    pub fn new(
        id: impl Into<String>,
        channel_id: impl Into<String>,
        start_time: DateTime<Utc>,
        stop_time: DateTime<Utc>,
        title: impl Into<String>,
    ) -> Option<Self> {
        let length = (stop_time - start_time).num_seconds();
        if length <= 0 {
            return None;
        }

        Some(Self {
            id: id.into(),
            channel_id: channel_id.into(),
            start_time,
            stop_time,
            length,
            title: title.into(),
            sub_title: None,
            description: None,
            series_id: None,
            program_id: None,
            season_number: None,
            episode_number: None,
            original_release_date: None,
            title_lang: None,
            description_lang: None,
            categories: Vec::new(),
            is_live: false,
            is_new: false,
            is_hd: false,
            is_stereo: false,
            has_closed_captioning: false,
            is_movie: false,
        })
    }

    /// Whether the airing intersects the half-open window `[start, end)`
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && self.stop_time > start
    }
}

/// Lazy, single-pass sequence of airings for one channel
pub type AiringStream = BoxStream<'static, Airing>;

/// Lazy, single-pass sequence of guide entries. An `Err` item is a fatal
/// setup failure and is always the last item.
pub type GuideEntryStream = BoxStream<'static, Result<GuideEntry, ProviderError>>;

/// One channel and its airings, ordered by start time
pub struct GuideEntry {
    pub channel: Channel,
    pub airings: AiringStream,
}

impl GuideEntry {
    pub fn new(channel: Channel, airings: AiringStream) -> Self {
        Self { channel, airings }
    }
}

/// Time window a guide covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuideWindow {
    pub start: DateTime<Utc>,
    pub duration_secs: u64,
}

#[derive(Debug, thiserror::Error)]
#[error("guide window of {requested}s exceeds the {max}s maximum")]
pub struct WindowTooLong {
    pub requested: u64,
    pub max: u64,
}

impl GuideWindow {
    /// Resolve caller input, defaulting to now and 24 hours
    pub fn resolve(start_timestamp: Option<i64>, duration_secs: Option<u64>) -> Result<Self, WindowTooLong> {
        let start = start_timestamp
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(Utc::now);

        let duration_secs = duration_secs
            .filter(|d| *d > 0)
            .unwrap_or(DEFAULT_GUIDE_WINDOW_SECS);
        if duration_secs > MAX_GUIDE_WINDOW_SECS {
            return Err(WindowTooLong {
                requested: duration_secs,
                max: MAX_GUIDE_WINDOW_SECS,
            });
        }

        Ok(Self { start, duration_secs })
    }

    /// Exclusive end of the window, saturating at the latest representable
    /// instant
    pub fn end(&self) -> DateTime<Utc> {
        i64::try_from(self.duration_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|d| self.start.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// A guide over a caller-specified window. Constructing one performs no I/O;
/// upstream fetches happen as `entries` and each entry's airings are polled.
pub struct Guide {
    pub window: GuideWindow,
    pub entries: GuideEntryStream,
}

impl Guide {
    pub fn new(window: GuideWindow, entries: GuideEntryStream) -> Self {
        Self { window, entries }
    }
}
