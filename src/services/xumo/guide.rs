//! Synthetic Xumo guide
//!
//! Xumo publishes no schedule we can use, so every channel gets one
//! placeholder airing per hour across the requested window.

use chrono::{DateTime, Duration, DurationRound, Utc};
use futures::{stream, StreamExt};

use super::PROVIDER_KEY;
use crate::models::{Airing, AiringStream, Channel, Guide, GuideEntry, GuideWindow};
use crate::services::ids::hash_id;
use crate::services::metrics;
use crate::services::provider::ChannelStream;

/// Length of one synthetic block
pub const SLOT_SECS: i64 = 3600;

const PLACEHOLDER: &str = "To be announced";

/// Hour-aligned slot starts covering a window.
///
/// The first slot is the hour containing the window start; the last is the
/// one containing `start + duration - 1s`.
#[derive(Debug, Clone)]
pub struct HourlySlots {
    next: Option<DateTime<Utc>>,
    last: DateTime<Utc>,
}

impl HourlySlots {
    pub fn new(window: &GuideWindow) -> Self {
        let next = window
            .start
            .duration_trunc(Duration::seconds(SLOT_SECS))
            .unwrap_or(window.start);
        let last = window.end() - Duration::seconds(1);
        Self { next: Some(next), last }
    }
}

impl Iterator for HourlySlots {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.next.filter(|slot| *slot <= self.last)?;
        self.next = slot.checked_add_signed(Duration::seconds(SLOT_SECS));
        Some(slot)
    }
}

/// Placeholder airing for `channel` in the hour starting at `slot`
pub fn synthesize_airing(channel: &Channel, slot: DateTime<Utc>) -> Option<Airing> {
    let timestamp = slot.timestamp();
    let title = channel.display_title().unwrap_or(PLACEHOLDER).to_string();
    let series_id = hash_id(&channel.id);

    let mut airing = Airing::new(
        hash_id(&format!("{}{}", channel.id, timestamp)),
        channel.id.clone(),
        slot,
        slot + Duration::seconds(SLOT_SECS),
        title.clone(),
    )?;

    airing.sub_title = Some(format!("{} hour long block", title));
    airing.description = Some(
        channel
            .description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| PLACEHOLDER.to_string()),
    );
    airing.program_id = Some(format!("{}.{}", series_id, timestamp));
    airing.series_id = Some(series_id);
    airing.season_number = Some(slot.format("%Y").to_string());
    airing.episode_number = Some(slot.format("%m%d%H").to_string());
    airing.original_release_date = Some(slot);
    airing.categories = channel.category.iter().cloned().collect();

    Some(airing)
}

/// Lazy hourly airings for one channel
pub fn airing_stream(channel: Channel, window: GuideWindow) -> AiringStream {
    stream::iter(HourlySlots::new(&window))
        .filter_map(move |slot| {
            let airing = synthesize_airing(&channel, slot);
            if airing.is_some() {
                metrics::record_airing(PROVIDER_KEY);
            }
            futures::future::ready(airing)
        })
        .boxed()
}

/// Guide over `channels`; channels are listed only as the entries are polled
pub fn synthesize_guide(channels: ChannelStream, window: GuideWindow) -> Guide {
    let entries = channels
        .map(move |channel| {
            channel.map(|channel| {
                let airings = airing_stream(channel.clone(), window);
                GuideEntry::new(channel, airings)
            })
        })
        .boxed();

    Guide::new(window, entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::provider::ProviderError;
    use chrono::TimeZone;

    fn at(ts: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(ts, 0).unwrap()
    }

    fn channel() -> Channel {
        let mut channel = Channel::new("xumo.42", "News");
        channel.category = Some("News".to_string());
        channel
    }

    #[test]
    fn test_slots_cover_window_from_containing_hour() {
        // 2024-01-01 00:30 for 2h -> 00:00, 01:00, 02:00
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap();
        let slots: Vec<_> = HourlySlots::new(&GuideWindow { start, duration_secs: 7200 }).collect();
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0], Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(slots[2], Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_two_hour_window_yields_two_blocks() {
        let start = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();
        let window = GuideWindow { start, duration_secs: 7200 };

        let airings: Vec<Airing> = airing_stream(channel(), window).collect().await;
        assert_eq!(airings.len(), 2);
        assert_eq!(airings[0].episode_number.as_deref(), Some("030500"));
        assert_eq!(airings[1].episode_number.as_deref(), Some("030501"));
        assert_eq!(airings[0].season_number.as_deref(), Some("2024"));
    }

    #[tokio::test]
    async fn test_blocks_are_contiguous_hourly() {
        let window = GuideWindow { start: at(1_700_000_123), duration_secs: 86_400 };
        let airings: Vec<Airing> = airing_stream(channel(), window).collect().await;

        assert_eq!(airings.len(), 25);
        for pair in airings.windows(2) {
            assert_eq!(pair[0].stop_time, pair[1].start_time);
        }
        for airing in &airings {
            assert_eq!(airing.stop_time - airing.start_time, Duration::seconds(SLOT_SECS));
            assert_eq!(airing.length, SLOT_SECS);
        }

        let series: std::collections::HashSet<_> = airings.iter().map(|a| a.series_id.clone()).collect();
        assert_eq!(series.len(), 1);
        let programs: std::collections::HashSet<_> = airings.iter().map(|a| a.program_id.clone()).collect();
        assert_eq!(programs.len(), airings.len());
    }

    #[test]
    fn test_synthesized_fields() {
        let slot = Utc.with_ymd_and_hms(2024, 3, 5, 7, 0, 0).unwrap();
        let airing = synthesize_airing(&channel(), slot).unwrap();

        assert_eq!(airing.title, "News");
        assert_eq!(airing.sub_title.as_deref(), Some("News hour long block"));
        assert_eq!(airing.description.as_deref(), Some(PLACEHOLDER));
        assert_eq!(airing.categories, vec!["News".to_string()]);
        assert_eq!(airing.id, hash_id(&format!("xumo.42{}", slot.timestamp())));
        assert_eq!(
            airing.program_id,
            Some(format!("{}.{}", hash_id("xumo.42"), slot.timestamp()))
        );
        assert_eq!(airing.original_release_date, Some(slot));
        assert!(!airing.is_movie);
    }

    #[test]
    fn test_untitled_channel_uses_placeholder() {
        let airing = synthesize_airing(&Channel::new("xumo.7", " "), at(0)).unwrap();
        assert_eq!(airing.title, PLACEHOLDER);
        assert!(airing.categories.is_empty());
    }

    #[tokio::test]
    async fn test_guide_passes_through_fatal_error() {
        let channels: ChannelStream = stream::iter(vec![
            Ok(channel()),
            Err(ProviderError::setup(PROVIDER_KEY, "no session")),
        ])
        .boxed();
        let guide = synthesize_guide(channels, GuideWindow { start: at(0), duration_secs: 3600 });
        let entries: Vec<_> = guide.entries.collect().await;

        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_ok());
        assert!(matches!(entries[1], Err(ProviderError::Setup { .. })));
    }
}
