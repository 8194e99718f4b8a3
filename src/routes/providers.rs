use async_stream::stream;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::{Airing, Channel, GuideEntry, GuideWindow, ProviderInfo};
use crate::services::provider::{collect_channels, ProviderError};
use crate::AppState;

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(e: ProviderError) -> ApiError {
    let status = match e {
        ProviderError::UnknownProvider(_) => StatusCode::NOT_FOUND,
        ProviderError::Setup { .. } | ProviderError::Feed(_) => StatusCode::BAD_GATEWAY,
    };
    if status == StatusCode::BAD_GATEWAY {
        tracing::error!("Provider request failed: {}", e);
    }
    (status, Json(serde_json::json!({ "error": e.to_string() })))
}

#[derive(Serialize)]
pub struct ProvidersResponse {
    pub providers: Vec<ProviderInfo>,
}

#[derive(Serialize)]
pub struct ChannelsResponse {
    pub total: usize,
    pub channels: Vec<Channel>,
}

/// Guide query parameters
#[derive(Debug, Default, Deserialize)]
pub struct GuideQuery {
    /// Window start as a unix timestamp
    pub start: Option<i64>,
    /// Window length in seconds
    pub duration: Option<u64>,
}

/// One NDJSON line of a streamed guide
#[derive(Serialize)]
struct GuideLine {
    channel: Channel,
    airings: Vec<Airing>,
}

async fn render_entry(entry: GuideEntry) -> serde_json::Result<Vec<u8>> {
    let airings: Vec<Airing> = entry.airings.collect().await;
    let mut line = serde_json::to_vec(&GuideLine {
        channel: entry.channel,
        airings,
    })?;
    line.push(b'\n');
    Ok(line)
}

/// GET /providers - Registered providers
pub async fn list_providers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ProvidersResponse {
        providers: state.registry.infos(),
    })
}

/// GET /providers/:key/channels - Drain a provider's channel listing
pub async fn get_channels(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let provider = state.registry.get(&key).map_err(api_error)?;
    let channels = collect_channels(provider.channels()).await.map_err(api_error)?;

    tracing::info!(provider = %key, channels = channels.len(), "Served channel listing");

    Ok(Json(ChannelsResponse {
        total: channels.len(),
        channels,
    }))
}

/// GET /providers/:key/guide - Stream the guide as newline-delimited JSON
///
/// Entries and their airings are pulled from upstream while the body is being
/// written. A window longer than the allowed maximum is a 400. A fatal error
/// before the first entry is a 502; after that it ends the body.
pub async fn get_guide(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<GuideQuery>,
) -> Result<Response, ApiError> {
    let provider = state.registry.get(&key).map_err(api_error)?;
    let window = GuideWindow::resolve(query.start, query.duration)
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": e.to_string() }))))?;
    let guide = provider.guide(window);
    tracing::info!(
        provider = %key,
        start = %guide.window.start,
        duration = guide.window.duration_secs,
        "Streaming guide"
    );
    let mut entries = guide.entries;

    let first = match entries.next().await {
        Some(Err(e)) => return Err(api_error(e)),
        first => first,
    };

    let body = stream! {
        let mut next = first;
        while let Some(entry) = next {
            match entry {
                Ok(entry) => match render_entry(entry).await {
                    Ok(line) => yield Ok::<_, std::io::Error>(line),
                    Err(e) => {
                        tracing::error!("Failed to encode guide entry: {}", e);
                        return;
                    }
                },
                Err(e) => {
                    tracing::error!("Guide stream aborted: {}", e);
                    return;
                }
            }
            next = entries.next().await;
        }
    };

    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(body),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Guide;
    use crate::services::cache::SessionCache;
    use crate::services::provider::{ChannelSource, ChannelStream, ProviderRegistry};
    use chrono::{TimeZone, Utc};
    use futures::stream;
    use std::time::Instant;
    use tower::ServiceExt;

    struct StubSource {
        fail: bool,
    }

    impl ChannelSource for StubSource {
        fn info(&self) -> ProviderInfo {
            ProviderInfo {
                key: if self.fail { "broken" } else { "stub" },
                display_name: "Stub",
                supports_channels: true,
                supports_guide: true,
                channel_cache_ttl: 60,
                guide_cache_ttl: 60,
            }
        }

        fn channels(&self) -> ChannelStream {
            if self.fail {
                return stream::iter(vec![Err(ProviderError::setup("broken", "no session"))]).boxed();
            }
            stream::iter(vec![
                Ok(Channel::new("stub.1", "One")),
                Ok(Channel::new("stub.2", "Two")),
                Ok(Channel::new("stub.1", "One again")),
            ])
            .boxed()
        }

        fn guide(&self, window: GuideWindow) -> Guide {
            let entries = self
                .channels()
                .map(move |channel| {
                    channel.map(|channel| {
                        let airing = Airing::new("a", channel.id.clone(), window.start, window.end(), "Block");
                        GuideEntry::new(channel, stream::iter(airing).boxed())
                    })
                })
                .boxed();
            Guide::new(window, entries)
        }
    }

    fn app() -> axum::Router {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(StubSource { fail: false }));
        registry.register(Arc::new(StubSource { fail: true }));

        crate::routes::router(Arc::new(AppState {
            cache: SessionCache::in_memory(4),
            registry,
            start_time: Instant::now(),
        }))
    }

    async fn get(uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app()
            .oneshot(axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_list_providers() {
        let (status, body) = get("/providers").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["providers"][0]["key"], "stub");
        assert_eq!(json["providers"][0]["supportsGuide"], true);
    }

    #[tokio::test]
    async fn test_channels_dedup_and_errors() {
        let (status, body) = get("/providers/stub/channels").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["total"], 2);
        assert_eq!(json["channels"][0]["name"], "One");

        let (status, _) = get("/providers/broken/channels").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, _) = get("/providers/missing/channels").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_guide_streams_ndjson() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap().timestamp();
        let (status, body) = get(&format!("/providers/stub/guide?start={}&duration=3600", start)).await;
        assert_eq!(status, StatusCode::OK);

        let lines: Vec<serde_json::Value> = body
            .split(|b| *b == b'\n')
            .filter(|l| !l.is_empty())
            .map(|l| serde_json::from_slice(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["channel"]["id"], "stub.1");
        assert_eq!(lines[0]["airings"][0]["length"], 3600);

        let (status, _) = get("/providers/broken/guide").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_guide_rejects_oversized_window() {
        let (status, body) = get("/providers/stub/guide?start=0&duration=100000000000000000").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("exceeds"));

        let (status, _) = get(&format!("/providers/stub/guide?duration={}", u64::MAX)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
