use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,

    // Redis (optional shared session cache)
    pub redis_url: Option<String>,

    // Upstream fetching
    pub user_agent: String,
    pub fetch_timeout_ms: u64,
    pub fetch_concurrency: usize,

    // Session cache
    pub session_cache_ttl_seconds: u64,
    pub session_cache_max_entries: usize,
    pub cache_sweep_interval_secs: u64,

    // Xumo
    pub xumo_landing_url: String,
    pub xumo_base_url: String,
    pub xumo_image_base_url: String,

    // Stirr
    pub stirr_base_url: String,
    pub stirr_station_selection_url: String,
    pub stirr_lineups: Vec<String>,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Split a comma-separated lineup list, falling back to the default lineup
pub fn parse_lineups(raw: Option<&str>) -> Vec<String> {
    let lineups: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();

    if lineups.is_empty() {
        vec![crate::services::stirr::DEFAULT_LINEUP.to_string()]
    } else {
        lineups
    }
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            // Server
            port: parsed_or("PORT", 3001),

            // Redis
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),

            // Upstream fetching - landing pages reject non-browser agents
            user_agent: var_or("USER_AGENT", "Mozilla/5.0"),
            fetch_timeout_ms: parsed_or("FETCH_TIMEOUT_MS", 30_000),
            fetch_concurrency: parsed_or("FETCH_CONCURRENCY", 4usize).max(1),

            // Session cache
            session_cache_ttl_seconds: parsed_or("SESSION_CACHE_TTL_SECONDS", 43_200), // 12 hours
            session_cache_max_entries: parsed_or("SESSION_CACHE_MAX_ENTRIES", 64),
            cache_sweep_interval_secs: parsed_or("CACHE_SWEEP_INTERVAL_SECS", 3600),

            // Xumo
            xumo_landing_url: var_or("XUMO_LANDING_URL", "http://www.xumo.tv"),
            xumo_base_url: var_or("XUMO_BASE_URL", "https://valencia-app-mds.xumo.com/v2/"),
            xumo_image_base_url: var_or("XUMO_IMAGE_BASE_URL", "https://image.xumo.com/v1/"),

            // Stirr
            stirr_base_url: var_or(
                "STIRR_BASE_URL",
                "https://ott-gateway-stirr.sinclairstoryline.com/api/rest/v3/",
            ),
            stirr_station_selection_url: var_or(
                "STIRR_STATION_SELECTION_URL",
                "https://ott-stationselection.sinclairstoryline.com/stationAutoSelection",
            ),
            stirr_lineups: parse_lineups(env::var("STIRR_LINEUPS").ok().as_deref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lineups() {
        assert_eq!(parse_lineups(None), vec!["national"]);
        assert_eq!(parse_lineups(Some(" , ")), vec!["national"]);
        assert_eq!(parse_lineups(Some("national, wjla ,kutv")), vec!["national", "wjla", "kutv"]);
    }
}
