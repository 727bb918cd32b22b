//! Client configuration.
//!
//! Defaults match the public deployment of the room server: one HTTP API
//! for rooms and autocomplete, one WebSocket endpoint per room.

use std::time::Duration;

use reqwest::Url;

/// Environment variable overriding [`ClientConfig::ws_base_url`].
pub const ENV_WS_URL: &str = "LIVECODE_WS_URL";
/// Environment variable overriding [`ClientConfig::api_base_url`].
pub const ENV_API_URL: &str = "LIVECODE_API_URL";

/// Sync client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// WebSocket base address; the room id is appended as a path segment.
    pub ws_base_url: String,
    /// HTTP base address of the room and autocomplete API.
    pub api_base_url: String,
    /// Fixed delay before reconnecting after an unsolicited close.
    pub reconnect_delay: Duration,
    /// Quiet period after the last edit before a suggestion is requested.
    pub suggestion_debounce: Duration,
    /// How long an applied suggestion stays visible.
    pub suggestion_hide_after: Duration,
    /// Suggestions at or below this confidence are ignored.
    pub suggestion_min_confidence: f64,
    /// Maximum retained activity entries
    pub activity_capacity: usize,
    /// Entries in the most-recent-first display view
    pub activity_view_len: usize,
    /// Language tag for sessions that don't carry one
    pub default_language: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_base_url: "ws://localhost:8000/ws".to_string(),
            api_base_url: "http://localhost:8000/api".to_string(),
            reconnect_delay: Duration::from_millis(3000),
            suggestion_debounce: Duration::from_millis(600),
            suggestion_hide_after: Duration::from_millis(5000),
            suggestion_min_confidence: 0.5,
            activity_capacity: 100,
            activity_view_len: 20,
            default_language: "python".to_string(),
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with `LIVECODE_WS_URL` / `LIVECODE_API_URL`.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(ENV_WS_URL).filter(|v| !v.trim().is_empty()) {
            log::debug!("Using {ENV_WS_URL}={url}");
            self.ws_base_url = url;
        }
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            log::debug!("Using {ENV_API_URL}={url}");
            self.api_base_url = url;
        }
        self
    }

    /// Transport endpoint for a room. The id is encoded as one path segment.
    pub fn room_url(&self, session_id: &str) -> String {
        append_segments(&self.ws_base_url, &[session_id])
    }

    /// API address of one room (`rooms/{id}`), the id encoded as one segment.
    pub fn room_api_url(&self, room_id: &str) -> String {
        append_segments(&self.api_base_url, &["rooms", room_id])
    }

    /// Absolute URL of an API path such as `rooms/abc`.
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Append percent-encoded path segments to `base`.
fn append_segments(base: &str, segments: &[&str]) -> String {
    let mut url = match Url::parse(base) {
        Ok(url) => url,
        Err(e) => {
            log::warn!("Base address {base} is not a valid URL: {e}");
            return format!("{}/{}", base.trim_end_matches('/'), segments.join("/"));
        }
    };
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url.into()
}
