//! Client configuration from environment variables.

use anyhow::{bail, Context};
use url::Url;

/// Path of the realtime hub when it is derived from the API base URL.
pub const DEFAULT_REALTIME_PATH: &str = "/hub";

/// Buffer size of the change-notification channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the REST API, e.g. `https://chat.example.com/api`.
    pub api_base_url: String,
    /// WebSocket URL of the realtime hub.
    pub realtime_url: String,
    /// How many undelivered change events a slow subscriber may fall behind by.
    pub event_capacity: usize,
}

impl ClientConfig {
    /// Build a config for `api_base_url`, deriving the realtime URL from it.
    pub fn new(api_base_url: impl Into<String>) -> anyhow::Result<Self> {
        let api_base_url = api_base_url.into();
        let realtime_url = derive_realtime_url(&api_base_url)?;
        Ok(Self {
            api_base_url,
            realtime_url,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        })
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CHATSYNC_API_BASE_URL`: REST API base URL (required)
    /// - `CHATSYNC_REALTIME_URL`: realtime hub URL (default: API origin with a
    ///   `ws`/`wss` scheme and path `/hub`)
    /// - `CHATSYNC_EVENT_CAPACITY`: change-notification buffer (default: 256)
    pub fn from_env() -> anyhow::Result<Self> {
        let api_base_url = std::env::var("CHATSYNC_API_BASE_URL")
            .context("CHATSYNC_API_BASE_URL must be set")?;
        let mut config = Self::new(api_base_url)?;

        if let Ok(realtime_url) = std::env::var("CHATSYNC_REALTIME_URL") {
            config = config.with_realtime_url(realtime_url);
        }

        if let Ok(capacity) = std::env::var("CHATSYNC_EVENT_CAPACITY") {
            let capacity = capacity
                .parse()
                .with_context(|| format!("invalid CHATSYNC_EVENT_CAPACITY: {capacity}"))?;
            config = config.with_event_capacity(capacity);
        }

        Ok(config)
    }

    pub fn with_realtime_url(mut self, realtime_url: impl Into<String>) -> Self {
        self.realtime_url = realtime_url.into();
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

fn derive_realtime_url(api_base_url: &str) -> anyhow::Result<String> {
    let mut url = Url::parse(api_base_url)
        .with_context(|| format!("invalid API base URL: {api_base_url}"))?;

    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => bail!("unsupported API URL scheme: {other}"),
    };
    if url.set_scheme(scheme).is_err() {
        bail!("cannot derive realtime URL from {api_base_url}");
    }
    url.set_path(DEFAULT_REALTIME_PATH);
    url.set_query(None);

    Ok(url.to_string())
}
