// ── Runtime feed configuration ──
//
// Describes *where* the occupancy feed lives and how to stay connected.
// Never touches disk; parkwatch-config builds a `FeedConfig` and hands
// it in.

use std::time::Duration;

use parkwatch_api::{FeedOptions, ReconnectConfig};
use url::Url;

/// Backend the dashboard connects to when nothing else is configured.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:5000";

/// Event name carrying the occupancy snapshot.
pub const DEFAULT_EVENT: &str = "update_data";

/// Connection settings for the occupancy feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// HTTP(S) base URL of the Socket.IO server.
    pub endpoint: Url,
    pub event: String,
    pub namespace: String,
    /// Engine.IO request path.
    pub path: String,
    pub reconnect: ReconnectConfig,
}

impl FeedConfig {
    /// Defaults for everything but the endpoint.
    pub fn new(endpoint: Url) -> Self {
        let options = FeedOptions::default();
        Self {
            endpoint,
            event: options.event,
            namespace: options.namespace,
            path: options.path,
            reconnect: ReconnectConfig::default(),
        }
    }

    pub fn with_reconnect(mut self, initial: Duration, max: Duration, retries: Option<u32>) -> Self {
        self.reconnect = ReconnectConfig {
            initial_delay: initial,
            max_delay: max,
            max_retries: retries,
        };
        self
    }

    pub(crate) fn options(&self) -> FeedOptions {
        FeedOptions {
            event: self.event.clone(),
            namespace: self.namespace.clone(),
            path: self.path.clone(),
        }
    }
}
