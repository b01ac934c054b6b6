use thiserror::Error;

/// Top-level error type for the `parkwatch-api` crate.
///
/// Covers every failure mode of the feed transport: endpoint parsing,
/// WebSocket connectivity, the Engine.IO handshake and heartbeat, and
/// Socket.IO packet decoding. `parkwatch-core` maps these into
/// user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Endpoint ────────────────────────────────────────────────────
    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The endpoint scheme cannot carry a WebSocket connection.
    #[error("Unsupported endpoint scheme '{0}' (expected http, https, ws or wss)")]
    UnsupportedScheme(String),

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed with a non-normal close code.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    // ── Engine.IO / Socket.IO ───────────────────────────────────────
    /// The server rejected or garbled the session handshake.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// A frame violated the Engine.IO / Socket.IO framing rules.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No packet (not even a ping) arrived within the negotiated window.
    #[error("No heartbeat from server within {timeout_ms}ms")]
    HeartbeatTimeout { timeout_ms: u64 },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth reconnecting over.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::WebSocketConnect(_) | Self::WebSocketClosed { .. } | Self::HeartbeatTimeout { .. }
        )
    }

    /// Build a [`Deserialization`](Self::Deserialization) error from a
    /// `serde_json` failure, keeping the offending body.
    pub(crate) fn deserialization(err: &serde_json::Error, body: &str) -> Self {
        Self::Deserialization {
            message: err.to_string(),
            body: body.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::WebSocketConnect("refused".into()).is_transient());
        assert!(Error::HeartbeatTimeout { timeout_ms: 45_000 }.is_transient());
        assert!(!Error::Handshake("not authorized".into()).is_transient());
        assert!(!Error::UnsupportedScheme("ftp".into()).is_transient());
    }
}
