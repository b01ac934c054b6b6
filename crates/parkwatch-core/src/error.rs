// ── Core error types ──
//
// User-facing errors from parkwatch-core. Consumers never see WebSocket
// close codes or Engine.IO framing failures directly; the
// `From<parkwatch_api::Error>` impl translates them into domain variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to feed at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Feed disconnected: {reason}")]
    FeedDisconnected { reason: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Malformed occupancy payload: {reason}")]
    MalformedPayload { reason: String },

    #[error("Site not found: {id}")]
    SiteNotFound { id: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<parkwatch_api::Error> for CoreError {
    fn from(err: parkwatch_api::Error) -> Self {
        use parkwatch_api::Error as Api;

        match err {
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid feed endpoint: {e}"),
            },
            Api::UnsupportedScheme(scheme) => CoreError::Config {
                message: format!("Feed endpoint scheme '{scheme}' is not supported"),
            },
            Api::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason,
            },
            Api::WebSocketClosed { code, reason } => CoreError::FeedDisconnected {
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            Api::Handshake(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("handshake failed: {reason}"),
            },
            Api::HeartbeatTimeout { timeout_ms } => CoreError::FeedDisconnected {
                reason: format!("no heartbeat within {timeout_ms}ms"),
            },
            Api::Protocol(msg) => CoreError::Internal(format!("Feed protocol error: {msg}")),
            Api::Deserialization { message, body: _ } => {
                CoreError::MalformedPayload { reason: message }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_map_to_domain_variants() {
        let err: CoreError = parkwatch_api::Error::HeartbeatTimeout { timeout_ms: 45_000 }.into();
        assert!(matches!(err, CoreError::FeedDisconnected { .. }));

        let err: CoreError = parkwatch_api::Error::UnsupportedScheme("ftp".into()).into();
        assert!(matches!(err, CoreError::Config { .. }));

        let err: CoreError = parkwatch_api::Error::Deserialization {
            message: "expected value".into(),
            body: "{".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Malformed occupancy payload: expected value");
    }
}
