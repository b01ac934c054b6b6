//! Socket.IO event feed with auto-reconnect.
//!
//! Connects to a Socket.IO server over its WebSocket transport, answers
//! heartbeats, and streams the subscribed event through a
//! [`tokio::sync::broadcast`] channel. Handles reconnection with
//! exponential backoff + jitter automatically.
//!
//! # Example
//!
//! ```rust,ignore
//! use parkwatch_api::{FeedHandle, FeedOptions, ReconnectConfig};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let cancel = CancellationToken::new();
//! let endpoint = Url::parse("http://localhost:5000")?;
//!
//! let mut handle = FeedHandle::connect(&endpoint, FeedOptions::default(), ReconnectConfig::default(), cancel.clone())?;
//! let mut rx = handle.subscribe();
//!
//! while let Ok(event) = rx.recv().await {
//!     println!("{event:?}");
//! }
//!
//! handle.shutdown();
//! ```

use std::fmt::Display;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, protocol::frame::coding::CloseCode};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::protocol::{DEFAULT_NAMESPACE, ENGINE_IO_VERSION, EnginePacket, Handshake, SocketPacket};

// ── Constants ────────────────────────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long to wait for the Engine.IO open packet after the upgrade.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

// ── FeedEvent ────────────────────────────────────────────────────────

/// Everything the feed reports to its subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// The namespace connect was acknowledged.
    Connected { sid: String },

    /// The subscribed event arrived; `payload` is its first argument.
    Event { name: String, payload: Value },

    /// The subscribed event arrived without a usable payload.
    Malformed { reason: String },

    /// An established session ended.
    Disconnected { reason: String },

    /// Waiting `delay` before reconnection attempt number `attempt`.
    Reconnecting { attempt: u32, delay: Duration },

    /// Reconnection stopped; no further events will follow.
    GaveUp,
}

// ── FeedOptions ──────────────────────────────────────────────────────

/// What to subscribe to once connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedOptions {
    /// Event name carrying the snapshot. Default: `update_data`.
    pub event: String,

    /// Socket.IO namespace. Default: `/`.
    pub namespace: String,

    /// Engine.IO request path. Default: `/socket.io/`.
    pub path: String,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            event: "update_data".into(),
            namespace: DEFAULT_NAMESPACE.into(),
            path: "/socket.io/".into(),
        }
    }
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 5s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            max_retries: None,
        }
    }
}

// ── URL construction ─────────────────────────────────────────────────

/// Turn an HTTP(S) endpoint into the Engine.IO WebSocket URL.
///
/// `http://localhost:5000` becomes
/// `ws://localhost:5000/socket.io/?EIO=4&transport=websocket`.
pub fn socket_io_url(endpoint: &Url, path: &str) -> Result<Url, Error> {
    let scheme = match endpoint.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(Error::UnsupportedScheme(other.to_owned())),
    };

    let mut url = endpoint.clone();
    url.set_scheme(scheme)
        .map_err(|()| Error::UnsupportedScheme(endpoint.scheme().to_owned()))?;

    if path.starts_with('/') {
        url.set_path(path);
    } else {
        url.set_path(&format!("/{path}"));
    }

    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", &ENGINE_IO_VERSION.to_string())
        .append_pair("transport", "websocket");

    Ok(url)
}

// ── FeedHandle ───────────────────────────────────────────────────────

/// Handle to a running feed.
///
/// Call [`shutdown`](Self::shutdown) to tear down the background task,
/// then [`join`](Self::join) to wait for the goodbye to be sent.
pub struct FeedHandle {
    event_tx: broadcast::Sender<FeedEvent>,
    initial_rx: Option<broadcast::Receiver<FeedEvent>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl FeedHandle {
    /// Spawn the connection loop for `endpoint`.
    ///
    /// Returns as soon as the background task is spawned; only endpoint
    /// validation can fail here. Connection problems surface as
    /// [`FeedEvent`]s.
    pub fn connect(
        endpoint: &Url,
        options: FeedOptions,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Result<Self, Error> {
        let ws_url = socket_io_url(endpoint, &options.path)?;
        let (event_tx, initial_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let task_tx = event_tx.clone();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            ws_loop(ws_url, options, task_tx, reconnect, task_cancel).await;
        });

        Ok(Self {
            event_tx,
            initial_rx: Some(initial_rx),
            cancel,
            task,
        })
    }

    /// Get a receiver for the event stream.
    ///
    /// The first call returns the receiver created alongside the task, so
    /// it sees every event since [`connect`](Self::connect). Later calls
    /// only see events sent after they subscribe.
    pub fn subscribe(&mut self) -> broadcast::Receiver<FeedEvent> {
        self.initial_rx
            .take()
            .unwrap_or_else(|| self.event_tx.subscribe())
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for the background task to finish.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Feed task ended abnormally");
        }
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on drop, backoff → reconnect.
async fn ws_loop(
    ws_url: Url,
    options: FeedOptions,
    event_tx: broadcast::Sender<FeedEvent>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        let mut session = Session::default();
        let result = connect_and_read(&ws_url, &options, &event_tx, &cancel, &mut session).await;

        if cancel.is_cancelled() {
            break;
        }

        let reason = match result {
            Ok(()) => "connection closed by server".to_owned(),
            Err(e) if !e.is_transient() => {
                tracing::error!(error = %e, "Feed error is not recoverable, giving up");
                if session.connected {
                    let _ = event_tx.send(FeedEvent::Disconnected {
                        reason: e.to_string(),
                    });
                }
                let _ = event_tx.send(FeedEvent::GaveUp);
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "Feed connection error");
                e.to_string()
            }
        };

        if session.connected {
            attempt = 0;
            let _ = event_tx.send(FeedEvent::Disconnected { reason });
        }

        if let Some(max) = reconnect.max_retries {
            if attempt >= max {
                tracing::error!(max_retries = max, "Feed reconnection limit reached, giving up");
                let _ = event_tx.send(FeedEvent::GaveUp);
                break;
            }
        }

        let delay = calculate_backoff(attempt, &reconnect);
        attempt += 1;
        tracing::info!(delay_ms = millis(delay), attempt, "Waiting before reconnect");
        let _ = event_tx.send(FeedEvent::Reconnecting { attempt, delay });

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    tracing::debug!("Feed loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish one WebSocket session and read frames until it drops.
async fn connect_and_read(
    url: &Url,
    options: &FeedOptions,
    event_tx: &broadcast::Sender<FeedEvent>,
    cancel: &CancellationToken,
    session: &mut Session,
) -> Result<(), Error> {
    tracing::info!(url = %url, "Connecting to feed");

    let ws_stream = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(()),
        result = tokio_tungstenite::connect_async(url.as_str()) => {
            result.map_err(|e| Error::WebSocketConnect(e.to_string()))?.0
        }
    };

    tracing::debug!("WebSocket upgraded, awaiting Engine.IO open packet");

    let (mut write, mut read) = ws_stream.split();

    loop {
        let wait = session.read_timeout();

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                say_goodbye(&mut write, &options.namespace).await;
                return Ok(());
            }
            frame = tokio::time::timeout(wait, read.next()) => {
                let Ok(frame) = frame else {
                    return Err(Error::HeartbeatTimeout { timeout_ms: millis(wait) });
                };

                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        tracing::trace!(frame = %text.as_str(), "Feed frame");
                        match handle_frame(text.as_str(), session, options) {
                            Ok(FrameOutcome::Reply(reply)) => send_frame(&mut write, reply).await?,
                            Ok(FrameOutcome::Emit(event)) => {
                                // No subscribers right now is fine
                                let _ = event_tx.send(event);
                            }
                            Ok(FrameOutcome::Closed(reason)) => {
                                tracing::info!(reason, "Feed session closed by server");
                                return Ok(());
                            }
                            Ok(FrameOutcome::Ignore) => {}
                            Err(e @ Error::Handshake(_)) => return Err(e),
                            Err(e) => {
                                tracing::debug!(error = %e, "Skipping unparseable feed frame");
                            }
                        }
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        return match frame {
                            Some(cf) if !matches!(cf.code, CloseCode::Normal | CloseCode::Away) => {
                                Err(Error::WebSocketClosed {
                                    code: u16::from(cf.code),
                                    reason: cf.reason.as_str().to_owned(),
                                })
                            }
                            _ => {
                                tracing::info!("WebSocket close frame received");
                                Ok(())
                            }
                        };
                    }
                    Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                    None => {
                        tracing::info!("WebSocket stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Binary, Ping, Pong, Frame -- tungstenite answers pings itself
                    }
                }
            }
        }
    }
}

async fn send_frame<S>(write: &mut S, frame: String) -> Result<(), Error>
where
    S: Sink<tungstenite::Message> + Unpin,
    S::Error: Display,
{
    tracing::trace!(frame, "Sending feed frame");
    write
        .send(tungstenite::Message::Text(frame.into()))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))
}

/// Leave the namespace and close the socket. Failures only get logged;
/// the session is going away regardless.
async fn say_goodbye<S>(write: &mut S, namespace: &str)
where
    S: Sink<tungstenite::Message> + Unpin,
    S::Error: Display,
{
    let goodbye = SocketPacket::Disconnect {
        namespace: namespace.to_owned(),
    };
    if let Err(e) = send_frame(write, goodbye.to_frame()).await {
        tracing::debug!(error = %e, "Could not send namespace disconnect");
    }
    if let Err(e) = write.close().await {
        tracing::debug!(error = %e, "Could not close WebSocket");
    }
}

// ── Frame handling ───────────────────────────────────────────────────

/// Per-connection protocol state.
#[derive(Debug, Default)]
struct Session {
    handshake: Option<Handshake>,
    connected: bool,
}

impl Session {
    fn read_timeout(&self) -> Duration {
        self.handshake
            .as_ref()
            .map_or(HANDSHAKE_TIMEOUT, Handshake::heartbeat_timeout)
    }
}

#[derive(Debug, PartialEq)]
enum FrameOutcome {
    Reply(String),
    Emit(FeedEvent),
    Closed(String),
    Ignore,
}

/// Decode one text frame and decide what the connection does next.
fn handle_frame(
    text: &str,
    session: &mut Session,
    options: &FeedOptions,
) -> Result<FrameOutcome, Error> {
    match EnginePacket::decode(text)? {
        EnginePacket::Open(handshake) => {
            tracing::debug!(
                sid = %handshake.sid,
                ping_interval = handshake.ping_interval,
                ping_timeout = handshake.ping_timeout,
                "Engine.IO session opened"
            );
            session.handshake = Some(handshake);
            let connect = SocketPacket::Connect {
                namespace: options.namespace.clone(),
                data: None,
            };
            Ok(FrameOutcome::Reply(connect.to_frame()))
        }
        EnginePacket::Ping(data) => Ok(FrameOutcome::Reply(EnginePacket::Pong(data).encode())),
        EnginePacket::Close => Ok(FrameOutcome::Closed("engine close packet".into())),
        EnginePacket::Message(body) => handle_message(&body, session, options),
        EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {
            Ok(FrameOutcome::Ignore)
        }
    }
}

fn handle_message(
    body: &str,
    session: &mut Session,
    options: &FeedOptions,
) -> Result<FrameOutcome, Error> {
    let packet = SocketPacket::decode(body)?;
    if packet.namespace() != options.namespace {
        tracing::trace!(namespace = packet.namespace(), "Packet for another namespace");
        return Ok(FrameOutcome::Ignore);
    }

    match packet {
        SocketPacket::Connect { data, .. } => {
            session.connected = true;
            let sid = data
                .as_ref()
                .and_then(|d| d.get("sid"))
                .and_then(Value::as_str)
                .map(str::to_owned)
                .or_else(|| session.handshake.as_ref().map(|h| h.sid.clone()))
                .unwrap_or_default();
            tracing::info!(sid, namespace = %options.namespace, "Feed connected");
            Ok(FrameOutcome::Emit(FeedEvent::Connected { sid }))
        }
        SocketPacket::ConnectError { data, .. } => {
            let detail = data
                .as_ref()
                .and_then(|d| d.get("message"))
                .and_then(Value::as_str)
                .map_or_else(|| "no reason given".to_owned(), str::to_owned);
            Err(Error::Handshake(format!(
                "namespace '{}' rejected: {detail}",
                options.namespace
            )))
        }
        SocketPacket::Disconnect { .. } => {
            Ok(FrameOutcome::Closed("namespace disconnected by server".into()))
        }
        SocketPacket::Event { name, mut args, .. } if name == options.event => {
            if args.is_empty() {
                tracing::warn!(event = %name, "Subscribed event carried no payload");
                return Ok(FrameOutcome::Emit(FeedEvent::Malformed {
                    reason: format!("event '{name}' carried no payload"),
                }));
            }
            let payload = args.swap_remove(0);
            Ok(FrameOutcome::Emit(FeedEvent::Event { name, payload }))
        }
        SocketPacket::Event { name, .. } => {
            tracing::trace!(event = %name, "Ignoring unsubscribed event");
            Ok(FrameOutcome::Ignore)
        }
        SocketPacket::Ack { .. } | SocketPacket::Binary => Ok(FrameOutcome::Ignore),
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25%, seeded from the attempt number.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    const OPEN: &str = r#"0{"sid":"eio-1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;

    fn opened_session() -> Session {
        let mut session = Session::default();
        handle_frame(OPEN, &mut session, &FeedOptions::default()).unwrap();
        session
    }

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(5));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig {
            max_delay: Duration::from_secs(60),
            ..ReconnectConfig::default()
        };

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig::default();

        let d10 = calculate_backoff(10, &config);
        // Jitter factor tops out at 1.25
        assert!(
            d10 <= Duration::from_millis(6250),
            "delay at attempt 10 ({d10:?}) should be capped near max_delay"
        );
        assert!(calculate_backoff(u32::MAX, &config) <= Duration::from_millis(6250));
    }

    #[test]
    fn socket_io_url_from_http_endpoint() {
        let endpoint = Url::parse("http://localhost:5000").unwrap();
        let url = socket_io_url(&endpoint, "/socket.io/").unwrap();
        assert_eq!(
            url.as_str(),
            "ws://localhost:5000/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn socket_io_url_secure_and_custom_path() {
        let endpoint = Url::parse("https://parking.example.com/?token=x").unwrap();
        let url = socket_io_url(&endpoint, "live/").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://parking.example.com/live/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn socket_io_url_rejects_other_schemes() {
        let endpoint = Url::parse("ftp://example.com").unwrap();
        let err = socket_io_url(&endpoint, "/socket.io/").unwrap_err();
        assert!(matches!(err, Error::UnsupportedScheme(s) if s == "ftp"));
    }

    #[test]
    fn open_packet_replies_with_namespace_connect() {
        let mut session = Session::default();
        assert_eq!(session.read_timeout(), HANDSHAKE_TIMEOUT);

        let options = FeedOptions {
            namespace: "/lots".into(),
            ..FeedOptions::default()
        };
        let outcome = handle_frame(OPEN, &mut session, &options).unwrap();

        assert_eq!(outcome, FrameOutcome::Reply("40/lots,".into()));
        assert_eq!(session.read_timeout(), Duration::from_secs(45));
        assert!(!session.connected);
    }

    #[test]
    fn ping_is_answered_with_pong() {
        let mut session = opened_session();
        let outcome = handle_frame("2", &mut session, &FeedOptions::default()).unwrap();
        assert_eq!(outcome, FrameOutcome::Reply("3".into()));
    }

    #[test]
    fn namespace_connect_marks_session_connected() {
        let mut session = opened_session();
        let outcome =
            handle_frame(r#"40{"sid":"sock-9"}"#, &mut session, &FeedOptions::default()).unwrap();

        assert!(session.connected);
        assert_eq!(
            outcome,
            FrameOutcome::Emit(FeedEvent::Connected {
                sid: "sock-9".into()
            })
        );
    }

    #[test]
    fn subscribed_event_is_emitted_with_first_argument() {
        let mut session = opened_session();
        let outcome = handle_frame(
            r#"42["update_data",{"par1.mp4/1":"1","par1.mp4/2":"0"}]"#,
            &mut session,
            &FeedOptions::default(),
        )
        .unwrap();

        assert_eq!(
            outcome,
            FrameOutcome::Emit(FeedEvent::Event {
                name: "update_data".into(),
                payload: json!({"par1.mp4/1": "1", "par1.mp4/2": "0"}),
            })
        );
    }

    #[test]
    fn other_events_and_namespaces_are_ignored() {
        let mut session = opened_session();
        let options = FeedOptions::default();

        let other_event = handle_frame(r#"42["chat",{"m":1}]"#, &mut session, &options).unwrap();
        assert_eq!(other_event, FrameOutcome::Ignore);

        let other_ns =
            handle_frame(r#"42/admin,["update_data",{}]"#, &mut session, &options).unwrap();
        assert_eq!(other_ns, FrameOutcome::Ignore);
    }

    #[test]
    fn event_without_payload_is_malformed() {
        let mut session = opened_session();
        let outcome =
            handle_frame(r#"42["update_data"]"#, &mut session, &FeedOptions::default()).unwrap();
        assert!(matches!(
            outcome,
            FrameOutcome::Emit(FeedEvent::Malformed { .. })
        ));
    }

    #[test]
    fn connect_error_is_a_handshake_failure() {
        let mut session = opened_session();
        let err = handle_frame(
            r#"44{"message":"Not authorized"}"#,
            &mut session,
            &FeedOptions::default(),
        )
        .unwrap_err();

        assert!(matches!(err, Error::Handshake(msg) if msg.contains("Not authorized")));
    }

    #[test]
    fn server_close_and_disconnect_end_the_session() {
        let mut session = opened_session();
        let options = FeedOptions::default();
        assert!(matches!(
            handle_frame("1", &mut session, &options).unwrap(),
            FrameOutcome::Closed(_)
        ));
        assert!(matches!(
            handle_frame("41", &mut session, &options).unwrap(),
            FrameOutcome::Closed(_)
        ));
    }

    #[test]
    fn garbage_frames_are_errors_not_panics() {
        let mut session = opened_session();
        let options = FeedOptions::default();
        assert!(handle_frame("", &mut session, &options).is_err());
        assert!(handle_frame("42not json", &mut session, &options).is_err());
        assert!(handle_frame("x", &mut session, &options).is_err());
    }
}
