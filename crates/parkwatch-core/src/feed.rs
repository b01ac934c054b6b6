// ── Feed client ──
//
// Lifecycle for the occupancy feed: acquire the subscription, pump
// transport events into the store, publish connection state, and tear it
// all down again on stop.

use std::sync::Arc;

use parkwatch_api::{FeedEvent, FeedHandle};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::error::CoreError;
use crate::model::parse_payload;
use crate::store::OccupancyStore;

const NOTICE_CHANNEL_SIZE: usize = 64;

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed,
}

// ── FeedNotice ───────────────────────────────────────────────────

/// Out-of-band conditions worth telling the user about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedNotice {
    /// A snapshot event arrived but could not be applied. The store
    /// keeps its previous snapshot.
    MalformedPayload { reason: String },
    /// An established connection dropped.
    ConnectionLost { reason: String },
}

// ── FeedClient ───────────────────────────────────────────────────

/// The single writer of the [`OccupancyStore`].
///
/// Cheaply cloneable via `Arc<FeedClientInner>`. Does nothing until
/// [`start()`](Self::start); [`stop()`](Self::stop) is final.
#[derive(Clone)]
pub struct FeedClient {
    inner: Arc<FeedClientInner>,
}

struct FeedClientInner {
    config: FeedConfig,
    store: OccupancyStore,
    connection_state: watch::Sender<ConnectionState>,
    notice_tx: broadcast::Sender<FeedNotice>,
    cancel: CancellationToken,
    handle: Mutex<Option<FeedHandle>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl FeedClient {
    pub fn new(config: FeedConfig, store: OccupancyStore) -> Self {
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let (notice_tx, _) = broadcast::channel(NOTICE_CHANNEL_SIZE);

        Self {
            inner: Arc::new(FeedClientInner {
                config,
                store,
                connection_state,
                notice_tx,
                cancel: CancellationToken::new(),
                handle: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &OccupancyStore {
        &self.inner.store
    }

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    /// Subscribe to user-facing notices.
    pub fn notices(&self) -> broadcast::Receiver<FeedNotice> {
        self.inner.notice_tx.subscribe()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Open the connection and start applying snapshots.
    ///
    /// Only endpoint validation fails here; a server that is down shows
    /// up as [`ConnectionState::Reconnecting`]. Calling `start` on a
    /// running client is a no-op.
    pub async fn start(&self) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::Internal(
                "feed client was stopped and cannot be restarted".into(),
            ));
        }

        let mut handles = self.inner.task_handles.lock().await;
        if !handles.is_empty() {
            debug!("feed already started");
            return Ok(());
        }

        self.inner
            .connection_state
            .send_replace(ConnectionState::Connecting);

        let config = &self.inner.config;
        let mut feed = match FeedHandle::connect(
            &config.endpoint,
            config.options(),
            config.reconnect.clone(),
            self.inner.cancel.child_token(),
        ) {
            Ok(feed) => feed,
            Err(e) => {
                self.inner.connection_state.send_replace(ConnectionState::Failed);
                return Err(e.into());
            }
        };

        let events = feed.subscribe();
        *self.inner.handle.lock().await = Some(feed);

        let client = self.clone();
        handles.push(tokio::spawn(pump_task(client, events)));

        info!(endpoint = %config.endpoint, event = %config.event, "feed started");
        Ok(())
    }

    /// Unsubscribe, close the connection and join the background tasks.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();

        if let Some(feed) = self.inner.handle.lock().await.take() {
            feed.shutdown();
            feed.join().await;
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        self.inner
            .connection_state
            .send_replace(ConnectionState::Disconnected);
        debug!("feed stopped");
    }

    fn apply(&self, event: FeedEvent) {
        apply_feed_event(
            &self.inner.store,
            &self.inner.connection_state,
            &self.inner.notice_tx,
            event,
        );
    }
}

// ── Background pump ──────────────────────────────────────────────

async fn pump_task(client: FeedClient, mut events: broadcast::Receiver<FeedEvent>) {
    let cancel = client.inner.cancel.clone();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(event) => client.apply(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "feed pump lagged behind transport");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    debug!("feed pump exiting");
}

/// Fold one transport event into store, state and notices.
fn apply_feed_event(
    store: &OccupancyStore,
    state: &watch::Sender<ConnectionState>,
    notices: &broadcast::Sender<FeedNotice>,
    event: FeedEvent,
) {
    match event {
        FeedEvent::Connected { sid } => {
            info!(sid, "feed connected");
            state.send_replace(ConnectionState::Connected);
        }
        FeedEvent::Event { name, payload } => match parse_payload(&payload) {
            Ok(entries) => {
                let spots = entries.len();
                let version = store.replace(entries);
                debug!(event = %name, spots, version, "snapshot replaced");
            }
            Err(e) => {
                warn!(event = %name, error = %e, "discarding malformed snapshot");
                let _ = notices.send(FeedNotice::MalformedPayload {
                    reason: e.to_string(),
                });
            }
        },
        FeedEvent::Malformed { reason } => {
            warn!(reason, "discarding malformed snapshot");
            let _ = notices.send(FeedNotice::MalformedPayload { reason });
        }
        FeedEvent::Disconnected { reason } => {
            warn!(reason, "feed disconnected");
            state.send_replace(ConnectionState::Disconnected);
            let _ = notices.send(FeedNotice::ConnectionLost { reason });
        }
        FeedEvent::Reconnecting { attempt, delay } => {
            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            debug!(attempt, delay_ms, "feed reconnecting");
            state.send_replace(ConnectionState::Reconnecting { attempt });
        }
        FeedEvent::GaveUp => {
            warn!("feed gave up reconnecting");
            state.send_replace(ConnectionState::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json::json;
    use url::Url;

    use super::*;

    struct Harness {
        store: OccupancyStore,
        state: watch::Sender<ConnectionState>,
        notices: broadcast::Sender<FeedNotice>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                store: OccupancyStore::new(),
                state: watch::channel(ConnectionState::Connecting).0,
                notices: broadcast::channel(8).0,
            }
        }

        fn apply(&self, event: FeedEvent) {
            apply_feed_event(&self.store, &self.state, &self.notices, event);
        }
    }

    #[test]
    fn snapshot_event_replaces_store() {
        let h = Harness::new();
        h.apply(FeedEvent::Event {
            name: "update_data".into(),
            payload: json!({"par1.mp4/1": "1", "par1.mp4/2": "0"}),
        });
        h.apply(FeedEvent::Event {
            name: "update_data".into(),
            payload: json!({"par2.mp4/1": "1"}),
        });

        let snap = h.store.snapshot();
        assert_eq!(snap.version(), 2);
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.flag("par1.mp4/1"), None);
    }

    #[test]
    fn malformed_payload_keeps_previous_snapshot() {
        let h = Harness::new();
        let mut notices = h.notices.subscribe();
        h.apply(FeedEvent::Event {
            name: "update_data".into(),
            payload: json!({"par1.mp4/1": "1"}),
        });
        h.apply(FeedEvent::Event {
            name: "update_data".into(),
            payload: json!(["not", "an", "object"]),
        });

        assert_eq!(h.store.version(), 1);
        assert_eq!(h.store.snapshot().flag("par1.mp4/1"), Some("1"));
        assert!(matches!(
            notices.try_recv().unwrap(),
            FeedNotice::MalformedPayload { .. }
        ));
    }

    #[test]
    fn transport_malformed_becomes_notice() {
        let h = Harness::new();
        let mut notices = h.notices.subscribe();
        h.apply(FeedEvent::Malformed {
            reason: "event 'update_data' carried no payload".into(),
        });
        assert_eq!(
            notices.try_recv().unwrap(),
            FeedNotice::MalformedPayload {
                reason: "event 'update_data' carried no payload".into()
            }
        );
        assert_eq!(h.store.version(), 0);
    }

    #[test]
    fn connection_events_drive_state() {
        let h = Harness::new();
        let rx = h.state.subscribe();
        let mut notices = h.notices.subscribe();

        h.apply(FeedEvent::Connected { sid: "s".into() });
        assert_eq!(*rx.borrow(), ConnectionState::Connected);

        h.apply(FeedEvent::Disconnected {
            reason: "gone".into(),
        });
        assert_eq!(*rx.borrow(), ConnectionState::Disconnected);
        assert_eq!(
            notices.try_recv().unwrap(),
            FeedNotice::ConnectionLost {
                reason: "gone".into()
            }
        );

        h.apply(FeedEvent::Reconnecting {
            attempt: 3,
            delay: Duration::from_secs(2),
        });
        assert_eq!(*rx.borrow(), ConnectionState::Reconnecting { attempt: 3 });

        h.apply(FeedEvent::GaveUp);
        assert_eq!(*rx.borrow(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn start_rejects_unsupported_endpoint() {
        let config = FeedConfig::new(Url::parse("ftp://localhost:21").unwrap());
        let client = FeedClient::new(config, OccupancyStore::new());

        let err = client.start().await.unwrap_err();
        assert!(matches!(err, CoreError::Config { .. }));
        assert_eq!(*client.connection_state().borrow(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn stop_is_final() {
        let config = FeedConfig::new(Url::parse("http://127.0.0.1:9").unwrap()).with_reconnect(
            Duration::from_millis(10),
            Duration::from_millis(20),
            None,
        );
        let client = FeedClient::new(config, OccupancyStore::new());

        client.start().await.unwrap();
        client.stop().await;
        assert_eq!(
            *client.connection_state().borrow(),
            ConnectionState::Disconnected
        );
        assert!(matches!(client.start().await, Err(CoreError::Internal(_))));
    }
}
