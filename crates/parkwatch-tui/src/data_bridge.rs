//! Data bridge: owns the feed client's lifetime and forwards snapshots,
//! connection state and notices into the action loop.

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use parkwatch_core::{ConnectionState, FeedClient};

use crate::action::{Action, Notification};

/// Start the feed and forward its output until `cancel` fires, then stop
/// the feed.
///
/// Subscriptions are taken before `start()` so nothing the feed publishes
/// early is missed.
pub async fn run_data_bridge(
    client: FeedClient,
    action_tx: mpsc::UnboundedSender<Action>,
    cancel: CancellationToken,
) {
    let mut snapshots = client.store().subscribe();
    let mut state = client.connection_state();
    let mut notices = client.notices();

    let _ = action_tx.send(Action::SnapshotUpdated(snapshots.current().clone()));

    if let Err(e) = client.start().await {
        warn!(error = %e, "feed could not be started");
        let _ = action_tx.send(Action::ConnectionChanged(ConnectionState::Failed));
        let _ = action_tx.send(Action::Notify(Notification::error(format!(
            "Feed unavailable: {e}"
        ))));
        cancel.cancelled().await;
        client.stop().await;
        return;
    }

    let _ = action_tx.send(Action::ConnectionChanged(state.borrow_and_update().clone()));

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            Some(snapshot) = snapshots.changed() => {
                debug!(version = snapshot.version(), "Dispatching SnapshotUpdated");
                let _ = action_tx.send(Action::SnapshotUpdated(snapshot));
            }
            Ok(()) = state.changed() => {
                let current = state.borrow_and_update().clone();
                if current == ConnectionState::Failed {
                    let _ = action_tx.send(Action::Notify(Notification::error(
                        "Feed gave up reconnecting",
                    )));
                }
                let _ = action_tx.send(Action::ConnectionChanged(current));
            }
            notice = notices.recv() => match notice {
                Ok(notice) => {
                    let _ = action_tx.send(Action::Notify(notice.into()));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "notice receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    client.stop().await;
    debug!("data bridge shut down");
}
