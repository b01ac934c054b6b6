// ── Reactive snapshot stream ──
//
// Subscription type for consuming occupancy replacements from the store.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::OccupancySnapshot;

/// A subscription to the occupancy store.
///
/// Provides both point-in-time snapshot access and change notification
/// via [`changed()`](Self::changed) or by converting to a `Stream`.
pub struct SnapshotStream {
    current: Arc<OccupancySnapshot>,
    receiver: watch::Receiver<Arc<OccupancySnapshot>>,
}

impl SnapshotStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<OccupancySnapshot>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The snapshot seen most recently through this subscription.
    pub fn current(&self) -> &Arc<OccupancySnapshot> {
        &self.current
    }

    /// The store's snapshot right now (may be newer than `current`).
    pub fn latest(&self) -> Arc<OccupancySnapshot> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next replacement, returning the new snapshot.
    /// Returns `None` once every store handle has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<OccupancySnapshot>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream`. Yields the current snapshot first, then
    /// one item per replacement (intermediate ones may be coalesced).
    pub fn into_stream(self) -> SnapshotWatchStream {
        SnapshotWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
pub struct SnapshotWatchStream {
    inner: WatchStream<Arc<OccupancySnapshot>>,
}

impl Stream for SnapshotWatchStream {
    type Item = Arc<OccupancySnapshot>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
