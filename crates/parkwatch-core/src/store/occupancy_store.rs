// ── Occupancy store ──
//
// Holds exactly one snapshot behind a `watch` channel. Writers swap in a
// whole new `Arc`, so readers only ever see complete snapshots.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;

use crate::model::{OccupancyEntries, OccupancySnapshot};
use crate::stream::SnapshotStream;

/// Shared handle to the current occupancy snapshot.
///
/// Cheaply cloneable. The feed pump is the only writer; every other
/// clone reads or subscribes.
#[derive(Clone)]
pub struct OccupancyStore {
    inner: Arc<watch::Sender<Arc<OccupancySnapshot>>>,
}

impl OccupancyStore {
    /// A store holding the empty startup snapshot.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(OccupancySnapshot::empty()));
        Self {
            inner: Arc::new(tx),
        }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<OccupancySnapshot> {
        self.inner.borrow().clone()
    }

    pub fn version(&self) -> u64 {
        self.inner.borrow().version()
    }

    /// Replace the snapshot wholesale. Returns the new version.
    ///
    /// Nothing from the previous snapshot survives; keys missing from
    /// `entries` are gone.
    pub fn replace(&self, entries: OccupancyEntries) -> u64 {
        let mut version = 0;
        self.inner.send_modify(|current| {
            version = current.version() + 1;
            *current = Arc::new(OccupancySnapshot::stamped(entries, version, Utc::now()));
        });
        version
    }

    /// Subscribe to snapshot replacements.
    pub fn subscribe(&self) -> SnapshotStream {
        SnapshotStream::new(self.inner.subscribe())
    }
}

impl Default for OccupancyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn entries(pairs: &[(&str, &str)]) -> OccupancyEntries {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn starts_empty_at_version_zero() {
        let store = OccupancyStore::new();
        assert_eq!(store.version(), 0);
        assert!(store.snapshot().is_empty());
        assert!(store.snapshot().received_at().is_none());
    }

    #[test]
    fn replace_is_wholesale() {
        let store = OccupancyStore::new();
        store.replace(entries(&[("par1.mp4/1", "1"), ("par1.mp4/2", "0")]));
        let v = store.replace(entries(&[("par2.mp4/1", "1")]));

        let snap = store.snapshot();
        assert_eq!(v, 2);
        assert_eq!(snap.version(), 2);
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.flag("par1.mp4/1"), None);
        assert_eq!(snap.flag("par2.mp4/1"), Some("1"));
        assert!(snap.received_at().is_some());
    }

    #[test]
    fn replace_without_subscribers_still_stores() {
        let store = OccupancyStore::new();
        store.replace(entries(&[("a/1", "1")]));
        assert_eq!(store.snapshot().flag("a/1"), Some("1"));
    }

    #[test]
    fn old_snapshot_handles_stay_intact() {
        let store = OccupancyStore::new();
        store.replace(entries(&[("a/1", "1")]));
        let before = store.snapshot();
        store.replace(entries(&[("a/1", "0")]));

        assert_eq!(before.flag("a/1"), Some("1"));
        assert_eq!(store.snapshot().flag("a/1"), Some("0"));
    }

    #[tokio::test]
    async fn subscribers_see_each_replacement() {
        let store = OccupancyStore::new();
        let mut stream = store.subscribe();
        assert_eq!(stream.current().version(), 0);

        store.replace(entries(&[("a/1", "1")]));
        let snap = stream.changed().await.unwrap();
        assert_eq!(snap.version(), 1);
        assert_eq!(stream.current().version(), 1);
    }
}
