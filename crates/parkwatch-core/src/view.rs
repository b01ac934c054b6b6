// ── View controller ──
//
// Joins the occupancy snapshot with a site's position map to produce the
// rows the floor-plan modal draws. Rows are derived on open and on
// explicit refresh only; a newer snapshot does not touch an open modal.

use crate::model::{
    ContainerSize, DEFAULT_ANCHOR, DisplayRow, ModalView, NORMALIZED_MAX, NormalizedPosition,
    OccupancySnapshot, PixelPosition, PositionMap, Site, SpotStatus,
};
use crate::store::OccupancyStore;

/// Owns the optional modal state and derives it from the store.
pub struct ViewController {
    store: OccupancyStore,
    modal: Option<ModalView>,
}

impl ViewController {
    pub fn new(store: OccupancyStore) -> Self {
        Self { store, modal: None }
    }

    pub fn store(&self) -> &OccupancyStore {
        &self.store
    }

    /// Open the modal for `site_id`, replacing any modal already open.
    pub fn open_site(
        &mut self,
        site_id: &str,
        background: &str,
        positions: &PositionMap,
    ) -> &ModalView {
        let snapshot = self.store.snapshot();
        let rows = derive_rows(&snapshot, site_id, background, positions);
        tracing::debug!(
            site = site_id,
            rows = rows.len(),
            version = snapshot.version(),
            "Opened site"
        );

        self.modal.insert(ModalView {
            site_id: site_id.to_owned(),
            background: background.to_owned(),
            positions: positions.clone(),
            rows,
            derived_from: snapshot.version(),
        })
    }

    /// [`open_site`](Self::open_site) with everything taken from a registry entry.
    pub fn open_registered(&mut self, site: &Site) -> &ModalView {
        self.open_site(&site.id, &site.background, &site.positions)
    }

    /// Re-derive the open modal against the current snapshot.
    ///
    /// Returns `false` (and changes nothing) when no modal is open.
    pub fn refresh(&mut self) -> bool {
        let Some(modal) = self.modal.as_mut() else {
            return false;
        };

        let snapshot = self.store.snapshot();
        modal.rows = derive_rows(&snapshot, &modal.site_id, &modal.background, &modal.positions);
        modal.derived_from = snapshot.version();
        tracing::debug!(
            site = %modal.site_id,
            rows = modal.rows.len(),
            version = modal.derived_from,
            "Refreshed site"
        );
        true
    }

    pub fn close_site(&mut self) {
        if let Some(modal) = self.modal.take() {
            tracing::debug!(site = %modal.site_id, "Closed site");
        }
    }

    pub fn modal(&self) -> Option<&ModalView> {
        self.modal.as_ref()
    }

    /// The store holds a newer snapshot than the open modal shows.
    pub fn is_stale(&self) -> bool {
        self.modal
            .as_ref()
            .is_some_and(|modal| self.store.version() > modal.derived_from)
    }
}

/// One row per snapshot key under `site_id`, in snapshot order.
///
/// Spots missing from `positions` are placed at [`DEFAULT_ANCHOR`].
pub fn derive_rows(
    snapshot: &OccupancySnapshot,
    site_id: &str,
    background: &str,
    positions: &PositionMap,
) -> Vec<DisplayRow> {
    snapshot
        .site_entries(site_id)
        .map(|(spot_id, flag)| {
            let position = positions.get(spot_id).copied().unwrap_or_else(|| {
                tracing::debug!(
                    site = site_id,
                    spot = spot_id,
                    "No position for spot, using default anchor"
                );
                DEFAULT_ANCHOR
            });
            DisplayRow {
                spot_id: spot_id.to_owned(),
                status: SpotStatus::from_flag(flag),
                background: background.to_owned(),
                position,
            }
        })
        .collect()
}

/// Scale a normalized (0–100) position into `container`.
pub fn resolve_pixel_position(
    normalized: NormalizedPosition,
    container: ContainerSize,
) -> PixelPosition {
    PixelPosition {
        x: normalized.x / NORMALIZED_MAX * container.width,
        y: normalized.y / NORMALIZED_MAX * container.height,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::model::{GeoPoint, parse_payload};

    fn positions(pairs: &[(&str, f64, f64)]) -> PositionMap {
        pairs
            .iter()
            .map(|&(id, x, y)| (id.to_owned(), NormalizedPosition::new(x, y)))
            .collect()
    }

    fn controller_with(payload: &serde_json::Value) -> ViewController {
        let store = OccupancyStore::new();
        store.replace(parse_payload(payload).unwrap());
        ViewController::new(store)
    }

    fn row(spot: &str, status: SpotStatus, x: f64, y: f64) -> DisplayRow {
        DisplayRow {
            spot_id: spot.into(),
            status,
            background: "background1.png".into(),
            position: NormalizedPosition::new(x, y),
        }
    }

    #[test]
    fn open_site_joins_snapshot_with_positions() {
        let mut view = controller_with(&json!({"par1.mp4/1": "1", "par1.mp4/2": "0"}));
        let modal = view.open_site(
            "par1.mp4",
            "background1.png",
            &positions(&[("1", 12.0, 8.0), ("2", 20.0, 8.0)]),
        );

        assert_eq!(
            modal.rows,
            vec![
                row("1", SpotStatus::Occupied, 12.0, 8.0),
                row("2", SpotStatus::Free, 20.0, 8.0),
            ]
        );
        assert_eq!(modal.derived_from, 1);
    }

    #[test]
    fn open_site_only_takes_keys_under_prefix() {
        let mut view = controller_with(&json!({
            "par1.mp4/1": "1",
            "par2.mp4/1": "1",
            "par1.mp4/3": "0",
            "other": "1"
        }));
        let modal = view.open_site("par1.mp4", "background1.png", &PositionMap::new());

        let ids: Vec<_> = modal.rows.iter().map(|r| r.spot_id.as_str()).collect();
        assert_eq!(ids, ["1", "3"]);
    }

    #[test]
    fn unpositioned_spots_fall_back_to_default_anchor() {
        let mut view = controller_with(&json!({"par1.mp4/7": "1"}));
        let modal = view.open_site("par1.mp4", "background1.png", &positions(&[("1", 12.0, 8.0)]));

        assert_eq!(modal.rows.len(), 1);
        assert_eq!(modal.rows[0].position, DEFAULT_ANCHOR);
        assert_eq!(modal.rows[0].position, NormalizedPosition::new(10.0, 0.0));
    }

    #[test]
    fn unknown_site_opens_with_no_rows() {
        let mut view = controller_with(&json!({"par1.mp4/1": "1"}));
        let modal = view.open_site("par9.mp4", "bg.png", &PositionMap::new());
        assert!(modal.rows.is_empty());
    }

    #[test]
    fn opening_second_site_replaces_first() {
        let mut view = controller_with(&json!({"par1.mp4/1": "1", "par2.mp4/1": "0"}));
        view.open_site("par1.mp4", "background1.png", &PositionMap::new());
        view.open_site("par2.mp4", "background2.png", &PositionMap::new());

        let modal = view.modal().unwrap();
        assert_eq!(modal.site_id, "par2.mp4");
        assert_eq!(modal.background, "background2.png");
        assert_eq!(modal.rows.len(), 1);
        assert!(modal.rows.iter().all(|r| r.background == "background2.png"));
        assert_eq!(modal.rows[0].status, SpotStatus::Free);
    }

    #[test]
    fn refresh_without_modal_is_noop() {
        let mut view = controller_with(&json!({"par1.mp4/1": "1"}));
        assert!(!view.refresh());
        assert!(view.modal().is_none());
        assert!(!view.is_stale());
    }

    #[test]
    fn refresh_rederives_against_current_snapshot() {
        let mut view = controller_with(&json!({"par1.mp4/1": "1"}));
        view.open_site("par1.mp4", "background1.png", &positions(&[("1", 12.0, 8.0)]));

        view.store()
            .replace(parse_payload(&json!({"par1.mp4/1": "0", "par1.mp4/2": "1"})).unwrap());

        // Open modal keeps showing the old rows until asked
        assert_eq!(view.modal().unwrap().rows.len(), 1);
        assert!(view.is_stale());

        assert!(view.refresh());
        let modal = view.modal().unwrap();
        assert!(!view.is_stale());
        assert_eq!(modal.derived_from, 2);
        assert_eq!(
            modal.rows,
            vec![
                row("1", SpotStatus::Free, 12.0, 8.0),
                row("2", SpotStatus::Occupied, 10.0, 0.0),
            ]
        );
    }

    #[test]
    fn close_clears_modal() {
        let mut view = controller_with(&json!({"par1.mp4/1": "1"}));
        view.open_site("par1.mp4", "background1.png", &PositionMap::new());
        view.close_site();
        assert!(view.modal().is_none());
        view.close_site();
        assert!(view.modal().is_none());
    }

    #[test]
    fn open_registered_uses_site_fields() {
        let mut view = controller_with(&json!({"par3.mp4/2": "1"}));
        let site = Site {
            id: "par3.mp4".into(),
            label: "Show par3".into(),
            location: GeoPoint::new(52.2725, 104.2516),
            background: "background3.png".into(),
            positions: positions(&[("1", 30.0, 40.0), ("2", 60.0, 70.0)]),
        };

        let modal = view.open_registered(&site);
        assert_eq!(modal.background, "background3.png");
        assert_eq!(modal.rows[0].position, NormalizedPosition::new(60.0, 70.0));
        assert_eq!(modal.occupied_count(), 1);
        assert_eq!(modal.free_count(), 0);
    }

    #[test]
    fn pixel_position_scales_linearly() {
        let px = resolve_pixel_position(
            NormalizedPosition::new(50.0, 50.0),
            ContainerSize::new(200.0, 100.0),
        );
        assert_eq!(px, PixelPosition { x: 100.0, y: 50.0 });

        let origin = resolve_pixel_position(
            NormalizedPosition::new(0.0, 0.0),
            ContainerSize::new(80.0, 24.0),
        );
        assert_eq!(origin, PixelPosition { x: 0.0, y: 0.0 });

        let corner = resolve_pixel_position(
            NormalizedPosition::new(100.0, 100.0),
            ContainerSize::new(80.0, 24.0),
        );
        assert_eq!(corner, PixelPosition { x: 80.0, y: 24.0 });
    }
}
