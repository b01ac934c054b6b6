// ── Modal view state ──

use serde::Serialize;

use super::geometry::NormalizedPosition;
use super::occupancy::SpotStatus;
use super::site::PositionMap;

/// One indicator in the floor-plan modal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayRow {
    pub spot_id: String,
    pub status: SpotStatus,
    pub background: String,
    pub position: NormalizedPosition,
}

/// The open floor-plan modal: which site it shows and the rows derived
/// for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModalView {
    pub site_id: String,
    pub background: String,
    pub positions: PositionMap,
    pub rows: Vec<DisplayRow>,
    /// Store version the rows were derived from.
    pub derived_from: u64,
}

impl ModalView {
    pub fn occupied_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| row.status == SpotStatus::Occupied)
            .count()
    }

    pub fn free_count(&self) -> usize {
        self.rows.len() - self.occupied_count()
    }
}
