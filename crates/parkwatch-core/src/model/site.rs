// ── Site ──

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::geometry::{GeoPoint, NormalizedPosition};

/// Spot-local id → floor-plan position, in declaration order.
pub type PositionMap = IndexMap<String, NormalizedPosition>;

/// A monitored parking site.
///
/// `id` doubles as the key prefix the feed uses for the site's spots
/// (`"<id>/<spot>"`). Immutable for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub label: String,
    pub location: GeoPoint,
    /// Reference to the floor-plan background (file name or URL).
    pub background: String,
    pub positions: PositionMap,
}

impl Site {
    pub fn position_of(&self, spot_id: &str) -> Option<NormalizedPosition> {
        self.positions.get(spot_id).copied()
    }
}
