// ── Domain model ──
//
// Sites, occupancy snapshots and the modal view state. Everything the
// presentation layer draws is built from these types.

pub mod geometry;
pub mod occupancy;
pub mod site;
pub mod view;

// ── Re-exports ──────────────────────────────────────────────────────

pub use geometry::{
    ContainerSize, DEFAULT_ANCHOR, GeoBounds, GeoPoint, NORMALIZED_MAX, NormalizedPosition,
    PixelPosition,
};
pub use occupancy::{
    OCCUPIED_FLAG, OccupancyEntries, OccupancySnapshot, SiteOccupancy, SpotStatus, parse_payload,
    split_key,
};
pub use site::{PositionMap, Site};
pub use view::{DisplayRow, ModalView};
