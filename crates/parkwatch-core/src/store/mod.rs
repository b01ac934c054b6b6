// ── Occupancy store ──
//
// Single-cell snapshot storage with push-based change notification.

mod occupancy_store;

pub use occupancy_store::OccupancyStore;
