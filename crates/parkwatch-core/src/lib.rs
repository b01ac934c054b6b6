//! Occupancy data layer between `parkwatch-api` and the dashboard.
//!
//! The feed client is the only writer of the [`OccupancyStore`]; the
//! [`ViewController`] reads it on demand and joins it with the
//! [`SiteRegistry`] to produce the rows the floor-plan modal draws.
//!
//! ```text
//! FeedClient ──replace──▶ OccupancyStore ──snapshot──▶ ViewController ──▶ ModalView
//!                               │                            ▲
//!                               └──subscribe─▶ SnapshotStream │ SiteRegistry
//! ```

pub mod config;
pub mod error;
pub mod feed;
pub mod model;
pub mod registry;
pub mod store;
pub mod stream;
pub mod view;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{DEFAULT_ENDPOINT, DEFAULT_EVENT, FeedConfig};
pub use error::CoreError;
pub use feed::{ConnectionState, FeedClient, FeedNotice};
pub use registry::SiteRegistry;
pub use store::OccupancyStore;
pub use stream::{SnapshotStream, SnapshotWatchStream};
pub use view::{ViewController, derive_rows, resolve_pixel_position};

pub use parkwatch_api::ReconnectConfig;

// Re-export model types at the crate root for ergonomics.
pub use model::{
    ContainerSize, DEFAULT_ANCHOR, DisplayRow, GeoBounds, GeoPoint, ModalView, NormalizedPosition,
    OccupancyEntries, OccupancySnapshot, PixelPosition, PositionMap, Site, SiteOccupancy,
    SpotStatus,
};
