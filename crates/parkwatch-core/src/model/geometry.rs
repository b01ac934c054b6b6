// ── Positions, sizes and coordinates ──

use serde::{Deserialize, Serialize};

/// Upper bound of the normalized coordinate space.
pub const NORMALIZED_MAX: f64 = 100.0;

/// A point on a floor plan, as a percentage of its width (`x`) and height (`y`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPosition {
    pub x: f64,
    pub y: f64,
}

/// Where a spot with no configured position is drawn.
pub const DEFAULT_ANCHOR: NormalizedPosition = NormalizedPosition { x: 10.0, y: 0.0 };

impl NormalizedPosition {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Both coordinates lie within `0..=100`.
    pub fn is_in_bounds(&self) -> bool {
        let range = 0.0..=NORMALIZED_MAX;
        range.contains(&self.x) && range.contains(&self.y)
    }
}

/// Rendered size of the floor-plan container, in whatever unit the
/// presentation layer draws with (terminal cells for the TUI).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerSize {
    pub width: f64,
    pub height: f64,
}

impl ContainerSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// A normalized position scaled into a [`ContainerSize`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelPosition {
    pub x: f64,
    pub y: f64,
}

/// Geographic coordinates of a site.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Axis-aligned box around a set of [`GeoPoint`]s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl GeoBounds {
    /// Smallest box containing every point, or `None` for no points.
    pub fn around(points: impl IntoIterator<Item = GeoPoint>) -> Option<Self> {
        points.into_iter().fold(None, |acc, p| {
            Some(match acc {
                None => Self {
                    min_lat: p.lat,
                    max_lat: p.lat,
                    min_lon: p.lon,
                    max_lon: p.lon,
                },
                Some(b) => Self {
                    min_lat: b.min_lat.min(p.lat),
                    max_lat: b.max_lat.max(p.lat),
                    min_lon: b.min_lon.min(p.lon),
                    max_lon: b.max_lon.max(p.lon),
                },
            })
        })
    }

    /// Grow each side by `fraction` of the span, with at least `min_pad`
    /// degrees so a single site still gets a visible neighbourhood.
    pub fn padded(&self, fraction: f64, min_pad: f64) -> Self {
        let lat_pad = ((self.max_lat - self.min_lat) * fraction).max(min_pad);
        let lon_pad = ((self.max_lon - self.min_lon) * fraction).max(min_pad);
        Self {
            min_lat: self.min_lat - lat_pad,
            max_lat: self.max_lat + lat_pad,
            min_lon: self.min_lon - lon_pad,
            max_lon: self.max_lon + lon_pad,
        }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lon..=self.max_lon).contains(&point.lon)
    }
}
