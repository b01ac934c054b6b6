// ── Occupancy snapshot ──
//
// The feed delivers the whole lot state in one object keyed by
// `"<siteId>/<spotId>"`. A snapshot is never merged or patched; every
// update replaces it.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::error::CoreError;

/// The only flag value that marks a spot as taken.
pub const OCCUPIED_FLAG: &str = "1";

/// Composite key → raw status flag, in the order the feed sent them.
pub type OccupancyEntries = IndexMap<String, String>;

/// Whether a spot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SpotStatus {
    Occupied,
    Free,
}

impl SpotStatus {
    /// `"1"` is occupied; every other flag, including an empty one, is free.
    pub fn from_flag(flag: &str) -> Self {
        if flag == OCCUPIED_FLAG {
            Self::Occupied
        } else {
            Self::Free
        }
    }
}

/// Split `"<siteId>/<spotId>"` at the first `/`.
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('/')
}

/// Turn a feed payload into snapshot entries.
///
/// String values are kept verbatim and other scalars in their JSON text
/// form, so `1` and `"1"` both read as occupied. Arrays and objects are
/// skipped. Anything other than a JSON object is rejected.
pub fn parse_payload(payload: &Value) -> Result<OccupancyEntries, CoreError> {
    let Value::Object(map) = payload else {
        return Err(CoreError::MalformedPayload {
            reason: format!("expected an object, got {}", json_kind(payload)),
        });
    };

    let mut entries = OccupancyEntries::with_capacity(map.len());
    for (key, value) in map {
        let flag = match value {
            Value::String(s) => s.clone(),
            Value::Array(_) | Value::Object(_) => {
                tracing::warn!(key, kind = json_kind(value), "Skipping non-scalar occupancy flag");
                continue;
            }
            scalar => scalar.to_string(),
        };
        entries.insert(key.clone(), flag);
    }
    Ok(entries)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── OccupancySnapshot ────────────────────────────────────────────────

/// The most recent full occupancy state.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct OccupancySnapshot {
    entries: OccupancyEntries,
    version: u64,
    received_at: Option<DateTime<Utc>>,
}

impl OccupancySnapshot {
    /// The startup snapshot: no entries, version 0, never received.
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn stamped(
        entries: OccupancyEntries,
        version: u64,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entries,
            version,
            received_at: Some(received_at),
        }
    }

    pub fn entries(&self) -> &OccupancyEntries {
        &self.entries
    }

    /// Number of replacements before this snapshot.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.received_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn flag(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// `(spotId, flag)` for every key under `site_id`, in snapshot order.
    pub fn site_entries<'a>(
        &'a self,
        site_id: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.entries.iter().filter_map(move |(key, flag)| {
            let (site, spot) = split_key(key)?;
            (site == site_id).then_some((spot, flag.as_str()))
        })
    }

    /// Occupied / free counts for one site.
    pub fn site_occupancy(&self, site_id: &str) -> SiteOccupancy {
        self.site_entries(site_id)
            .fold(SiteOccupancy::default(), |mut acc, (_, flag)| {
                match SpotStatus::from_flag(flag) {
                    SpotStatus::Occupied => acc.occupied += 1,
                    SpotStatus::Free => acc.free += 1,
                }
                acc
            })
    }
}

/// Per-site tally of spot states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SiteOccupancy {
    pub occupied: usize,
    pub free: usize,
}

impl SiteOccupancy {
    pub fn total(&self) -> usize {
        self.occupied + self.free
    }

    /// Fraction of spots taken, `None` when the site reports no spots.
    pub fn ratio(&self) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        let occupied = u32::try_from(self.occupied).unwrap_or(u32::MAX);
        let total = u32::try_from(total).unwrap_or(u32::MAX);
        Some(f64::from(occupied) / f64::from(total))
    }
}
