// ── Site registry ──
//
// Read-only table of monitored sites, built once at startup from
// configuration and never mutated afterwards.

use indexmap::IndexMap;

use crate::error::CoreError;
use crate::model::{GeoBounds, OccupancySnapshot, Site, SiteOccupancy};

/// Sites in configuration order, addressable by id or by position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteRegistry {
    sites: IndexMap<String, Site>,
}

impl SiteRegistry {
    /// Build a registry. A repeated id replaces the earlier entry but
    /// keeps its place in the order.
    pub fn new(sites: impl IntoIterator<Item = Site>) -> Self {
        let mut map = IndexMap::new();
        for site in sites {
            if let Some(previous) = map.insert(site.id.clone(), site) {
                tracing::warn!(site = %previous.id, "Duplicate site id, keeping the later entry");
            }
        }
        Self { sites: map }
    }

    pub fn get(&self, id: &str) -> Option<&Site> {
        self.sites.get(id)
    }

    /// Like [`get`](Self::get), but an unknown id is an error.
    pub fn require(&self, id: &str) -> Result<&Site, CoreError> {
        self.get(id)
            .ok_or_else(|| CoreError::SiteNotFound { id: id.to_owned() })
    }

    /// Zero-based lookup, used for the numbered site shortcuts.
    pub fn by_index(&self, index: usize) -> Option<&Site> {
        self.sites.get_index(index).map(|(_, site)| site)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.sites.get_index_of(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Site> {
        self.sites.values()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Bounding box of all site locations.
    pub fn bounds(&self) -> Option<GeoBounds> {
        GeoBounds::around(self.iter().map(|site| site.location))
    }

    /// Every site with its counts, in registry order.
    pub fn summaries<'a>(
        &'a self,
        snapshot: &'a OccupancySnapshot,
    ) -> impl Iterator<Item = (&'a Site, SiteOccupancy)> + 'a {
        self.iter()
            .map(move |site| (site, snapshot.site_occupancy(&site.id)))
    }
}
