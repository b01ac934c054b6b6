//! Screen implementations. Each screen is a top-level Component.

pub mod map;
pub mod sites;

use std::sync::Arc;

use parkwatch_core::SiteRegistry;

use crate::component::Component;
use crate::screen::ScreenId;

/// One component per tab, all reading the same registry.
pub fn create_screens(registry: &Arc<SiteRegistry>) -> Vec<(ScreenId, Box<dyn Component>)> {
    vec![
        (
            ScreenId::Map,
            Box::new(map::MapScreen::new(Arc::clone(registry))),
        ),
        (
            ScreenId::Sites,
            Box::new(sites::SitesScreen::new(Arc::clone(registry))),
        ),
    ]
}
