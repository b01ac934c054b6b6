//! Configuration for the parkwatch dashboard.
//!
//! TOML file + `PARKWATCH_` environment variables, the declarative site
//! registry, and translation to `parkwatch_core::FeedConfig` and
//! `parkwatch_core::SiteRegistry`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use parkwatch_core::{
    DEFAULT_ENDPOINT, DEFAULT_EVENT, FeedConfig, GeoPoint, NormalizedPosition, PositionMap, Site,
    SiteRegistry,
};

/// Demo registry compiled into the binary.
const DEFAULT_SITES: &str = include_str!("default_sites.toml");

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("bundled site registry is unreadable: {0}")]
    BundledSites(#[from] toml::de::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedSection,

    /// Monitored sites keyed by id. Empty means "use the bundled demo sites".
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub sites: IndexMap<String, SiteEntry>,
}

/// `[feed]`: where the occupancy stream comes from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FeedSection {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_event")]
    pub event: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,

    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,

    /// Give up after this many consecutive failed reconnects. Unset retries forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            event: default_event(),
            namespace: default_namespace(),
            path: default_path(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            max_retries: None,
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.into()
}
fn default_event() -> String {
    DEFAULT_EVENT.into()
}
fn default_namespace() -> String {
    "/".into()
}
fn default_path() -> String {
    "/socket.io/".into()
}
fn default_reconnect_initial_ms() -> u64 {
    1000
}
fn default_reconnect_max_ms() -> u64 {
    5000
}

/// `[sites."<id>"]`: one monitored site.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SiteEntry {
    pub lat: f64,
    pub lon: f64,

    /// Text on the site marker. Defaults to the site id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Floor-plan background reference.
    #[serde(default)]
    pub background: String,

    /// Spot id → `{ x, y }` in percent of the floor plan.
    #[serde(default)]
    pub positions: IndexMap<String, NormalizedPosition>,
}

#[derive(Debug, Deserialize)]
struct SitesFile {
    #[serde(default)]
    sites: IndexMap<String, SiteEntry>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "parkwatch").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("parkwatch");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the Config from `path` + environment.
///
/// A missing file is not an error; defaults and environment still apply.
/// Environment keys use `__` between sections: `PARKWATCH_FEED__ENDPOINT`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("PARKWATCH_").split("__"));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

/// The demo sites shipped with the binary.
pub fn default_sites() -> Result<IndexMap<String, SiteEntry>, ConfigError> {
    let file: SitesFile = toml::from_str(DEFAULT_SITES)?;
    Ok(file.sites)
}

/// Serialize config to pretty TOML.
pub fn render_toml(config: &Config) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(config)?)
}

/// Write `config` as TOML to `path`, creating parent directories.
pub fn save_config(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, render_toml(config)?)?;
    Ok(())
}

// ── Validation & translation ────────────────────────────────────────

impl Config {
    /// Reject values the dashboard cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.feed.validate()?;
        for (id, site) in &self.sites {
            validate_site(id, site)?;
        }
        Ok(())
    }

    /// Configured sites, or the bundled demo sites when none are configured.
    pub fn effective_sites(&self) -> Result<IndexMap<String, SiteEntry>, ConfigError> {
        if self.sites.is_empty() {
            let sites = default_sites()?;
            for (id, site) in &sites {
                validate_site(id, site)?;
            }
            Ok(sites)
        } else {
            Ok(self.sites.clone())
        }
    }

    /// Build the core feed configuration.
    pub fn to_feed_config(&self) -> Result<FeedConfig, ConfigError> {
        self.feed.to_feed_config()
    }

    /// Build the read-only site registry.
    pub fn to_registry(&self) -> Result<SiteRegistry, ConfigError> {
        let sites = self.effective_sites()?;
        Ok(SiteRegistry::new(
            sites.into_iter().map(|(id, entry)| entry.into_site(id)),
        ))
    }
}

impl FeedSection {
    fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| invalid("feed.endpoint", format!("'{}': {e}", self.endpoint)))?;
        match url.scheme() {
            "http" | "https" | "ws" | "wss" => Ok(url),
            other => Err(invalid(
                "feed.endpoint",
                format!("scheme '{other}' is not supported (use http or https)"),
            )),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint_url()?;
        if self.event.trim().is_empty() {
            return Err(invalid("feed.event", "must not be empty"));
        }
        if !self.namespace.starts_with('/') {
            return Err(invalid("feed.namespace", "must start with '/'"));
        }
        if self.reconnect_initial_ms == 0 {
            return Err(invalid("feed.reconnect_initial_ms", "must be greater than zero"));
        }
        if self.reconnect_max_ms < self.reconnect_initial_ms {
            return Err(invalid(
                "feed.reconnect_max_ms",
                "must not be smaller than reconnect_initial_ms",
            ));
        }
        Ok(())
    }

    fn to_feed_config(&self) -> Result<FeedConfig, ConfigError> {
        let mut config = FeedConfig::new(self.endpoint_url()?).with_reconnect(
            Duration::from_millis(self.reconnect_initial_ms),
            Duration::from_millis(self.reconnect_max_ms),
            self.max_retries,
        );
        config.event.clone_from(&self.event);
        config.namespace.clone_from(&self.namespace);
        config.path.clone_from(&self.path);
        Ok(config)
    }
}

fn validate_site(id: &str, site: &SiteEntry) -> Result<(), ConfigError> {
    if id.is_empty() || id.contains('/') {
        return Err(invalid(
            format!("sites.\"{id}\""),
            "site id must be non-empty and must not contain '/'",
        ));
    }
    if !(-90.0..=90.0).contains(&site.lat) {
        return Err(invalid(format!("sites.\"{id}\".lat"), "must be within -90..=90"));
    }
    if !(-180.0..=180.0).contains(&site.lon) {
        return Err(invalid(format!("sites.\"{id}\".lon"), "must be within -180..=180"));
    }
    for (spot, pos) in &site.positions {
        if !pos.is_in_bounds() {
            return Err(invalid(
                format!("sites.\"{id}\".positions.\"{spot}\""),
                format!("({}, {}) is outside 0..=100", pos.x, pos.y),
            ));
        }
    }
    Ok(())
}

impl SiteEntry {
    fn into_site(self, id: String) -> Site {
        Site {
            label: self.label.unwrap_or_else(|| id.clone()),
            location: GeoPoint::new(self.lat, self.lon),
            background: self.background,
            positions: self.positions.into_iter().collect::<PositionMap>(),
            id,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn bundled_sites_parse_and_validate() {
        let sites = default_sites().unwrap();
        let ids: Vec<_> = sites.keys().map(String::as_str).collect();
        assert_eq!(ids, ["par1.mp4", "par2.mp4", "par3.mp4"]);

        let par1 = &sites["par1.mp4"];
        assert_eq!(par1.background, "background1.png");
        assert_eq!(par1.positions["3"], NormalizedPosition::new(31.0, 15.0));

        let registry = Config::default().to_registry().unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get("par2.mp4").unwrap().label, "Show par2");
    }

    #[test]
    fn default_feed_section_matches_socket_io_client() {
        let feed = Config::default().to_feed_config().unwrap();
        assert_eq!(feed.endpoint.as_str(), "http://localhost:5000/");
        assert_eq!(feed.event, "update_data");
        assert_eq!(feed.reconnect.initial_delay, Duration::from_secs(1));
        assert_eq!(feed.reconnect.max_delay, Duration::from_secs(5));
        assert_eq!(feed.reconnect.max_retries, None);
    }

    #[test]
    fn configured_sites_replace_bundled_ones() {
        let mut config = Config::default();
        config.sites.insert(
            "lot-a".into(),
            SiteEntry {
                lat: 10.0,
                lon: 20.0,
                label: None,
                background: String::new(),
                positions: IndexMap::new(),
            },
        );

        let registry = config.to_registry().unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.by_index(0).unwrap().label, "lot-a");
    }

    #[test]
    fn out_of_range_position_is_rejected() {
        let mut config = Config::default();
        let mut positions = IndexMap::new();
        positions.insert("1".to_owned(), NormalizedPosition::new(12.0, 140.0));
        config.sites.insert(
            "par1.mp4".into(),
            SiteEntry {
                lat: 52.2,
                lon: 104.2,
                label: None,
                background: "bg.png".into(),
                positions,
            },
        );

        let err = config.validate().unwrap_err();
        assert!(
            matches!(&err, ConfigError::Validation { field, .. } if field.contains("positions")),
            "{err}"
        );
    }

    #[test]
    fn bad_feed_values_are_rejected() {
        let mut config = Config::default();
        config.feed.endpoint = "ftp://example.com".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.feed.namespace = "lots".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.feed.reconnect_max_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn render_round_trips_through_toml() {
        let mut config = Config::default();
        config.feed.max_retries = Some(3);
        let text = render_toml(&config).unwrap();
        assert!(text.contains("[feed]"));
        assert!(text.contains("max_retries = 3"));
    }

    #[test]
    fn load_merges_file_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [feed]
                endpoint = "http://parking.local:5000"
                reconnect_max_ms = 8000

                [sites."lot-b"]
                lat = 52.3
                lon = 104.3
                label = "Lot B"
                background = "b.png"
                positions = { "1" = { x = 50, y = 50 } }
                "#,
            )?;
            jail.set_env("PARKWATCH_FEED__EVENT", "lot_state");

            let config = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.feed.endpoint, "http://parking.local:5000");
            assert_eq!(config.feed.event, "lot_state");
            assert_eq!(config.feed.reconnect_max_ms, 8000);
            assert_eq!(config.feed.reconnect_initial_ms, 1000);

            let site = &config.sites["lot-b"];
            assert_eq!(site.label.as_deref(), Some("Lot B"));
            assert_eq!(site.positions["1"], NormalizedPosition::new(50.0, 50.0));
            Ok(())
        });
    }

    #[test]
    fn load_rejects_invalid_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [sites."lot-c"]
                lat = 52.3
                lon = 104.3
                positions = { "1" = { x = -5, y = 50 } }
                "#,
            )?;

            let result = load_config_from(Path::new("config.toml"));
            assert!(matches!(result, Err(ConfigError::Validation { .. })));
            Ok(())
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        figment::Jail::expect_with(|jail| {
            let config = load_config_from(&jail.directory().join("absent.toml"))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.feed, FeedSection::default());
            assert!(config.sites.is_empty());
            Ok(())
        });
    }

    #[test]
    fn save_writes_readable_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.sites = default_sites().unwrap();
        save_config(&path, &config).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let reread: Config = toml::from_str(&text).unwrap();
        assert_eq!(reread.feed, config.feed);
        assert_eq!(reread.sites.len(), 3);
        assert_eq!(
            reread.sites["par2.mp4"].positions["2"],
            NormalizedPosition::new(55.0, 65.0)
        );
    }
}
