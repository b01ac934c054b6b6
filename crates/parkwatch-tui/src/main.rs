//! `parkwatch`: terminal dashboard for live parking-lot occupancy.
//!
//! Shows every configured site on a map, and a floor plan with one marker
//! per spot for the site you open. Occupancy arrives over a Socket.IO feed
//! through `parkwatch-core`; the floor plan only picks up new data when
//! you refresh it.
//!
//! Logs go to a file (default `/tmp/parkwatch.log`) so they never land on
//! the terminal the dashboard is drawing to.

mod action;
mod app;
mod component;
mod data_bridge;
mod event;
mod screen;
mod screens;
mod theme;
mod tui;
mod widgets;

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr, bail};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use parkwatch_config::Config;
use parkwatch_core::{FeedClient, OccupancyStore};

use crate::app::App;

/// Live parking occupancy on a map and per-site floor plans.
#[derive(Parser, Debug)]
#[command(name = "parkwatch", version, about)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Feed endpoint, e.g. http://localhost:5000 (overrides `feed.endpoint`)
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Name of the snapshot event (overrides `feed.event`)
    #[arg(long)]
    event: Option<String>,

    /// Log file path
    #[arg(long, default_value = "/tmp/parkwatch.log")]
    log_file: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the effective configuration as TOML and exit
    #[arg(long, conflicts_with = "init_config")]
    print_config: bool,

    /// Write the effective configuration to the config file and exit
    #[arg(long)]
    init_config: bool,
}

impl Cli {
    fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(parkwatch_config::config_path)
    }
}

/// File-only tracing. The returned guard flushes the writer on drop.
fn setup_tracing(cli: &Cli) -> WorkerGuard {
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "parkwatch={log_level},parkwatch_core={log_level},parkwatch_api={log_level}"
        ))
    });

    let log_dir = cli
        .log_file
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(std::path::Path::new("."));
    let log_filename = cli
        .log_file
        .file_name()
        .unwrap_or(std::ffi::OsStr::new("parkwatch.log"));

    let file_appender = tracing_appender::rolling::never(log_dir, log_filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
        .init();

    guard
}

/// Config file + environment, then command-line overrides on top.
fn load_config(cli: &Cli) -> Result<Config> {
    let path = cli.config_path();
    let mut config = parkwatch_config::load_config_from(&path)
        .wrap_err_with(|| format!("failed to load {}", path.display()))?;

    if let Some(endpoint) = &cli.endpoint {
        config.feed.endpoint.clone_from(endpoint);
    }
    if let Some(event) = &cli.event {
        config.feed.event.clone_from(event);
    }
    config.validate().wrap_err("invalid command-line override")?;
    Ok(config)
}

fn print_config(config: &Config) -> Result<()> {
    let mut full = config.clone();
    full.sites = config.effective_sites()?;
    print!("{}", parkwatch_config::render_toml(&full)?);
    Ok(())
}

fn init_config(cli: &Cli, config: &Config) -> Result<()> {
    let path = cli.config_path();
    if path.exists() {
        bail!("{} already exists, not overwriting", path.display());
    }
    let mut full = config.clone();
    full.sites = config.effective_sites()?;
    parkwatch_config::save_config(&path, &full)?;
    println!("wrote {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tui::install_hooks()?;

    let config = load_config(&cli)?;
    if cli.print_config {
        return print_config(&config);
    }
    if cli.init_config {
        return init_config(&cli, &config);
    }

    let _log_guard = setup_tracing(&cli);

    let registry = config.to_registry()?;
    let feed_config = config.to_feed_config()?;
    info!(
        endpoint = %feed_config.endpoint,
        event = %feed_config.event,
        sites = registry.len(),
        "starting parkwatch"
    );

    let store = OccupancyStore::new();
    let client = FeedClient::new(feed_config, store);
    let mut app = App::new(registry, client);
    app.run().await?;

    Ok(())
}
