use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use meetup_harvest::{harvest, utils, HarvestConfig, HttpSession, SourceKind, TruncateOrder};

#[derive(Parser)]
#[command(name = "meetup-harvest")]
#[command(about = "Harvest a Meetup group's events into markdown files")]
struct Cli {
    /// Slug of the Meetup group
    #[arg(short, long, env = "GROUP_SLUG")]
    group_slug: Option<String>,

    /// Base URL of the platform
    #[arg(short, long, env = "BASE_URL")]
    base_url: Option<String>,

    /// Directory the event files are written to
    #[arg(short, long, env = "TARGET")]
    target: Option<PathBuf>,

    /// File name pattern; {day}, {date} and {id} are filled per event
    #[arg(short, long, env = "FILE_NAME")]
    file_name: Option<String>,

    /// Collect at most this many upcoming events
    #[arg(short = 'u', long, env = "LIMIT_UPCOMING")]
    limit_upcoming: Option<usize>,

    /// Collect at most this many past events
    #[arg(short = 'p', long, env = "LIMIT_PAST")]
    limit_past: Option<usize>,

    /// Order applied before truncating upcoming events client-side
    #[arg(long, value_enum, env = "UPCOMING_ORDER")]
    upcoming_order: Option<OrderArg>,

    /// Order applied before truncating past events client-side
    #[arg(long, value_enum, env = "PAST_ORDER")]
    past_order: Option<OrderArg>,

    /// How events are acquired
    #[arg(short, long, value_enum, env = "SOURCE")]
    source: Option<SourceKind>,

    /// Deprecated: scrape the HTML pages instead of using the api
    #[arg(long, env = "NO_API")]
    no_api: bool,

    /// Cookie header of an already signed-in session
    #[arg(long, env = "SESSION_COOKIE", hide_env_values = true)]
    session_cookie: Option<String>,

    /// JSON config file providing defaults
    #[arg(short, long, env = "HARVEST_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, env = "DEBUG")]
    debug: bool,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OrderArg {
    AsServed,
    Reversed,
}

impl From<OrderArg> for TruncateOrder {
    fn from(arg: OrderArg) -> Self {
        match arg {
            OrderArg::AsServed => TruncateOrder::AsServed,
            OrderArg::Reversed => TruncateOrder::Reversed,
        }
    }
}

impl Cli {
    fn into_config(self) -> Result<HarvestConfig> {
        let path = self.config.clone().unwrap_or_else(utils::config_path);
        let mut config = HarvestConfig::load(&path)?;

        if let Some(group_slug) = self.group_slug {
            config.group_slug = Some(group_slug);
        }
        if let Some(base_url) = self.base_url {
            config.base_url = base_url;
        }
        if let Some(target) = self.target {
            config.target = target;
        }
        if let Some(file_name) = self.file_name {
            config.file_name = file_name;
        }
        if self.limit_upcoming.is_some() {
            config.limit_upcoming = self.limit_upcoming;
        }
        if self.limit_past.is_some() {
            config.limit_past = self.limit_past;
        }
        if let Some(order) = self.upcoming_order {
            config.truncate.upcoming = order.into();
        }
        if let Some(order) = self.past_order {
            config.truncate.past = order.into();
        }
        if let Some(source) = self.source {
            config.source = source;
        }
        if self.no_api {
            tracing::warn!("NO_API is deprecated, use --source browser");
            config.source = SourceKind::Browser;
        }
        if self.session_cookie.is_some() {
            config.session_cookie = self.session_cookie;
        }
        Ok(config)
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config = cli.into_config()?;
    let session = HttpSession::new(&config.base_url, config.session_cookie.as_deref())
        .context("unable to set up the http session")?;

    let summary = harvest(&config, Arc::new(session)).await?;
    tracing::info!(
        "done: {} upcoming, {} past, {} written, {} locked, {} failed",
        summary.upcoming,
        summary.past,
        summary.report.written(),
        summary.report.skipped,
        summary.report.failed
    );
    Ok(())
}
