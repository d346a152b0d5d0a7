use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tick_tracker::calculate::{self, Grade};
use tick_tracker::config::AppConfig;
use tick_tracker::fetch::create_source;
use tick_tracker::ingest::parse_tick_export;
use tick_tracker::models::{is_valid_username, parse_tick_date, UserRef, UserTick};
use tick_tracker::parse_lookback;
use tick_tracker::storage::{RecordFile, StorageConfig};
use tick_tracker::sync::Refresher;

#[derive(Parser)]
#[command(name = "tick-tracker")]
#[command(about = "Track climbers' ticks and rank recent activity and hardest sends")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "./config.toml")]
    config: PathBuf,

    /// Data directory path (overrides the config file)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct WindowArgs {
    /// Lookback (e.g., "30", "30d", "2w"); defaults to the configured value
    #[arg(long)]
    days: Option<String>,

    /// Reference date (YYYY-MM-DD); defaults to today
    #[arg(long)]
    now: Option<String>,
}

impl WindowArgs {
    fn resolve(&self, default_days: u32) -> Result<(NaiveDate, u32)> {
        let days = match &self.days {
            Some(raw) => parse_lookback(raw).with_context(|| format!("Invalid --days: {}", raw))?,
            None => default_days,
        };
        let now = match &self.now {
            Some(raw) => parse_tick_date(raw).with_context(|| format!("Invalid --now: {}", raw))?,
            None => Utc::now().date_naive(),
        };
        Ok((now, days))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Bind address
        #[arg(long)]
        host: Option<String>,

        /// Port number
        #[arg(long)]
        port: Option<u16>,
    },

    /// Start tracking a user and download their ticks
    AddUser {
        /// Profile URL, e.g. https://www.mountainproject.com/user/123/name
        #[arg(long, conflicts_with_all = ["user_id", "username"])]
        url: Option<String>,

        #[arg(long, requires = "username")]
        user_id: Option<String>,

        #[arg(long, requires = "user_id")]
        username: Option<String>,
    },

    /// Load a user's ticks from a saved export file
    Import {
        #[arg(long)]
        user_id: String,

        #[arg(long)]
        username: String,

        /// Tick export CSV
        #[arg(long)]
        file: PathBuf,
    },

    /// Stop tracking a user
    RemoveUser { username: String },

    /// Refresh every tracked user
    Refresh,

    /// Rank users by ticks in the window
    Activity {
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Rank users by hardest tick in the window
    Hardest {
        #[command(flatten)]
        window: WindowArgs,
    },

    /// List recent ticks across all users
    Recent {
        #[command(flatten)]
        window: WindowArgs,

        /// Maximum ticks to show
        #[arg(long, default_value = "25")]
        limit: usize,
    },

    /// List recent ticks on a route
    Route {
        /// Route name (case-insensitive, partial)
        query: String,

        #[command(flatten)]
        window: WindowArgs,
    },
}

/// Everything a command needs, built from the config.
struct App {
    config: AppConfig,
    refresher: Refresher,
}

impl App {
    fn load(config: AppConfig) -> Result<Self> {
        let storage = StorageConfig::new(config.data_dir.clone());
        let records = Arc::new(RecordFile::from_config(&storage));
        let store = records
            .load_store()
            .with_context(|| format!("Failed to load users from {:?}", records.path()))?
            .into_shared();
        let source = create_source(&config.source)?;
        let refresher = Refresher::new(source, store, config.ranking.lookback_days)
            .with_records(records);

        Ok(Self { config, refresher })
    }

    fn lookback_days(&self) -> u32 {
        self.config.ranking.lookback_days
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

/// Normalized grade when recognized, otherwise the rating as exported.
fn grade_label(rating: &str) -> String {
    let grade = Grade::parse(rating);
    if grade.is_recognized() {
        grade.to_string()
    } else {
        rating.to_string()
    }
}

fn print_ticks(ticks: &[UserTick]) {
    if ticks.is_empty() {
        println!("No ticks in window.");
        return;
    }
    println!("{:<12} {:<20} {:<8} Route", "Date", "User", "Rating");
    for t in ticks {
        println!(
            "{:<12} {:<20} {:<8} {}",
            t.tick.date,
            t.username,
            t.tick.rating_text(),
            t.tick.route
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_tracing(level, cli.json_logs);

    tracing::info!("Starting tick-tracker v{}", env!("CARGO_PKG_VERSION"));

    let app = App::load(config)?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| app.config.server.host.clone());
            let port = port.unwrap_or(app.config.server.port);

            let state = tick_tracker::api::state::AppState::new(
                app.refresher.clone(),
                app.lookback_days(),
            )
            .with_cors_origin(app.config.server.cors_origin.clone());
            let router = tick_tracker::api::build_router(state);

            let addr = format!("{}:{}", host, port);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!("Listening on http://{}", addr);
            axum::serve(listener, router).await?;
        }
        Commands::AddUser {
            url,
            user_id,
            username,
        } => {
            let user = match (url, user_id, username) {
                (Some(url), _, _) => UserRef::from_profile_url(&url)
                    .with_context(|| format!("Not a user profile URL: {}", url))?,
                (None, Some(id), Some(name)) if is_valid_username(&name) => UserRef::new(id, name),
                (None, Some(_), Some(name)) => bail!("Invalid username: {}", name),
                _ => bail!("Specify --url or both --user-id and --username"),
            };

            let result = app.refresher.refresh_user(user).await?;
            println!(
                "Added {}: {} ticks ({} in the last {} days)",
                result.username,
                result.total_ticks,
                result.tick_count,
                app.lookback_days()
            );
        }
        Commands::Import {
            user_id,
            username,
            file,
        } => {
            if !is_valid_username(&username) {
                bail!("Invalid username: {}", username);
            }
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            let ticks = parse_tick_export(&content)?;
            let result = app
                .refresher
                .apply_ticks(UserRef::new(user_id, username), ticks)
                .await?;
            println!("Imported {} ticks for {}", result.total_ticks, result.username);
        }
        Commands::RemoveUser { username } => {
            if app.refresher.remove_user(&username).await? {
                println!("Removed {}", username);
            } else {
                bail!("Unknown user: {}", username);
            }
        }
        Commands::Refresh => {
            let report = app.refresher.refresh_all().await?;

            println!("\n=== Refresh Results ===");
            for r in &report.refreshed {
                println!(
                    "  {:<20} {:>4} recent / {:>5} total",
                    r.username, r.tick_count, r.total_ticks
                );
            }
            if !report.failed.is_empty() {
                println!("\nFailed:");
                for f in &report.failed {
                    println!("  - {}: {}", f.username, f.error);
                }
            }
            println!("\nDuration: {:?}", report.duration);
        }
        Commands::Activity { window } => {
            let (now, days) = window.resolve(app.lookback_days())?;
            let store = app.refresher.store().read().await;
            let ranking = calculate::recent_activity_counts(&store, now, days);

            println!("Activity {} to {}", ranking.window_start, ranking.window_end);
            for (i, e) in ranking.ranked.iter().enumerate() {
                println!(
                    "{:>3}. {:<20} {:>4} ticks  (last {})",
                    i + 1,
                    e.username,
                    e.tick_count,
                    e.last_tick_date.as_deref().unwrap_or("-")
                );
            }
            for d in &ranking.disqualified {
                println!("  -  {:<20} no ticks in window", d.username);
            }
        }
        Commands::Hardest { window } => {
            let (now, days) = window.resolve(app.lookback_days())?;
            let store = app.refresher.store().read().await;
            let ranking = calculate::hardest_climbs(&store, now, days);

            println!("Hardest {} to {}", ranking.window_start, ranking.window_end);
            for e in &ranking.ranked {
                println!(
                    "{:>3}. {:<20} {:<8} {:>6.2}  {} ({})",
                    e.place,
                    e.username,
                    grade_label(e.tick.rating_text()),
                    e.score,
                    e.tick.route,
                    e.tick.date
                );
            }
            for d in &ranking.disqualified {
                println!(
                    "  -  {:<20} last tick {}",
                    d.username,
                    d.last_tick_date.as_deref().unwrap_or("never")
                );
            }
        }
        Commands::Recent { window, limit } => {
            let (now, days) = window.resolve(app.lookback_days())?;
            let store = app.refresher.store().read().await;
            let mut ticks = calculate::recent_ticks_across_users(&store, now, days);
            ticks.truncate(limit);
            print_ticks(&ticks);
        }
        Commands::Route { query, window } => {
            let (now, days) = window.resolve(app.lookback_days())?;
            let store = app.refresher.store().read().await;
            print_ticks(&calculate::route_ticks(&store, &query, now, days));
        }
    }

    Ok(())
}
