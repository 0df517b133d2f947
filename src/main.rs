use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use gator::config::Config;
use gator::feed::Fetcher;
use gator::ingest::{Scheduler, TickDriver};
use gator::storage::{Database, DatabaseError, User};
use gator::util::{parse_interval, validate_feed_url};

/// Get the config directory path (~/.config/gator/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("gator"))
}

#[derive(Parser, Debug)]
#[command(name = "gator", version, about = "Command-line RSS aggregator")]
struct Args {
    /// Config file (default: ~/.config/gator/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a user
    Register { name: String },
    /// List users
    Users,
    /// Register a feed owned by a user
    Addfeed {
        name: String,
        url: String,
        /// Owner (default: current_user from the config file)
        #[arg(long)]
        user: Option<String>,
    },
    /// List feeds with their owners
    Feeds,
    /// Show the most recent posts from a user's feeds
    Browse {
        #[arg(default_value_t = 2, value_parser = clap::value_parser!(i64).range(1..))]
        limit: i64,
        #[arg(long)]
        user: Option<String>,
    },
    /// Collect feeds forever, one per tick (e.g. `1m`, `30s`, `1h30m`)
    Agg { interval: Option<String> },
    /// Delete all users, their feeds and posts
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gator=info")),
        )
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // Interval errors must surface before the database is touched.
    let interval = match &args.command {
        Command::Agg { interval } => Some(resolve_interval(interval.as_deref(), &config)?),
        _ => None,
    };

    let db_path = config.database_path(&config_dir);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = Database::open(db_path_str)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    match args.command {
        Command::Register { name } => register(&db, &name).await,
        Command::Users => list_users(&db, &config).await,
        Command::Addfeed { name, url, user } => {
            add_feed(&db, &config, &name, &url, user.as_deref()).await
        }
        Command::Feeds => list_feeds(&db).await,
        Command::Browse { limit, user } => browse(&db, &config, limit, user.as_deref()).await,
        Command::Agg { .. } => {
            let interval = interval.ok_or_else(|| anyhow::anyhow!("missing interval"))?;
            aggregate(db, &config, interval).await
        }
        Command::Reset => {
            let removed = db.delete_all_users().await.context("Failed to reset")?;
            println!("Database reset ({} users removed).", removed);
            Ok(())
        }
    }
}

fn resolve_interval(arg: Option<&str>, config: &Config) -> Result<Duration> {
    let Some(raw) = arg.or(config.default_interval.as_deref()) else {
        bail!("agg needs an interval, e.g. `gator agg 1m`");
    };
    parse_interval(raw).with_context(|| format!("Bad interval {:?}", raw))
}

async fn register(db: &Database, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("User name must not be empty");
    }
    match db.create_user(name).await {
        Ok(user) => {
            println!("Registered user {} ({})", user.name, user.id);
            Ok(())
        }
        Err(e) if e.is_unique_violation() => bail!("User {:?} already exists", name),
        Err(e) => Err(e).context("Failed to create user"),
    }
}

async fn list_users(db: &Database, config: &Config) -> Result<()> {
    let users = db.list_users().await.context("Failed to list users")?;
    if users.is_empty() {
        println!("No users. Create one with `gator register <name>`.");
    }
    for user in users {
        if config.current_user.as_deref() == Some(user.name.as_str()) {
            println!("* {} (current)", user.name);
        } else {
            println!("* {}", user.name);
        }
    }
    Ok(())
}

/// The named user, or `current_user` from the config file.
async fn resolve_user(db: &Database, config: &Config, name: Option<&str>) -> Result<User> {
    let Some(name) = name.or(config.current_user.as_deref()) else {
        bail!("No user given; pass --user or set current_user in the config file");
    };
    db.get_user_by_name(name)
        .await
        .context("Failed to look up user")?
        .ok_or_else(|| anyhow::anyhow!("Unknown user {:?}", name))
}

async fn add_feed(
    db: &Database,
    config: &Config,
    name: &str,
    url: &str,
    user: Option<&str>,
) -> Result<()> {
    let url = validate_feed_url(url).context("Feed URL rejected")?;
    let owner = resolve_user(db, config, user).await?;

    match db.insert_feed(name.trim(), url.as_str(), owner.id).await {
        Ok(feed) => {
            println!("Added feed {} ({}) for {}", feed.name, feed.url, owner.name);
            Ok(())
        }
        Err(DatabaseError::UniqueViolation(_)) => bail!("Feed {} is already registered", url),
        Err(e) => Err(e).context("Failed to add feed"),
    }
}

async fn list_feeds(db: &Database) -> Result<()> {
    let feeds = db.list_feeds().await.context("Failed to list feeds")?;
    if feeds.is_empty() {
        println!("No feeds registered.");
    }
    for listing in feeds {
        let last = listing
            .feed
            .last_fetched_at
            .map_or_else(|| "never".to_string(), |at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string());
        println!("* {}", listing.feed.name);
        println!("  url:          {}", listing.feed.url);
        println!("  owner:        {}", listing.user_name);
        println!("  last fetched: {}", last);
    }
    Ok(())
}

async fn browse(db: &Database, config: &Config, limit: i64, user: Option<&str>) -> Result<()> {
    let user = resolve_user(db, config, user).await?;
    let posts = db
        .get_posts_for_user(user.id, limit)
        .await
        .context("Failed to load posts")?;

    if posts.is_empty() {
        println!("No posts yet for {}.", user.name);
    }
    for listing in posts {
        let post = &listing.post;
        let date = post
            .published_at
            .map_or_else(|| "undated".to_string(), |at| at.format("%a %b %e %Y").to_string());
        println!("{} from {}", date, listing.feed_name);
        println!("--- {} ---", post.title);
        if let Some(description) = &post.description {
            println!("    {}", description);
        }
        println!("Link: {}", post.url);
        println!("=====================================");
    }
    Ok(())
}

async fn aggregate(db: Database, config: &Config, interval: Duration) -> Result<()> {
    let client = reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.request_timeout())
        .build()
        .context("Failed to build HTTP client")?;
    let fetcher = Fetcher::new(client)
        .with_timeout(config.request_timeout())
        .with_max_feed_size(config.max_feed_size());

    let driver = TickDriver::new(Scheduler::new(db, fetcher), interval)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate())?;
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        #[cfg(unix)]
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
            _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down gracefully"),
        }
        #[cfg(not(unix))]
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, shutting down gracefully");
        }
        let _ = shutdown_tx.send(true);
    });

    println!("Collecting feeds every {:?}", interval);
    let cycles = driver.run(shutdown_rx).await;
    println!("Stopped after {} cycles.", cycles);
    Ok(())
}
