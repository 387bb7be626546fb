//! engage - visitor targeting and realtime notification console
//!
//! Commands:
//! - `status`: configuration, storage and collector status
//! - `identity`: the visitor identity this machine tracks as
//! - `evaluate`: run campaigns through the targeting evaluator
//! - `replay`: feed a recorded event log through the dashboard pipeline
//! - `listen`: attach to the live realtime channel
//! - `visit`: connect as the tracked widget visitor
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/engage/data.db (~/.local/share/engage/data.db)
//! - Logs: $XDG_STATE_HOME/engage/engage.log (~/.local/state/engage/engage.log)
//! - Config: $XDG_CONFIG_HOME/engage/config.toml (~/.config/engage/config.toml)

mod console;
mod evaluate;
mod realtime;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use engage_core::collector::CollectorClient;
use engage_core::store::schema::get_schema_version;
use engage_core::tracker::IdentityManager;
use engage_core::{Config, Database, SqliteStore, VisitorContext};

#[derive(Parser)]
#[command(name = "engage")]
#[command(about = "Visitor targeting and realtime notification console")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show configuration and storage status
    Status {
        /// Also check that the collector answers its health endpoint
        #[arg(long)]
        ping: bool,
    },

    /// Show (and create on first use) the tracked visitor identity
    Identity {
        /// Remember this email for the visitor
        #[arg(long)]
        email: Option<String>,

        /// Start a new tab session
        #[arg(long)]
        new_session: bool,

        /// Output format: text (default) or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Evaluate campaigns against a visitor context
    Evaluate {
        /// JSON file with a campaign or an array of campaigns
        campaigns: PathBuf,

        /// Current page URL
        #[arg(long)]
        url: String,

        /// Referrer URL
        #[arg(long, default_value = "direct")]
        referrer: String,

        /// Seconds spent on the page
        #[arg(long, default_value_t = 0.0)]
        time_on_page: f64,

        /// Treat the visitor as returning
        #[arg(long)]
        returning: bool,

        /// Apply the frequency guard for this visitor id
        #[arg(long)]
        visitor: Option<String>,

        /// Output format: text (default) or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Replay a JSON-lines event log through the notification dispatcher
    Replay {
        /// File with one `{"event": ..., "payload": ...}` object per line
        events: PathBuf,

        #[command(flatten)]
        viewer: realtime::ViewerArgs,

        /// Print the outcome of every event
        #[arg(short, long)]
        verbose: bool,
    },

    /// Attach to the realtime channel and print notifications
    Listen {
        /// Socket server URL (default: from config)
        #[arg(long)]
        url: Option<String>,

        #[command(flatten)]
        viewer: realtime::ViewerArgs,
    },

    /// Connect as the tracked visitor and print open-chat requests
    Visit {
        /// Socket server URL (default: from config)
        #[arg(long)]
        url: Option<String>,

        /// Chatbot id (default: from config)
        #[arg(long)]
        chatbot: Option<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        engage_core::logging::init(&config.logging).context("failed to initialize logging")?;

    match args.command {
        Command::Status { ping } => cmd_status(&config, ping),
        Command::Identity {
            email,
            new_session,
            format,
        } => cmd_identity(email.as_deref(), new_session, &format),
        Command::Evaluate {
            campaigns,
            url,
            referrer,
            time_on_page,
            returning,
            visitor,
            format,
        } => {
            let context = VisitorContext {
                is_returning: returning,
                time_on_page_secs: time_on_page,
                current_url: url,
                referrer_url: referrer,
            };
            evaluate::run(&config, &campaigns, &context, visitor.as_deref(), &format)
        }
        Command::Replay {
            events,
            viewer,
            verbose,
        } => realtime::replay(&config, &events, &viewer, verbose),
        Command::Listen { url, viewer } => realtime::listen(&config, url, &viewer),
        Command::Visit { url, chatbot } => realtime::visit(&config, url, chatbot),
    }
}

/// Open and migrate the database at the XDG data path
pub(crate) fn open_database() -> Result<Arc<Database>> {
    let db_path = Config::database_path();
    tracing::info!(path = %db_path.display(), "Opening database");

    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;
    Ok(Arc::new(db))
}

/// Single-threaded runtime for the async parts of a command
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create async runtime")
}

fn cmd_status(config: &Config, ping: bool) -> Result<()> {
    println!("engage status");
    println!("=============");
    println!();

    println!("Config:   {}", Config::config_path().display());
    println!("Database: {}", Config::database_path().display());
    println!("Logs:     {}", Config::log_path().display());

    let db = open_database()?;
    let version = get_schema_version(&db.connection())?;
    println!("Schema:   v{}", version);
    println!();

    let collector = &config.collector;
    println!("Collector:");
    println!("  Enabled:    {}", collector.enabled);
    println!(
        "  Server URL: {}",
        collector.server_url.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  Time on page interval: {}s",
        collector.time_on_page_interval_secs
    );
    if ping {
        if collector.is_ready() {
            let client = CollectorClient::new(collector)?;
            let healthy = runtime()?.block_on(client.health_check())?;
            println!(
                "  Health:     {}",
                if healthy { "ok" } else { "unreachable" }
            );
        } else {
            println!("  Health:     (collector not configured)");
        }
    }
    println!();

    let channel = &config.channel;
    println!("Channel:");
    println!(
        "  Socket URL:   {}",
        channel.socket_url.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  Organization: {}",
        channel.organization_id.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  Chatbot:      {}",
        channel.chatbot_id.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  IP lookup:    {}",
        channel.ip_lookup_url.as_deref().unwrap_or("(not set)")
    );
    println!();

    println!("Targeting:");
    println!(
        "  Returning after:  {}s",
        config.targeting.returning_delay_secs
    );
    println!(
        "  Recheck interval: {}s",
        config.targeting.recheck_interval_secs
    );
    println!(
        "  Unknown fields:   {:?}",
        config.targeting.unknown_condition_fields
    );
    println!();

    println!("Frequency:");
    println!("  Cap recurring: {}", config.frequency.cap_recurring);
    println!("  Max views:     {}", config.frequency.max_views);
    println!("  Cooldown:      {}h", config.frequency.cooldown_hours);

    Ok(())
}

fn cmd_identity(email: Option<&str>, new_session: bool, format: &str) -> Result<()> {
    let db = open_database()?;
    let transient = SqliteStore::transient(db.clone());

    if new_session {
        let cleared = transient.clear().context("failed to clear session state")?;
        tracing::info!(cleared, "Started new session");
    }

    let identity = IdentityManager::new(Arc::new(SqliteStore::durable(db)), Arc::new(transient));
    if let Some(email) = email {
        identity.set_email(email).context("failed to store email")?;
    }

    let snapshot = identity.identity().context("failed to load visitor identity")?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("Visitor ID: {}", snapshot.visitor_id);
        println!("Session ID: {}", snapshot.session_id);
        println!(
            "Email:      {}",
            snapshot.email.as_deref().unwrap_or("(none)")
        );
    }

    Ok(())
}
