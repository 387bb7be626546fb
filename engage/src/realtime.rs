//! Realtime commands: replay a recorded dashboard log, listen live as a
//! dashboard viewer, or connect as a widget visitor

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use engage_core::channel::{
    encode, visitor_query, ChannelSession, ChannelStats, MemoryConnector, Packet, ViewerIdentity,
    VisitorChannel, WsConnector,
};
use engage_core::collector::CollectorClient;
use engage_core::notify::{Alerts, NotificationDispatcher, ShellState, UnreadCounters};
use engage_core::tracker::IdentityManager;
use engage_core::{Config, SqliteStore};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::console::{ConsoleAlerts, ConsoleOpenChat};

/// Who the dashboard session is opened for.
#[derive(Args, Debug, Clone)]
pub struct ViewerArgs {
    /// Organization id (default: from config)
    #[arg(long)]
    pub organization: Option<String>,

    /// Chatbot id (default: from config)
    #[arg(long)]
    pub chatbot: Option<String>,

    /// Role segment used in notification links
    #[arg(long, default_value = "admin")]
    pub role: String,

    /// Start with audio unlocked, as after a click on the page
    #[arg(long)]
    pub unlock_audio: bool,
}

impl ViewerArgs {
    fn viewer(&self, config: &Config) -> Result<ViewerIdentity> {
        let organization = self
            .organization
            .clone()
            .or_else(|| config.channel.organization_id.clone())
            .context("organization id not set (use --organization or [channel] organization_id)")?;
        let chatbot = self
            .chatbot
            .clone()
            .or_else(|| config.channel.chatbot_id.clone())
            .context("chatbot id not set (use --chatbot or [channel] chatbot_id)")?;

        let viewer = ViewerIdentity::new(organization, chatbot);
        if !viewer.is_complete() {
            bail!("organization and chatbot ids must not be empty");
        }
        Ok(viewer)
    }

    fn dispatcher(&self, config: &Config) -> Result<NotificationDispatcher> {
        let db = crate::open_database()?;
        let mut dispatcher = NotificationDispatcher::new(
            ShellState::new(self.role.clone()).shared(),
            Alerts::from_single(Arc::new(ConsoleAlerts)),
            &config.notifications,
        )
        .with_marker_store(Arc::new(SqliteStore::durable(db)))
        .on_onboarding_update(|organization_id| {
            println!("[i] Onboarding progress updated for {}", organization_id);
        });

        if self.unlock_audio {
            dispatcher.on_user_gesture();
        }
        Ok(dispatcher)
    }
}

/// One line of a recorded event log.
#[derive(Debug, Deserialize)]
struct LoggedEvent {
    event: String,
    #[serde(default)]
    payload: Value,
}

pub fn replay(config: &Config, events_path: &Path, args: &ViewerArgs, verbose: bool) -> Result<()> {
    let content = fs::read_to_string(events_path)
        .with_context(|| format!("failed to read events from {}", events_path.display()))?;
    let viewer = args.viewer(config)?;
    let dispatcher = args.dispatcher(config)?;

    let mut session = ChannelSession::new(Arc::new(MemoryConnector::new()), dispatcher);
    let runtime = crate::runtime()?;

    let skipped = runtime.block_on(async {
        session.set_identity(Some(viewer)).await?;

        let mut skipped = 0usize;
        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let logged: LoggedEvent = match serde_json::from_str(line) {
                Ok(logged) => logged,
                Err(e) => {
                    eprintln!("line {}: {}", index + 1, e);
                    skipped += 1;
                    continue;
                }
            };

            let frame = encode(&Packet::event(logged.event, logged.payload));
            let outcome = session.handle_frame(&frame).await;
            if verbose {
                println!("    line {}: {:?}", index + 1, outcome);
            }
        }

        session.teardown().await;
        Ok::<_, anyhow::Error>(skipped)
    })?;

    println!();
    println!("Replay complete");
    if skipped > 0 {
        println!("  Skipped lines: {}", skipped);
    }
    print_summary(&session.stats(), &counters(session.sink()));
    Ok(())
}

pub fn listen(config: &Config, url: Option<String>, args: &ViewerArgs) -> Result<()> {
    let url = url
        .or_else(|| config.channel.socket_url.clone())
        .context("socket url not set (use --url or [channel] socket_url)")?;
    let viewer = args.viewer(config)?;
    let dispatcher = args.dispatcher(config)?;

    let mut session = ChannelSession::new(Arc::new(WsConnector::new(url.clone())), dispatcher);
    let runtime = crate::runtime()?;

    runtime.block_on(async {
        let (shutdown_tx, shutdown) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(true);
            }
        });

        let (_identity_tx, identities) = watch::channel(Some(viewer.clone()));
        println!("Listening on {} as {} (Ctrl-C to stop)", url, viewer);
        session.run(identities, shutdown).await
    })?;

    println!();
    println!("Session closed");
    print_summary(&session.stats(), &counters(session.sink()));
    Ok(())
}

pub fn visit(config: &Config, url: Option<String>, chatbot: Option<String>) -> Result<()> {
    let url = url
        .or_else(|| config.channel.socket_url.clone())
        .context("socket url not set (use --url or [channel] socket_url)")?;
    let chatbot = chatbot
        .or_else(|| config.channel.chatbot_id.clone())
        .filter(|id| !id.is_empty())
        .context("chatbot id not set (use --chatbot or [channel] chatbot_id)")?;

    let db = crate::open_database()?;
    let identity = IdentityManager::new(
        Arc::new(SqliteStore::durable(db.clone())),
        Arc::new(SqliteStore::transient(db)),
    );
    let client = if config.collector.is_ready() {
        Some(CollectorClient::new(&config.collector)?)
    } else {
        None
    };

    let mut channel = VisitorChannel::new(Arc::new(WsConnector::new(url.clone())), ConsoleOpenChat);
    let runtime = crate::runtime()?;

    runtime.block_on(async {
        let ip_lookup = client.as_ref().zip(config.channel.ip_lookup_url.as_deref());
        let query = visitor_query(&identity, &chatbot, ip_lookup).await?;
        channel.connect(query).await?;

        let (shutdown_tx, shutdown) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(true);
            }
        });

        println!("Connected to {} as a visitor of {} (Ctrl-C to stop)", url, chatbot);
        channel.run(shutdown).await?;
        Ok::<_, anyhow::Error>(())
    })?;

    let stats = channel.stats();
    println!();
    println!("Session closed");
    println!("  Frames:             {}", stats.frames);
    println!("  Open chat requests: {}", stats.delivered);
    Ok(())
}

fn counters(dispatcher: &NotificationDispatcher) -> UnreadCounters {
    dispatcher
        .state()
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .counters
}

fn print_summary(stats: &ChannelStats, counters: &UnreadCounters) {
    println!("  Frames:       {}", stats.frames);
    println!("  Delivered:    {}", stats.delivered);
    println!("  Out of scope: {}", stats.out_of_scope);
    println!("  Unbound:      {}", stats.unbound);
    println!("  Malformed:    {}", stats.malformed);
    println!();
    println!("Counters:");
    println!("  New chats:   {}", counters.new_chat_count);
    println!("  New tickets: {}", counters.new_ticket_count);
    println!("  Traffic:     {}", counters.traffic_count);
}
