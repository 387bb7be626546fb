//! A dashboard viewer's realtime session
//!
//! [`ChannelSession`] owns the viewer identity, the set of bound event names
//! and the open connection. Frames are handled strictly in arrival order:
//! decode, check the bound names, decode the payload, check the tenant
//! scope, then hand the event to an [`EventSink`].

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::Result;

use super::codec::{self, Packet};
use super::event::{RealtimeEvent, SeoTopic, STATIC_EVENT_NAMES};
use super::identity::{ConnectQuery, ViewerIdentity};
use super::transport::{Connection, Connector};

/// Receives events that passed decoding and scoping.
pub trait EventSink: Send {
    fn deliver(&mut self, event: RealtimeEvent);
}

impl EventSink for mpsc::UnboundedSender<RealtimeEvent> {
    fn deliver(&mut self, event: RealtimeEvent) {
        if self.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

impl EventSink for Vec<RealtimeEvent> {
    fn deliver(&mut self, event: RealtimeEvent) {
        self.push(event);
    }
}

/// What handling one frame amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Handshake, heartbeat or noop
    Control,
    /// The server accepted the namespace connect
    Connected,
    /// The server closed the session or refused it
    Closed,
    /// Passed to the sink
    Delivered(String),
    /// Event name not bound for the current identity
    Unbound(String),
    /// Bound name this client has no handler for
    Unhandled(String),
    /// Belongs to another organization or chatbot
    OutOfScope(String),
    /// Frame or payload could not be decoded
    Malformed,
}

/// Counters of frame outcomes since the session was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub frames: u64,
    pub delivered: u64,
    pub out_of_scope: u64,
    pub unbound: u64,
    pub malformed: u64,
}

/// Event names currently bound.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscriptions {
    names: BTreeSet<String>,
}

impl Subscriptions {
    pub fn bind(&mut self, name: impl Into<String>) -> bool {
        self.names.insert(name.into())
    }

    pub fn unbind(&mut self, name: &str) -> bool {
        self.names.remove(name)
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Realtime session for one dashboard viewer at a time.
pub struct ChannelSession<S: EventSink> {
    connector: Arc<dyn Connector>,
    sink: S,
    identity: Option<ViewerIdentity>,
    connection: Option<Box<dyn Connection>>,
    subscriptions: Subscriptions,
    stats: ChannelStats,
}

impl<S: EventSink> ChannelSession<S> {
    pub fn new(connector: Arc<dyn Connector>, sink: S) -> Self {
        let mut subscriptions = Subscriptions::default();
        for name in STATIC_EVENT_NAMES {
            subscriptions.bind(*name);
        }
        Self {
            connector,
            sink,
            identity: None,
            connection: None,
            subscriptions,
            stats: ChannelStats::default(),
        }
    }

    pub fn identity(&self) -> Option<&ViewerIdentity> {
        self.identity.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Switch to a new viewer identity.
    ///
    /// Returns `Ok(false)` when neither id changed and the connection is
    /// still open. Otherwise the old
    /// connection is closed and dropped, the old organization's SEO names
    /// are unbound, the new ones bound, and a fresh connection opened. An
    /// incomplete identity leaves the session disconnected.
    pub async fn set_identity(&mut self, identity: Option<ViewerIdentity>) -> Result<bool> {
        let identity = identity.filter(ViewerIdentity::is_complete);
        if identity == self.identity && (identity.is_none() || self.connection.is_some()) {
            return Ok(false);
        }

        self.teardown().await;

        if let Some(old) = self.identity.take() {
            for topic in SeoTopic::all_for(&old.organization_id) {
                self.subscriptions.unbind(&topic.event_name());
            }
        }

        let Some(identity) = identity else {
            info!("Viewer identity cleared, channel disconnected");
            return Ok(true);
        };

        for topic in SeoTopic::all_for(&identity.organization_id) {
            self.subscriptions.bind(topic.event_name());
        }

        let query = ConnectQuery::dashboard(&identity);
        self.identity = Some(identity);
        let connection = self.connector.connect(&query).await?;
        self.connection = Some(connection);

        if let Some(identity) = &self.identity {
            info!(viewer = %identity, "Channel connected");
        }
        Ok(true)
    }

    /// Close and drop the current connection
    pub async fn teardown(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.close().await {
                debug!(error = %e, "Error closing channel connection");
            }
        }
    }

    /// Handle one inbound text frame
    pub async fn handle_frame(&mut self, frame: &str) -> FrameOutcome {
        self.stats.frames += 1;

        let packet = match codec::decode(frame) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable frame");
                self.stats.malformed += 1;
                return FrameOutcome::Malformed;
            }
        };

        match handle_packet(&mut self.connection, packet).await {
            Inbound::Handled(outcome) => outcome,
            Inbound::Event { name, payload } => self.handle_event(name, payload),
        }
    }

    fn handle_event(&mut self, name: String, payload: Value) -> FrameOutcome {
        if !self.subscriptions.is_bound(&name) {
            debug!(event = %name, "Event not bound");
            self.stats.unbound += 1;
            return FrameOutcome::Unbound(name);
        }

        let event = match RealtimeEvent::decode(&name, payload) {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(event = %name, "No handler for event");
                return FrameOutcome::Unhandled(name);
            }
            Err(e) => {
                warn!(event = %name, error = %e, "Dropping malformed event");
                self.stats.malformed += 1;
                return FrameOutcome::Malformed;
            }
        };

        let in_scope = self
            .identity
            .as_ref()
            .is_some_and(|viewer| event.in_scope(viewer));
        if !in_scope {
            debug!(event = %name, "Dropping event for another tenant");
            self.stats.out_of_scope += 1;
            return FrameOutcome::OutOfScope(name);
        }

        self.sink.deliver(event);
        self.stats.delivered += 1;
        FrameOutcome::Delivered(name)
    }

    /// Drive the session until shutdown or until the server goes away.
    ///
    /// Identity changes arriving on `identities` reconnect the session in
    /// place. A dropped shutdown sender counts as shutdown. Returns an error
    /// if the transport fails.
    pub async fn run(
        &mut self,
        mut identities: watch::Receiver<Option<ViewerIdentity>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let initial = identities.borrow_and_update().clone();
        self.set_identity(initial).await?;
        let mut identities_open = true;

        loop {
            tokio::select! {
                frame = next_frame(&mut self.connection) => match frame {
                    Ok(Some(frame)) => {
                        if self.handle_frame(&frame).await == FrameOutcome::Closed {
                            self.teardown().await;
                            return Ok(());
                        }
                    }
                    Ok(None) => {
                        info!("Channel connection closed by server");
                        self.connection = None;
                        return Ok(());
                    }
                    Err(e) => {
                        self.teardown().await;
                        return Err(e);
                    }
                },
                changed = identities.changed(), if identities_open => {
                    if changed.is_err() {
                        debug!("Identity source dropped");
                        identities_open = false;
                        continue;
                    }
                    let identity = identities.borrow_and_update().clone();
                    self.set_identity(identity).await?;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Channel shutting down");
                        self.teardown().await;
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// A decoded packet after transport-level handling.
pub(super) enum Inbound {
    Handled(FrameOutcome),
    Event { name: String, payload: Value },
}

/// Answer handshake and heartbeat packets on `connection`; events are returned.
pub(super) async fn handle_packet(
    connection: &mut Option<Box<dyn Connection>>,
    packet: Packet,
) -> Inbound {
    let outcome = match packet {
        Packet::Open(info) => {
            debug!(sid = %info.sid, ping_interval = info.ping_interval, "Engine.IO open");
            send_packet(connection, &Packet::connect()).await;
            FrameOutcome::Control
        }
        Packet::Ping(data) => {
            send_packet(connection, &Packet::Pong(data)).await;
            FrameOutcome::Control
        }
        Packet::Pong(_) | Packet::Noop => FrameOutcome::Control,
        Packet::Connect { namespace, .. } => {
            debug!(namespace = %namespace, "Namespace connected");
            FrameOutcome::Connected
        }
        Packet::ConnectError { namespace, data } => {
            warn!(namespace = %namespace, ?data, "Server refused namespace connect");
            FrameOutcome::Closed
        }
        Packet::Disconnect { namespace } => {
            info!(namespace = %namespace, "Server disconnected namespace");
            FrameOutcome::Closed
        }
        Packet::Close => {
            info!("Server closed the session");
            FrameOutcome::Closed
        }
        Packet::Event { name, payload, .. } => return Inbound::Event { name, payload },
    };
    Inbound::Handled(outcome)
}

async fn send_packet(connection: &mut Option<Box<dyn Connection>>, packet: &Packet) {
    let Some(connection) = connection.as_mut() else {
        return;
    };
    if let Err(e) = connection.send(codec::encode(packet)).await {
        warn!(error = %e, "Failed to send frame");
    }
}

pub(super) async fn next_frame(
    connection: &mut Option<Box<dyn Connection>>,
) -> Result<Option<String>> {
    match connection {
        Some(connection) => connection.recv().await,
        None => std::future::pending().await,
    }
}
