//! The embedded widget's own realtime connection
//!
//! A visitor connects with [`ConnectQuery::Visitor`] and listens for one
//! event, `open_chat`, which a dashboard agent sends to pull the visitor into
//! a conversation. The server routes it to the visitor's room, so no tenant
//! scoping applies.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::collector::{CollectorClient, UNKNOWN_IP};
use crate::error::{Error, Result};
use crate::tracker::IdentityManager;

use super::codec;
use super::event::{RealtimeEvent, OPEN_CHAT};
use super::identity::ConnectQuery;
use super::session::{
    handle_packet, next_frame, ChannelStats, EventSink, FrameOutcome, Inbound,
};
use super::transport::{Connection, Connector};

/// Handshake for the visitor this browser profile tracks as.
///
/// The public IP is looked up only when a collector client and lookup URL
/// are given; otherwise it is reported as unknown.
pub async fn visitor_query(
    identity: &IdentityManager,
    chatbot_id: &str,
    ip_lookup: Option<(&CollectorClient, &str)>,
) -> Result<ConnectQuery> {
    let snapshot = identity.identity()?;
    let ip_address = match ip_lookup {
        Some((client, lookup_url)) => client.public_ip(lookup_url).await,
        None => UNKNOWN_IP.to_string(),
    };
    Ok(ConnectQuery::visitor(chatbot_id, &snapshot, ip_address))
}

/// Realtime connection of one widget visitor.
pub struct VisitorChannel<S: EventSink> {
    connector: Arc<dyn Connector>,
    sink: S,
    query: Option<ConnectQuery>,
    connection: Option<Box<dyn Connection>>,
    stats: ChannelStats,
}

impl<S: EventSink> VisitorChannel<S> {
    pub fn new(connector: Arc<dyn Connector>, sink: S) -> Self {
        Self {
            connector,
            sink,
            query: None,
            connection: None,
            stats: ChannelStats::default(),
        }
    }

    /// Handshake of the last connect
    pub fn query(&self) -> Option<&ConnectQuery> {
        self.query.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
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

    /// Connect with `query`, closing any open connection first.
    ///
    /// The query is kept even if connecting fails, so [`run`](Self::run)
    /// can retry it.
    pub async fn connect(&mut self, query: ConnectQuery) -> Result<()> {
        let ConnectQuery::Visitor { visitor_id, .. } = &query else {
            return Err(Error::Channel(
                "visitor channel needs a visitor handshake".to_string(),
            ));
        };
        let visitor_id = visitor_id.clone();

        self.teardown().await;
        self.query = Some(query.clone());
        let connection = self.connector.connect(&query).await?;
        self.connection = Some(connection);

        info!(visitor_id = %visitor_id, "Connected as visitor");
        Ok(())
    }

    /// Close and drop the current connection
    pub async fn teardown(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.close().await {
                debug!(error = %e, "Error closing visitor connection");
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

        let (name, payload) = match handle_packet(&mut self.connection, packet).await {
            Inbound::Handled(outcome) => return outcome,
            Inbound::Event { name, payload } => (name, payload),
        };

        if name != OPEN_CHAT {
            debug!(event = %name, "Event not bound for visitors");
            self.stats.unbound += 1;
            return FrameOutcome::Unbound(name);
        }

        match RealtimeEvent::decode(&name, payload) {
            Ok(Some(RealtimeEvent::OpenChat(request))) if request.conversation_id.is_some() => {
                info!(conversation_id = ?request.conversation_id, "Open chat requested");
                self.sink.deliver(RealtimeEvent::OpenChat(request));
                self.stats.delivered += 1;
                FrameOutcome::Delivered(name)
            }
            Ok(_) => {
                warn!(event = %name, "Open chat request without a conversation id");
                self.stats.malformed += 1;
                FrameOutcome::Malformed
            }
            Err(e) => {
                warn!(event = %name, error = %e, "Dropping malformed event");
                self.stats.malformed += 1;
                FrameOutcome::Malformed
            }
        }
    }

    /// Drive the connection until shutdown or until the server goes away.
    ///
    /// Reconnects with the last handshake when no connection is open.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if self.connection.is_none() {
            let query = self.query.clone().ok_or_else(|| {
                Error::Channel("visitor channel has no handshake to connect with".to_string())
            })?;
            self.connect(query).await?;
        }

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
                        info!("Visitor connection closed by server");
                        self.connection = None;
                        return Ok(());
                    }
                    Err(e) => {
                        self.teardown().await;
                        return Err(e);
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Visitor channel shutting down");
                        self.teardown().await;
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::codec::Packet;
    use crate::channel::{MemoryConnector, ViewerIdentity, ANONYMOUS_EMAIL};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn identity() -> IdentityManager {
        IdentityManager::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    fn event_frame(name: &str, payload: serde_json::Value) -> String {
        codec::encode(&Packet::event(name, payload))
    }

    fn conversation_ids(events: &[RealtimeEvent]) -> Vec<Option<String>> {
        events
            .iter()
            .map(|event| match event {
                RealtimeEvent::OpenChat(request) => request.conversation_id.clone(),
                other => panic!("unexpected event {other:?}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_visitor_query_without_ip_lookup() {
        let identity = identity();
        let query = visitor_query(&identity, "bot-1", None).await.unwrap();
        let visitor_id = identity.get_or_create_visitor_id().unwrap();

        let pairs = query.pairs();
        assert!(pairs.contains(&("visitor_id", visitor_id)));
        assert!(pairs.contains(&("ip_address", UNKNOWN_IP.to_string())));
        assert!(pairs.contains(&("user_email", ANONYMOUS_EMAIL.to_string())));

        identity.set_email("jane@example.com").unwrap();
        let query = visitor_query(&identity, "bot-1", None).await.unwrap();
        assert!(query
            .pairs()
            .contains(&("user_email", "jane@example.com".to_string())));
    }

    #[tokio::test]
    async fn test_run_delivers_open_chat_requests() {
        let connector = MemoryConnector::new();
        connector.script([
            r#"0{"sid":"v","pingInterval":25000,"pingTimeout":20000}"#.to_string(),
            "40".to_string(),
            event_frame(OPEN_CHAT, json!({"conversationId": 77})),
            event_frame("ticket:created", json!({"ticket": {"subject": "x"}})),
            event_frame(OPEN_CHAT, json!({})),
            "1".to_string(),
        ]);
        let (_shutdown_tx, shutdown) = watch::channel(false);

        let mut channel = VisitorChannel::new(Arc::new(connector.clone()), Vec::new());
        let query = visitor_query(&identity(), "bot-1", None).await.unwrap();
        channel.connect(query.clone()).await.unwrap();
        channel.run(shutdown).await.unwrap();

        assert_eq!(conversation_ids(channel.sink()), vec![Some("77".to_string())]);
        let stats = channel.stats();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.unbound, 1);
        assert_eq!(stats.malformed, 1);
        assert_eq!(connector.connects(), vec![query]);
        assert_eq!(connector.sent(), vec!["40".to_string()]);
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn test_run_reconnects_with_last_handshake() {
        let connector = MemoryConnector::new();
        connector.refuse_next(1);
        connector.script(["1"]);
        connector.script([
            event_frame(OPEN_CHAT, json!({"conversationId": "c-2"})),
            "1".to_string(),
        ]);
        let (_shutdown_tx, shutdown) = watch::channel(false);

        let mut channel = VisitorChannel::new(Arc::new(connector.clone()), Vec::new());
        let query = visitor_query(&identity(), "bot-1", None).await.unwrap();
        assert!(channel.connect(query).await.is_err());
        assert!(channel.query().is_some());

        channel.run(shutdown.clone()).await.unwrap();
        channel.run(shutdown).await.unwrap();

        assert_eq!(connector.connects().len(), 2);
        assert_eq!(conversation_ids(channel.sink()), vec![Some("c-2".to_string())]);
    }

    #[tokio::test]
    async fn test_rejects_dashboard_handshake_and_missing_query() {
        let connector = MemoryConnector::new();
        let mut channel = VisitorChannel::new(Arc::new(connector.clone()), Vec::new());

        let dashboard = ConnectQuery::dashboard(&ViewerIdentity::new("42", "bot-1"));
        assert!(channel.connect(dashboard).await.is_err());

        let (_shutdown_tx, shutdown) = watch::channel(false);
        assert!(channel.run(shutdown).await.is_err());
        assert!(connector.connects().is_empty());
    }
}
