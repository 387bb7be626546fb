//! Realtime transports
//!
//! A [`Connector`] opens a [`Connection`] for a handshake query. Frames are
//! Socket.IO text frames; see [`super::codec`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{Error, Result};

use super::codec::socket_url;
use super::identity::ConnectQuery;

/// One open connection.
#[async_trait]
pub trait Connection: Send {
    /// Send one text frame
    async fn send(&mut self, frame: String) -> Result<()>;

    /// Next text frame, `None` once the connection is closed
    async fn recv(&mut self) -> Result<Option<String>>;

    /// Close the connection; closing twice is not an error
    async fn close(&mut self) -> Result<()>;
}

/// Opens connections.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, query: &ConnectQuery) -> Result<Box<dyn Connection>>;
}

// ============================================
// Websocket
// ============================================

/// Connects to a Socket.IO server over a websocket.
#[derive(Debug, Clone)]
pub struct WsConnector {
    base_url: String,
}

impl WsConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, query: &ConnectQuery) -> Result<Box<dyn Connection>> {
        let url = socket_url(&self.base_url, query)?;
        tracing::info!(url = %url, "Connecting realtime channel");

        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::Channel(format!("websocket connect failed: {}", e)))?;

        Ok(Box::new(WsConnection {
            stream,
            closed: false,
        }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    closed: bool,
}

#[async_trait]
impl Connection for WsConnection {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| Error::Channel(format!("websocket send failed: {}", e)))
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        if self.closed {
            return Ok(None);
        }
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => return Ok(Some(text.as_str().to_string())),
                Ok(Message::Binary(bin)) => {
                    tracing::debug!(len = bin.len(), "Ignoring binary frame");
                }
                Ok(Message::Close(frame)) => {
                    tracing::info!(?frame, "Realtime channel closed by server");
                    self.closed = true;
                    return Ok(None);
                }
                Ok(_) => {}
                Err(e) => {
                    self.closed = true;
                    return Err(Error::Channel(format!("websocket error: {}", e)));
                }
            }
        }
        self.closed = true;
        Ok(None)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| Error::Channel(format!("websocket close failed: {}", e)))
    }
}

// ============================================
// In-memory
// ============================================

#[derive(Debug, Default)]
struct MemoryState {
    connects: Vec<ConnectQuery>,
    sent: Vec<String>,
    closed: usize,
    /// Server frames queued for the next connection
    scripts: VecDeque<Vec<String>>,
    /// Live inbound senders, one per open connection
    live: Vec<mpsc::UnboundedSender<String>>,
    /// Connect attempts still to be refused
    refusals: usize,
}

/// In-process connector for tests and replays.
///
/// Each `connect` takes the next scripted frame list, if any. Frames pushed
/// with [`MemoryConnector::push`] go to the most recent connection.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue the frames the next connection will receive first
    pub fn script<I, S>(&self, frames: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state()
            .scripts
            .push_back(frames.into_iter().map(Into::into).collect());
    }

    /// Refuse the next `count` connect attempts
    pub fn refuse_next(&self, count: usize) {
        self.state().refusals = count;
    }

    /// Deliver a frame to the most recent connection
    pub fn push(&self, frame: impl Into<String>) -> bool {
        match self.state().live.last() {
            Some(tx) => tx.send(frame.into()).is_ok(),
            None => false,
        }
    }

    /// Drop the inbound side of every connection, ending their streams
    pub fn hang_up(&self) {
        self.state().live.clear();
    }

    /// Queries of every connection opened, in order
    pub fn connects(&self) -> Vec<ConnectQuery> {
        self.state().connects.clone()
    }

    /// Frames sent by the client, across all connections
    pub fn sent(&self) -> Vec<String> {
        self.state().sent.clone()
    }

    /// How many connections were closed by the client
    pub fn closed(&self) -> usize {
        self.state().closed
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, query: &ConnectQuery) -> Result<Box<dyn Connection>> {
        let mut state = self.state();
        if state.refusals > 0 {
            state.refusals -= 1;
            return Err(Error::Channel("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.connects.push(query.clone());
        for frame in state.scripts.pop_front().unwrap_or_default() {
            // Receiver is alive, cannot fail
            let _ = tx.send(frame);
        }
        state.live.push(tx);

        Ok(Box::new(MemoryConnection {
            state: self.state.clone(),
            inbound: rx,
            closed: false,
        }))
    }
}

struct MemoryConnection {
    state: Arc<Mutex<MemoryState>>,
    inbound: mpsc::UnboundedReceiver<String>,
    closed: bool,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn send(&mut self, frame: String) -> Result<()> {
        if self.closed {
            return Err(Error::Channel("connection closed".to_string()));
        }
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .sent
            .push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        if self.closed {
            return Ok(None);
        }
        Ok(self.inbound.recv().await)
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.inbound.close();
            self.state
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .closed += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> ConnectQuery {
        ConnectQuery::Dashboard {
            chatbot_id: "bot-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_memory_connector_scripts_and_records() {
        let connector = MemoryConnector::new();
        connector.script(["0{\"sid\":\"a\"}", "2"]);

        let mut conn = connector.connect(&query()).await.unwrap();
        assert_eq!(conn.recv().await.unwrap().as_deref(), Some("0{\"sid\":\"a\"}"));
        assert_eq!(conn.recv().await.unwrap().as_deref(), Some("2"));

        assert!(connector.push("6"));
        assert_eq!(conn.recv().await.unwrap().as_deref(), Some("6"));

        conn.send("3".to_string()).await.unwrap();
        conn.close().await.unwrap();
        conn.close().await.unwrap();

        assert_eq!(connector.sent(), vec!["3".to_string()]);
        assert_eq!(connector.closed(), 1);
        assert_eq!(connector.connects(), vec![query()]);
        assert_eq!(conn.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_refused_connects_are_not_recorded() {
        let connector = MemoryConnector::new();
        connector.refuse_next(1);
        assert!(connector.connect(&query()).await.is_err());
        assert!(connector.connect(&query()).await.is_ok());
        assert_eq!(connector.connects().len(), 1);
    }

    #[tokio::test]
    async fn test_hang_up_ends_stream() {
        let connector = MemoryConnector::new();
        let mut conn = connector.connect(&query()).await.unwrap();
        connector.hang_up();
        assert_eq!(conn.recv().await.unwrap(), None);
    }
}
