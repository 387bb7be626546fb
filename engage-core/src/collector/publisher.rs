//! Publisher for tracking events
//!
//! Stamps every payload with the visitor's identity and client facts, then
//! hands it to a [`Beacon`]. Publishing never fails: problems are logged and
//! counted so the host page is never affected.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::tracker::IdentityManager;

use super::beacon::Beacon;
use super::events::{ClientInfo, TrackingEvent};

/// Publishing statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishStats {
    /// Payloads accepted by the beacon
    pub published: usize,
    /// Payloads dropped before or by the beacon
    pub dropped: usize,
}

/// Enriches and sends tracking events.
pub struct Publisher {
    beacon: Arc<dyn Beacon>,
    identity: IdentityManager,
    client: ClientInfo,
    published: AtomicUsize,
    dropped: AtomicUsize,
}

impl Publisher {
    pub fn new(beacon: Arc<dyn Beacon>, identity: IdentityManager, client: ClientInfo) -> Self {
        Self {
            beacon,
            identity,
            client,
            published: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
        }
    }

    pub fn identity(&self) -> &IdentityManager {
        &self.identity
    }

    pub fn client_info(&self) -> &ClientInfo {
        &self.client
    }

    /// Publish one event. Returns whether the beacon accepted it.
    pub fn publish(&self, event: &TrackingEvent) -> bool {
        let endpoint = event.endpoint();

        let mut payload = match event.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(
                    endpoint = %endpoint,
                    error = %e,
                    "Failed to encode tracking payload"
                );
                return self.drop_one();
            }
        };

        let (session_id, user_id) = match (
            self.identity.get_or_create_session_id(),
            self.identity.get_or_create_visitor_id(),
        ) {
            (Ok(session_id), Ok(user_id)) => (session_id, user_id),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(endpoint = %endpoint, error = %e, "Visitor identity unavailable");
                return self.drop_one();
            }
        };

        payload.insert("sessionId".to_string(), Value::String(session_id));
        payload.insert("userId".to_string(), Value::String(user_id));
        payload.insert(
            "screenSize".to_string(),
            Value::String(self.client.screen_size()),
        );
        payload.insert(
            "language".to_string(),
            Value::String(self.client.language.clone()),
        );

        if self.beacon.send(endpoint, payload) {
            self.published.fetch_add(1, Ordering::SeqCst);
            true
        } else {
            self.drop_one()
        }
    }

    pub fn stats(&self) -> PublishStats {
        PublishStats {
            published: self.published.load(Ordering::SeqCst),
            dropped: self.dropped.load(Ordering::SeqCst),
        }
    }

    fn drop_one(&self) -> bool {
        self.dropped.fetch_add(1, Ordering::SeqCst);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::beacon::{NullBeacon, RecordingBeacon};
    use crate::collector::events::{ClickEvent, TrackingEndpoint};
    use crate::store::MemoryStore;

    fn identity() -> IdentityManager {
        IdentityManager::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    fn click() -> TrackingEvent {
        TrackingEvent::Click(ClickEvent {
            chatbot_id: "bot-1".to_string(),
            timestamp: 42,
        })
    }

    #[test]
    fn test_payload_is_enriched() {
        let beacon = Arc::new(RecordingBeacon::new());
        let identity = identity();
        let publisher = Publisher::new(
            beacon.clone(),
            identity.clone(),
            ClientInfo {
                screen_width: 800,
                screen_height: 600,
                language: "fr-FR".to_string(),
                ..Default::default()
            },
        );

        assert!(publisher.publish(&click()));

        let sent = beacon.sent_to(TrackingEndpoint::Click);
        assert_eq!(sent.len(), 1);
        let payload = &sent[0];
        assert_eq!(payload["chatbot_id"], "bot-1");
        assert_eq!(payload["screenSize"], "800x600");
        assert_eq!(payload["language"], "fr-FR");
        assert_eq!(
            payload["userId"],
            Value::String(identity.get_or_create_visitor_id().unwrap())
        );
        assert_eq!(
            payload["sessionId"],
            Value::String(identity.get_or_create_session_id().unwrap())
        );
    }

    #[test]
    fn test_refused_send_is_counted() {
        let publisher = Publisher::new(Arc::new(NullBeacon), identity(), ClientInfo::default());
        assert!(!publisher.publish(&click()));
        assert_eq!(
            publisher.stats(),
            PublishStats {
                published: 0,
                dropped: 1
            }
        );
    }
}
