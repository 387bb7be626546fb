//! Fire-and-forget delivery of tracking payloads
//!
//! A [`Beacon`] accepts a payload and returns immediately. Whether the
//! payload reaches the collector is never reported back to the caller;
//! failures are logged at warn and dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Map, Value};

use super::client::CollectorClient;
use super::events::TrackingEndpoint;

/// Best-effort, non-blocking delivery.
pub trait Beacon: Send + Sync {
    /// Queue a payload. Returns whether it was accepted for delivery.
    fn send(&self, endpoint: TrackingEndpoint, payload: Map<String, Value>) -> bool;
}

impl<T: Beacon + ?Sized> Beacon for Arc<T> {
    fn send(&self, endpoint: TrackingEndpoint, payload: Map<String, Value>) -> bool {
        (**self).send(endpoint, payload)
    }
}

/// Delivery statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Payloads accepted by `send`
    pub queued: usize,
    /// Payloads the collector acknowledged with a 2xx
    pub delivered: usize,
    /// Payloads dropped after a transport or API error
    pub failed: usize,
}

impl DeliveryStats {
    /// Payloads still in flight
    pub fn pending(&self) -> usize {
        self.queued.saturating_sub(self.delivered + self.failed)
    }
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicUsize,
    delivered: AtomicUsize,
    failed: AtomicUsize,
}

/// Beacon that posts to the collector over HTTP.
///
/// Each send runs on its own task: on the ambient tokio runtime when called
/// from async code, otherwise on a short-lived thread with its own runtime.
#[derive(Clone)]
pub struct HttpBeacon {
    client: Arc<CollectorClient>,
    counters: Arc<Counters>,
}

impl HttpBeacon {
    pub fn new(client: CollectorClient) -> Self {
        Self {
            client: Arc::new(client),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            queued: self.counters.queued.load(Ordering::SeqCst),
            delivered: self.counters.delivered.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
        }
    }

    /// Wait until every queued payload settled or `timeout` elapsed.
    ///
    /// Returns the final statistics.
    pub async fn drain(&self, timeout: Duration) -> DeliveryStats {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let stats = self.stats();
            if stats.pending() == 0 || tokio::time::Instant::now() >= deadline {
                return stats;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    async fn deliver(
        client: Arc<CollectorClient>,
        counters: Arc<Counters>,
        endpoint: TrackingEndpoint,
        payload: Map<String, Value>,
    ) {
        match client.post(endpoint, &payload).await {
            Ok(()) => {
                counters.delivered.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(endpoint = %endpoint, "Tracking payload delivered");
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(endpoint = %endpoint, error = %e, "Tracking error");
            }
        }
    }
}

impl Beacon for HttpBeacon {
    fn send(&self, endpoint: TrackingEndpoint, payload: Map<String, Value>) -> bool {
        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        let task = Self::deliver(self.client.clone(), self.counters.clone(), endpoint, payload);

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(task);
            return true;
        }

        let counters = self.counters.clone();
        let spawned = std::thread::Builder::new()
            .name("engage-beacon".to_string())
            .spawn(move || {
                match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime.block_on(task),
                    Err(e) => {
                        counters.failed.fetch_add(1, Ordering::SeqCst);
                        tracing::warn!(endpoint = %endpoint, error = %e, "Tracking error");
                    }
                }
            });

        if let Err(e) = spawned {
            self.counters.failed.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(endpoint = %endpoint, error = %e, "Tracking error");
            return false;
        }
        true
    }
}

/// Beacon used when the collector is disabled. Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBeacon;

impl Beacon for NullBeacon {
    fn send(&self, endpoint: TrackingEndpoint, _payload: Map<String, Value>) -> bool {
        tracing::trace!(endpoint = %endpoint, "Collector disabled, payload dropped");
        false
    }
}

/// A payload captured by [`RecordingBeacon`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentBeacon {
    pub endpoint: TrackingEndpoint,
    pub payload: Map<String, Value>,
}

/// Beacon that keeps every payload in memory, for tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingBeacon {
    sent: Mutex<Vec<SentBeacon>>,
}

impl RecordingBeacon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, in send order
    pub fn sent(&self) -> Vec<SentBeacon> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Payloads sent to one endpoint, in send order
    pub fn sent_to(&self, endpoint: TrackingEndpoint) -> Vec<Map<String, Value>> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| s.endpoint == endpoint)
            .map(|s| s.payload.clone())
            .collect()
    }

    /// Drain the recorded payloads
    pub fn take(&self) -> Vec<SentBeacon> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl Beacon for RecordingBeacon {
    fn send(&self, endpoint: TrackingEndpoint, payload: Map<String, Value>) -> bool {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentBeacon { endpoint, payload });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollectorConfig;

    #[test]
    fn test_recording_beacon_filters_by_endpoint() {
        let beacon = RecordingBeacon::new();
        beacon.send(TrackingEndpoint::Scroll, Map::new());
        beacon.send(TrackingEndpoint::Click, Map::new());
        beacon.send(TrackingEndpoint::Scroll, Map::new());

        assert_eq!(beacon.sent_to(TrackingEndpoint::Scroll).len(), 2);
        assert_eq!(beacon.take().len(), 3);
        assert!(beacon.sent().is_empty());
    }

    #[test]
    fn test_null_beacon_refuses() {
        assert!(!NullBeacon.send(TrackingEndpoint::Bounce, Map::new()));
    }

    #[tokio::test]
    async fn test_http_beacon_failure_is_counted_not_raised() {
        let config = CollectorConfig {
            enabled: true,
            server_url: Some("http://127.0.0.1:9".to_string()),
            timeout_secs: 1,
            ..Default::default()
        };
        let beacon = HttpBeacon::new(CollectorClient::new(&config).unwrap());

        assert!(beacon.send(TrackingEndpoint::PageView, Map::new()));
        let stats = beacon.drain(Duration::from_secs(5)).await;

        assert_eq!(stats.queued, 1);
        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.failed, 1);
    }
}
