//! Tracking collector delivery
//!
//! Tracking is best-effort:
//! - payloads are handed to a [`Beacon`] and never awaited by the caller
//! - a failed send is logged at warn and dropped, with no retries
//! - nothing in this module can block or fail the code that tracks
//!
//! ## Usage
//!
//! Enable delivery in `~/.config/engage/config.toml`:
//!
//! ```toml
//! [collector]
//! enabled = true
//! server_url = "https://api.example.com"
//! ```

mod beacon;
mod client;
mod events;
mod publisher;

pub use beacon::{Beacon, DeliveryStats, HttpBeacon, NullBeacon, RecordingBeacon, SentBeacon};
pub use client::{CollectorClient, UNKNOWN_IP};
pub use events::{
    now_millis, origin_of, BounceEvent, CampaignEvent, CampaignEventKind, ClickEvent, ClientInfo,
    ComplaintUrlEvent, PageViewEvent, ScrollEvent, TimeOnPageEvent, TrackingEndpoint,
    TrackingEvent, UtmParams,
};
pub use publisher::{PublishStats, Publisher};

use std::sync::Arc;

use crate::config::CollectorConfig;
use crate::error::Result;

/// Build the beacon described by the configuration.
///
/// A disabled or incomplete collector yields a [`NullBeacon`].
pub fn beacon_from_config(config: &CollectorConfig) -> Result<Arc<dyn Beacon>> {
    if !config.is_ready() {
        return Ok(Arc::new(NullBeacon));
    }
    let client = CollectorClient::new(config)?;
    Ok(Arc::new(HttpBeacon::new(client)))
}
