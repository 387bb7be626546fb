//! Campaign impression, click and close analytics

use std::sync::Arc;

use crate::collector::{now_millis, Beacon, CampaignEvent, CampaignEventKind, TrackingEvent};

/// Fire-and-forget analytics for one widget installation.
#[derive(Clone)]
pub struct CampaignAnalytics {
    beacon: Arc<dyn Beacon>,
    app_id: String,
}

impl CampaignAnalytics {
    pub fn new(beacon: Arc<dyn Beacon>, app_id: impl Into<String>) -> Self {
        Self {
            beacon,
            app_id: app_id.into(),
        }
    }

    /// A campaign was shown
    pub fn track_impression(&self, campaign_id: i64) -> bool {
        self.send(CampaignEventKind::CampaignImpression, campaign_id, None, None, None)
    }

    /// A campaign button was clicked
    pub fn track_click(
        &self,
        campaign_id: i64,
        button_id: &str,
        url: Option<&str>,
        action_type: Option<&str>,
    ) -> bool {
        self.send(
            CampaignEventKind::CampaignClick,
            campaign_id,
            Some(button_id),
            url,
            action_type,
        )
    }

    /// The visitor closed a campaign
    pub fn track_close(&self, campaign_id: i64) -> bool {
        self.send(CampaignEventKind::CampaignClose, campaign_id, None, None, None)
    }

    fn send(
        &self,
        event: CampaignEventKind,
        campaign_id: i64,
        button_id: Option<&str>,
        url: Option<&str>,
        action_type: Option<&str>,
    ) -> bool {
        let event = TrackingEvent::Campaign(CampaignEvent {
            event,
            campaign_id,
            app_id: self.app_id.clone(),
            timestamp: now_millis(),
            button_id: button_id.map(str::to_string),
            url: url.map(str::to_string),
            action_type: action_type.map(str::to_string),
        });

        tracing::debug!(campaign_id, event = ?event, "Campaign analytics");

        match event.to_payload() {
            Ok(payload) => self.beacon.send(event.endpoint(), payload),
            Err(e) => {
                tracing::warn!(campaign_id, error = %e, "Error sending campaign analytics");
                false
            }
        }
    }
}
