//! Widget-side campaign selection loop
//!
//! Given the campaigns fetched for a widget, show at most one per page view:
//! the first active campaign the frequency guard allows whose targeting
//! matches the live visitor context. Once one is shown the selector latches.

use std::time::Duration;

use tokio::sync::watch;

use crate::targeting::{explain_targeting, TargetingOptions, TargetingOutcome};
use crate::types::{Campaign, VisitorContext};

use super::analytics::CampaignAnalytics;
use super::frequency::FrequencyGuard;

/// Picks and records the campaign shown on a page view.
pub struct CampaignSelector {
    campaigns: Vec<Campaign>,
    guard: FrequencyGuard,
    analytics: CampaignAnalytics,
    options: TargetingOptions,
    shown: Option<Campaign>,
}

impl CampaignSelector {
    /// Inactive campaigns are dropped up front.
    pub fn new(
        campaigns: Vec<Campaign>,
        guard: FrequencyGuard,
        analytics: CampaignAnalytics,
        options: TargetingOptions,
    ) -> Self {
        let total = campaigns.len();
        let campaigns: Vec<Campaign> = campaigns.into_iter().filter(Campaign::is_active).collect();
        tracing::debug!(total, active = campaigns.len(), "Loaded campaigns");

        Self {
            campaigns,
            guard,
            analytics,
            options,
            shown: None,
        }
    }

    pub fn campaigns(&self) -> &[Campaign] {
        &self.campaigns
    }

    /// The campaign shown on this page view, if any
    pub fn shown(&self) -> Option<&Campaign> {
        self.shown.as_ref()
    }

    /// Evaluate once. Returns the campaign newly shown by this call.
    pub fn check(&mut self, visitor_id: &str, context: &VisitorContext) -> Option<&Campaign> {
        if self.shown.is_some() {
            return None;
        }

        let found = self.campaigns.iter().find(|campaign| {
            if !self.guard.can_show(campaign, visitor_id) {
                tracing::debug!(
                    campaign_id = campaign.id,
                    "Campaign skipped: frequency limit reached"
                );
                return false;
            }
            let outcome = explain_targeting(campaign, context, &self.options);
            if outcome != TargetingOutcome::Matched {
                tracing::trace!(
                    campaign_id = campaign.id,
                    outcome = outcome.as_str(),
                    "Campaign not matched"
                );
            }
            outcome.is_match()
        })?;

        let campaign = found.clone();
        tracing::info!(
            campaign_id = campaign.id,
            visitor_id = %visitor_id,
            "Campaign matched targeting rules"
        );

        self.guard.record_view(&campaign, visitor_id);
        self.analytics.track_impression(campaign.id);
        self.shown = Some(campaign);
        self.shown.as_ref()
    }

    /// The visitor clicked a button of the shown campaign
    pub fn click(&self, button_id: &str, url: Option<&str>, action_type: Option<&str>) -> bool {
        match &self.shown {
            Some(campaign) => self
                .analytics
                .track_click(campaign.id, button_id, url, action_type),
            None => false,
        }
    }

    /// The visitor closed the shown campaign; the selector stays latched
    pub fn close(&self) -> bool {
        match &self.shown {
            Some(campaign) => self.analytics.track_close(campaign.id),
            None => false,
        }
    }

    /// Re-check every `interval` until a campaign is shown or `shutdown` flips.
    pub async fn run<F>(
        &mut self,
        visitor_id: &str,
        mut context: F,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Option<Campaign>
    where
        F: FnMut() -> VisitorContext,
    {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let ctx = context();
                    if let Some(campaign) = self.check(visitor_id, &ctx) {
                        return Some(campaign.clone());
                    }
                    if self.campaigns.is_empty() {
                        return None;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return None;
                    }
                }
            }
        }
    }
}
