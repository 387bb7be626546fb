//! Campaign frequency capping
//!
//! View records are kept per visitor as one JSON document in the durable
//! store, keyed by campaign id:
//!
//! ```json
//! { "7": { "count": 1, "lastView": 1700000000000, "views": [1700000000000] } }
//! ```
//!
//! Store failures never block a campaign: an unreadable record is treated
//! as "never viewed" and a failed write is logged.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::config::FrequencyConfig;
use crate::store::{keys, KeyValueStore};
use crate::types::{Campaign, CampaignType};

/// Views of one campaign by one visitor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignViewRecord {
    pub count: u32,
    /// Unix milliseconds of the latest view
    pub last_view: i64,
    /// Unix milliseconds of every view
    #[serde(default)]
    pub views: Vec<i64>,
}

type ViewRecords = BTreeMap<String, CampaignViewRecord>;

/// Ten years; longer cooldowns are clamped
const MAX_COOLDOWN_HOURS: u64 = 24 * 365 * 10;

/// How often a campaign may be shown to the same visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencyPolicy {
    /// Apply `max_views` and `cooldown` to recurring campaigns
    pub cap_recurring: bool,
    pub max_views: u32,
    pub cooldown: chrono::Duration,
}

impl Default for FrequencyPolicy {
    fn default() -> Self {
        Self::from(&FrequencyConfig::default())
    }
}

impl From<&FrequencyConfig> for FrequencyPolicy {
    fn from(config: &FrequencyConfig) -> Self {
        let hours = config.cooldown_hours.min(MAX_COOLDOWN_HOURS) as i64;
        Self {
            cap_recurring: config.cap_recurring,
            max_views: config.max_views,
            cooldown: chrono::Duration::hours(hours),
        }
    }
}

/// Decides whether a campaign may be shown and records views.
#[derive(Clone)]
pub struct FrequencyGuard {
    store: Arc<dyn KeyValueStore>,
    policy: FrequencyPolicy,
}

impl FrequencyGuard {
    pub fn new(store: Arc<dyn KeyValueStore>, policy: FrequencyPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &FrequencyPolicy {
        &self.policy
    }

    /// Whether `campaign` may be shown to `visitor_id` now
    pub fn can_show(&self, campaign: &Campaign, visitor_id: &str) -> bool {
        self.can_show_at(campaign, visitor_id, Utc::now())
    }

    /// Whether `campaign` may be shown to `visitor_id` at `now`
    pub fn can_show_at(&self, campaign: &Campaign, visitor_id: &str, now: DateTime<Utc>) -> bool {
        let record = self.load(visitor_id).remove(&campaign.id.to_string());

        match (campaign.campaign_type, record) {
            (_, None) => true,
            (CampaignType::OneTime, Some(_)) => false,
            (CampaignType::Recurring, Some(_)) if !self.policy.cap_recurring => true,
            (CampaignType::Recurring, Some(record)) => {
                let cooled_down = match Utc.timestamp_millis_opt(record.last_view).single() {
                    Some(last) => now.signed_duration_since(last) >= self.policy.cooldown,
                    None => true,
                };
                record.count < self.policy.max_views && cooled_down
            }
        }
    }

    /// Record that `campaign` was shown. Uncapped recurring campaigns are not recorded.
    pub fn record_view(&self, campaign: &Campaign, visitor_id: &str) {
        self.record_view_at(campaign, visitor_id, Utc::now());
    }

    pub fn record_view_at(&self, campaign: &Campaign, visitor_id: &str, now: DateTime<Utc>) {
        if !self.is_tracked(campaign.campaign_type) {
            return;
        }

        let mut records = self.load(visitor_id);
        let millis = now.timestamp_millis();
        let record = records.entry(campaign.id.to_string()).or_default();
        record.count += 1;
        record.last_view = millis;
        record.views.push(millis);

        tracing::debug!(
            campaign_id = campaign.id,
            visitor_id = %visitor_id,
            count = record.count,
            "Recorded campaign view"
        );
        self.save(visitor_id, &records);
    }

    /// Times `campaign_id` was recorded for this visitor
    pub fn view_count(&self, campaign_id: i64, visitor_id: &str) -> u32 {
        self.load(visitor_id)
            .get(&campaign_id.to_string())
            .map(|r| r.count)
            .unwrap_or(0)
    }

    /// When `campaign_id` was last recorded for this visitor
    pub fn last_view_time(&self, campaign_id: i64, visitor_id: &str) -> Option<DateTime<Utc>> {
        self.load(visitor_id)
            .get(&campaign_id.to_string())
            .and_then(|r| Utc.timestamp_millis_opt(r.last_view).single())
    }

    /// Forget views of one campaign
    pub fn reset(&self, campaign_id: i64, visitor_id: &str) {
        let mut records = self.load(visitor_id);
        if records.remove(&campaign_id.to_string()).is_some() {
            self.save(visitor_id, &records);
        }
    }

    /// Forget every view of this visitor
    pub fn clear_all(&self, visitor_id: &str) {
        if let Err(e) = self.store.remove(&keys::campaign_views(visitor_id)) {
            tracing::warn!(visitor_id = %visitor_id, error = %e, "Failed to clear campaign views");
        }
    }

    fn is_tracked(&self, campaign_type: CampaignType) -> bool {
        campaign_type == CampaignType::OneTime || self.policy.cap_recurring
    }

    fn load(&self, visitor_id: &str) -> ViewRecords {
        let raw = match self.store.get(&keys::campaign_views(visitor_id)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return ViewRecords::new(),
            Err(e) => {
                tracing::warn!(
                    visitor_id = %visitor_id,
                    error = %e,
                    "Error reading campaign views"
                );
                return ViewRecords::new();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(
                visitor_id = %visitor_id,
                error = %e,
                "Discarding unreadable campaign views"
            );
            ViewRecords::new()
        })
    }

    fn save(&self, visitor_id: &str, records: &ViewRecords) {
        let result = serde_json::to_string(records)
            .map_err(crate::error::Error::from)
            .and_then(|json| self.store.set(&keys::campaign_views(visitor_id), &json));

        if let Err(e) = result {
            tracing::warn!(visitor_id = %visitor_id, error = %e, "Error saving campaign views");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{CampaignRules, CampaignTargeting, CampaignTrigger, TimeUnit, VisitorType};

    fn campaign(id: i64, campaign_type: CampaignType) -> Campaign {
        Campaign {
            id,
            status: "active".to_string(),
            campaign_type,
            targeting: CampaignTargeting {
                visitor_type: VisitorType::All,
                trigger: CampaignTrigger::time_on_page(0.0, TimeUnit::Seconds),
                rules: CampaignRules::default(),
            },
        }
    }

    fn guard(policy: FrequencyPolicy) -> (FrequencyGuard, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (FrequencyGuard::new(store.clone(), policy), store)
    }

    #[test]
    fn test_recurring_always_shown_and_not_recorded() {
        let (guard, store) = guard(FrequencyPolicy::default());
        let c = campaign(1, CampaignType::Recurring);

        for _ in 0..5 {
            assert!(guard.can_show(&c, "v-1"));
            guard.record_view(&c, "v-1");
        }
        assert_eq!(guard.view_count(1, "v-1"), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_one_time_shown_once_per_visitor() {
        let (guard, _) = guard(FrequencyPolicy::default());
        let c = campaign(2, CampaignType::OneTime);

        assert!(guard.can_show(&c, "v-1"));
        guard.record_view(&c, "v-1");
        assert!(!guard.can_show(&c, "v-1"));
        assert!(guard.can_show(&c, "v-2"));
        assert_eq!(guard.view_count(2, "v-1"), 1);
        assert!(guard.last_view_time(2, "v-1").is_some());

        guard.reset(2, "v-1");
        assert!(guard.can_show(&c, "v-1"));
    }

    #[test]
    fn test_capped_recurring_respects_cooldown_and_max() {
        let (guard, _) = guard(FrequencyPolicy {
            cap_recurring: true,
            max_views: 2,
            cooldown: chrono::Duration::hours(24),
        });
        let c = campaign(3, CampaignType::Recurring);
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        assert!(guard.can_show_at(&c, "v-1", t0));
        guard.record_view_at(&c, "v-1", t0);
        assert!(!guard.can_show_at(&c, "v-1", t0 + chrono::Duration::hours(23)));

        let t1 = t0 + chrono::Duration::hours(24);
        assert!(guard.can_show_at(&c, "v-1", t1));
        guard.record_view_at(&c, "v-1", t1);
        assert!(!guard.can_show_at(&c, "v-1", t1 + chrono::Duration::days(30)));
    }

    #[test]
    fn test_corrupt_record_treated_as_unseen() {
        let (guard, store) = guard(FrequencyPolicy::default());
        store.set(&keys::campaign_views("v-1"), "{not json").unwrap();

        let c = campaign(4, CampaignType::OneTime);
        assert!(guard.can_show(&c, "v-1"));
        guard.record_view(&c, "v-1");
        assert!(!guard.can_show(&c, "v-1"));
    }

    #[test]
    fn test_clear_all() {
        let (guard, store) = guard(FrequencyPolicy::default());
        guard.record_view(&campaign(5, CampaignType::OneTime), "v-1");
        guard.clear_all("v-1");
        assert!(store.is_empty());
    }

    #[test]
    fn test_record_json_shape() {
        let (guard, store) = guard(FrequencyPolicy::default());
        let t0 = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        guard.record_view_at(&campaign(6, CampaignType::OneTime), "v-1", t0);

        let raw = store.get(&keys::campaign_views("v-1")).unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["6"]["count"], 1);
        assert_eq!(json["6"]["lastView"], 1_700_000_000_000i64);
        assert_eq!(json["6"]["views"][0], 1_700_000_000_000i64);
    }
}
