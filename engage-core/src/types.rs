//! Core domain types for engage
//!
//! These types describe campaigns as the campaign API serves them and the
//! live visitor context the widget computes while a page is open.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Visitor** | A browser profile on the customer's site, identified by a persistent id |
//! | **Session** | One browsing tab; a visitor has many sessions |
//! | **Campaign** | A message shown in the widget when its targeting rules match |
//! | **Viewer** | A dashboard user watching an organization's traffic |
//!
//! Enumerated campaign fields are tolerant on input: unrecognized values
//! deserialize into an `Unknown`/fallback variant instead of failing, so a
//! malformed campaign degrades to "never shown" rather than breaking the page.

use serde::{Deserialize, Serialize};

// ============================================
// Visitor
// ============================================

/// Identity of a visitor as seen by the tracking collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorIdentity {
    /// Persistent id, generated once per browser profile
    pub visitor_id: String,
    /// Per-tab id, regenerated when the tab's transient store is empty
    pub session_id: String,
    /// Email captured by a pre-chat form, if any
    pub email: Option<String>,
}

/// Live context the targeting evaluator decides on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorContext {
    /// Whether this visitor has been seen before
    pub is_returning: bool,
    /// Seconds since the page was loaded
    #[serde(rename = "timeOnPage")]
    pub time_on_page_secs: f64,
    /// URL of the page being viewed
    pub current_url: String,
    /// Referrer of the page being viewed
    pub referrer_url: String,
}

// ============================================
// Campaign
// ============================================

/// A campaign as returned by the campaign API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    /// Only `"active"` campaigns are ever shown
    pub status: String,
    /// Frequency class; campaigns without a type are recurring
    #[serde(rename = "type", default)]
    pub campaign_type: CampaignType,
    pub targeting: CampaignTargeting,
}

impl Campaign {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// Frequency class of a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CampaignType {
    /// Shown at most once per visitor
    OneTime,
    /// May be shown on every qualifying page view
    #[default]
    #[serde(other)]
    Recurring,
}

/// Targeting rules of a campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignTargeting {
    pub visitor_type: VisitorType,
    pub trigger: CampaignTrigger,
    #[serde(default)]
    pub rules: CampaignRules,
}

/// Which visitors a campaign targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VisitorType {
    All,
    FirstTime,
    Returning,
    Unknown(String),
}

impl From<String> for VisitorType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "all" => VisitorType::All,
            "first-time" => VisitorType::FirstTime,
            "returning" => VisitorType::Returning,
            _ => VisitorType::Unknown(value),
        }
    }
}

impl From<VisitorType> for String {
    fn from(value: VisitorType) -> Self {
        match value {
            VisitorType::All => "all".to_string(),
            VisitorType::FirstTime => "first-time".to_string(),
            VisitorType::Returning => "returning".to_string(),
            VisitorType::Unknown(other) => other,
        }
    }
}

/// When, within a page view, a campaign becomes eligible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignTrigger {
    /// Trigger kind; only `time-on-page` exists today
    #[serde(rename = "type", default = "default_trigger_kind")]
    pub kind: String,
    pub value: f64,
    #[serde(default)]
    pub unit: TimeUnit,
}

fn default_trigger_kind() -> String {
    "time-on-page".to_string()
}

impl CampaignTrigger {
    /// Create a time-on-page trigger.
    pub fn time_on_page(value: f64, unit: TimeUnit) -> Self {
        Self {
            kind: default_trigger_kind(),
            value,
            unit,
        }
    }

    /// Required dwell time normalized to seconds.
    pub fn required_secs(&self) -> f64 {
        match self.unit {
            TimeUnit::Minutes => self.value * 60.0,
            TimeUnit::Seconds => self.value,
        }
    }
}

/// Unit of a trigger value. Anything but `minutes` is read as seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Minutes,
    #[default]
    #[serde(other)]
    Seconds,
}

/// URL conditions and how they combine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignRules {
    #[serde(default)]
    pub match_type: MatchType,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// How condition results combine. Anything but `match-all` is read as `match-any`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchType {
    #[default]
    #[serde(rename = "match-all")]
    All,
    #[serde(rename = "match-any")]
    #[serde(other)]
    Any,
}

/// A single targeting condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub field: ConditionField,
    pub operator: Operator,
    pub value: String,
}

impl Condition {
    pub fn new(field: ConditionField, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            field,
            operator,
            value: value.into(),
        }
    }
}

/// Which part of the visitor context a condition inspects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionField {
    CurrentPageUrl,
    ReferrerUrl,
    /// Fields such as `device-type` or `customer-activity`
    Other(String),
}

impl From<String> for ConditionField {
    fn from(value: String) -> Self {
        match value.as_str() {
            "current-page-url" => ConditionField::CurrentPageUrl,
            "referrer-url" => ConditionField::ReferrerUrl,
            _ => ConditionField::Other(value),
        }
    }
}

impl From<ConditionField> for String {
    fn from(value: ConditionField) -> Self {
        match value {
            ConditionField::CurrentPageUrl => "current-page-url".to_string(),
            ConditionField::ReferrerUrl => "referrer-url".to_string(),
            ConditionField::Other(other) => other,
        }
    }
}

/// String comparison applied by a condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    Contains,
    Equals,
    StartsWith,
    EndsWith,
    Is,
    Unknown(String),
}

impl From<String> for Operator {
    fn from(value: String) -> Self {
        match value.as_str() {
            "contains" => Operator::Contains,
            "equals" => Operator::Equals,
            "starts-with" => Operator::StartsWith,
            "ends-with" => Operator::EndsWith,
            "is" => Operator::Is,
            _ => Operator::Unknown(value),
        }
    }
}

impl From<Operator> for String {
    fn from(value: Operator) -> Self {
        match value {
            Operator::Contains => "contains".to_string(),
            Operator::Equals => "equals".to_string(),
            Operator::StartsWith => "starts-with".to_string(),
            Operator::EndsWith => "ends-with".to_string(),
            Operator::Is => "is".to_string(),
            Operator::Unknown(other) => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_campaign_from_api_json() {
        let json = r#"{
            "id": 7,
            "status": "active",
            "type": "one-time",
            "targeting": {
                "visitorType": "first-time",
                "trigger": { "type": "time-on-page", "value": 2, "unit": "minutes" },
                "rules": {
                    "matchType": "match-any",
                    "conditions": [
                        { "field": "current-page-url", "operator": "contains", "value": "cart" },
                        { "field": "device-type", "operator": "is", "value": "mobile" }
                    ]
                }
            }
        }"#;

        let campaign: Campaign = serde_json::from_str(json).unwrap();
        assert_eq!(campaign.id, 7);
        assert!(campaign.is_active());
        assert_eq!(campaign.campaign_type, CampaignType::OneTime);
        assert_eq!(campaign.targeting.visitor_type, VisitorType::FirstTime);
        assert_eq!(campaign.targeting.trigger.required_secs(), 120.0);
        assert_eq!(campaign.targeting.rules.match_type, MatchType::Any);
        assert_eq!(
            campaign.targeting.rules.conditions[1].field,
            ConditionField::Other("device-type".to_string())
        );
    }

    #[test]
    fn test_unknown_values_fall_back() {
        let json = r#"{
            "id": 1,
            "status": "draft",
            "targeting": {
                "visitorType": "vip",
                "trigger": { "value": 30, "unit": "hours" },
                "rules": { "matchType": "match-some", "conditions": [] }
            }
        }"#;

        let campaign: Campaign = serde_json::from_str(json).unwrap();
        assert!(!campaign.is_active());
        assert_eq!(campaign.campaign_type, CampaignType::Recurring);
        assert_eq!(
            campaign.targeting.visitor_type,
            VisitorType::Unknown("vip".to_string())
        );
        assert_eq!(campaign.targeting.trigger.unit, TimeUnit::Seconds);
        assert_eq!(campaign.targeting.rules.match_type, MatchType::Any);
    }

    #[test]
    fn test_unknown_type_and_unit_use_fallback_variants() {
        let json = r#"{
            "id": 4,
            "status": "active",
            "type": "seasonal",
            "targeting": {
                "visitorType": "all",
                "trigger": { "type": "time-on-page", "value": 5, "unit": "fortnights" }
            }
        }"#;

        let campaign: Campaign = serde_json::from_str(json).unwrap();
        assert_eq!(campaign.campaign_type, CampaignType::Recurring);
        assert_eq!(campaign.targeting.trigger.unit, TimeUnit::Seconds);
        assert_eq!(campaign.targeting.trigger.required_secs(), 5.0);

        let json = serde_json::to_value(&campaign).unwrap();
        assert_eq!(json["type"], "recurring");
        assert_eq!(json["targeting"]["trigger"]["unit"], "seconds");
    }

    #[test]
    fn test_missing_rules_default_to_vacuous_match_all() {
        let json = r#"{
            "id": 2,
            "status": "active",
            "targeting": {
                "visitorType": "all",
                "trigger": { "type": "time-on-page", "value": 0, "unit": "seconds" }
            }
        }"#;

        let campaign: Campaign = serde_json::from_str(json).unwrap();
        assert_eq!(campaign.targeting.rules.match_type, MatchType::All);
        assert!(campaign.targeting.rules.conditions.is_empty());
    }

    #[test]
    fn test_operator_serializes_back_to_wire_name() {
        let condition = Condition::new(ConditionField::ReferrerUrl, Operator::StartsWith, "https");
        let json = serde_json::to_value(&condition).unwrap();
        assert_eq!(json["field"], "referrer-url");
        assert_eq!(json["operator"], "starts-with");
    }
}
