//! Tracking payloads posted to the collector
//!
//! Field names follow the collector's JSON contract, which mixes
//! `snake_case` (`chatbot_id`, `utm_*`) with `camelCase` (`userAgent`,
//! `timeSpent`). Timestamps and durations are Unix milliseconds.

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;

/// Collector endpoint a payload is posted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackingEndpoint {
    PageView,
    TimeOnPage,
    Bounce,
    Scroll,
    Click,
    ComplaintUrl,
    CampaignAnalytics,
}

impl TrackingEndpoint {
    /// Path relative to the collector base URL
    pub fn path(&self) -> &'static str {
        match self {
            TrackingEndpoint::PageView => "/seo/pageview",
            TrackingEndpoint::TimeOnPage => "/seo/timeOnPage",
            TrackingEndpoint::Bounce => "/seo/bounce",
            TrackingEndpoint::Scroll => "/seo/scroll",
            TrackingEndpoint::Click => "/seo/click",
            TrackingEndpoint::ComplaintUrl => "/seo/complaint-url",
            TrackingEndpoint::CampaignAnalytics => "/analytics/campaign",
        }
    }
}

impl std::fmt::Display for TrackingEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// Current time as Unix milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Facts about the visitor's browser attached to every tracking payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub screen_width: u32,
    pub screen_height: u32,
    pub language: String,
    pub user_agent: String,
}

impl ClientInfo {
    /// `WxH`, e.g. `1280x720`
    pub fn screen_size(&self) -> String {
        format!("{}x{}", self.screen_width, self.screen_height)
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            screen_width: 1280,
            screen_height: 720,
            language: "en-US".to_string(),
            user_agent: concat!("engage/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// UTM parameters of the page's query string; absent parameters serialize as `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UtmParams {
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
}

impl UtmParams {
    /// Parse from a page URL. Unparseable URLs yield no parameters.
    pub fn from_url(page_url: &str) -> Self {
        let Ok(parsed) = url::Url::parse(page_url) else {
            return Self::default();
        };

        let mut params = Self::default();
        for (name, value) in parsed.query_pairs() {
            let slot = match name.as_ref() {
                "utm_source" => &mut params.utm_source,
                "utm_medium" => &mut params.utm_medium,
                "utm_campaign" => &mut params.utm_campaign,
                "utm_term" => &mut params.utm_term,
                "utm_content" => &mut params.utm_content,
                _ => continue,
            };
            // First occurrence wins, like URLSearchParams::get
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        params
    }
}

/// Origin (`scheme://host[:port]`) of a page URL
pub fn origin_of(page_url: &str) -> Option<String> {
    let parsed = url::Url::parse(page_url).ok()?;
    let origin = parsed.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageViewEvent {
    pub chatbot_id: String,
    pub url: String,
    pub referrer: String,
    #[serde(rename = "userAgent")]
    pub user_agent: String,
    pub timestamp: i64,
    #[serde(flatten)]
    pub utm: UtmParams,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplaintUrlEvent {
    pub chatbot_id: String,
    #[serde(rename = "baseUrl")]
    pub base_url: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeOnPageEvent {
    pub chatbot_id: String,
    pub url: String,
    /// Milliseconds since the previous report
    #[serde(rename = "timeSpent")]
    pub time_spent_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BounceEvent {
    pub chatbot_id: String,
    #[serde(rename = "timeOnPage")]
    pub time_on_page_ms: i64,
    #[serde(rename = "interactedWithChatbot")]
    pub interacted_with_chatbot: bool,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrollEvent {
    pub chatbot_id: String,
    #[serde(rename = "scrollY")]
    pub scroll_y: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClickEvent {
    pub chatbot_id: String,
    pub timestamp: i64,
}

/// Campaign analytics event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignEventKind {
    CampaignImpression,
    CampaignClick,
    CampaignClose,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignEvent {
    pub event: CampaignEventKind,
    pub campaign_id: i64,
    pub app_id: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub button_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
}

/// Any payload the collector accepts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TrackingEvent {
    PageView(PageViewEvent),
    ComplaintUrl(ComplaintUrlEvent),
    TimeOnPage(TimeOnPageEvent),
    Bounce(BounceEvent),
    Scroll(ScrollEvent),
    Click(ClickEvent),
    Campaign(CampaignEvent),
}

impl TrackingEvent {
    pub fn endpoint(&self) -> TrackingEndpoint {
        match self {
            TrackingEvent::PageView(_) => TrackingEndpoint::PageView,
            TrackingEvent::ComplaintUrl(_) => TrackingEndpoint::ComplaintUrl,
            TrackingEvent::TimeOnPage(_) => TrackingEndpoint::TimeOnPage,
            TrackingEvent::Bounce(_) => TrackingEndpoint::Bounce,
            TrackingEvent::Scroll(_) => TrackingEndpoint::Scroll,
            TrackingEvent::Click(_) => TrackingEndpoint::Click,
            TrackingEvent::Campaign(_) => TrackingEndpoint::CampaignAnalytics,
        }
    }

    /// Serialize into a JSON object ready for enrichment
    pub fn to_payload(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                Ok(map)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utm_params_from_url() {
        let utm = UtmParams::from_url(
            "https://shop.example.com/cart?utm_source=news&utm_campaign=spring%20sale&utm_source=other",
        );
        assert_eq!(utm.utm_source.as_deref(), Some("news"));
        assert_eq!(utm.utm_campaign.as_deref(), Some("spring sale"));
        assert_eq!(utm.utm_medium, None);

        assert_eq!(UtmParams::from_url("not a url"), UtmParams::default());
    }

    #[test]
    fn test_origin_of() {
        assert_eq!(
            origin_of("https://shop.example.com:8443/cart?x=1").as_deref(),
            Some("https://shop.example.com:8443")
        );
        assert_eq!(origin_of("about:blank"), None);
    }

    #[test]
    fn test_pageview_payload_shape() {
        let event = TrackingEvent::PageView(PageViewEvent {
            chatbot_id: "bot-1".to_string(),
            url: "https://x.com/?utm_medium=email".to_string(),
            referrer: "direct".to_string(),
            user_agent: "test-agent".to_string(),
            timestamp: 1_700_000_000_000,
            utm: UtmParams::from_url("https://x.com/?utm_medium=email"),
        });

        assert_eq!(event.endpoint().path(), "/seo/pageview");
        let payload = event.to_payload().unwrap();
        assert_eq!(payload["chatbot_id"], "bot-1");
        assert_eq!(payload["userAgent"], "test-agent");
        assert_eq!(payload["utm_medium"], "email");
        assert!(payload["utm_source"].is_null());
    }

    #[test]
    fn test_campaign_payload_omits_absent_click_fields() {
        let event = TrackingEvent::Campaign(CampaignEvent {
            event: CampaignEventKind::CampaignClose,
            campaign_id: 4,
            app_id: "bot-1".to_string(),
            timestamp: 1,
            button_id: None,
            url: None,
            action_type: None,
        });

        let payload = event.to_payload().unwrap();
        assert_eq!(payload["event"], "campaign_close");
        assert_eq!(payload["campaignId"], 4);
        assert_eq!(payload["appId"], "bot-1");
        assert!(!payload.contains_key("buttonId"));
    }

    #[test]
    fn test_screen_size() {
        let info = ClientInfo {
            screen_width: 1920,
            screen_height: 1080,
            ..Default::default()
        };
        assert_eq!(info.screen_size(), "1920x1080");
    }
}
