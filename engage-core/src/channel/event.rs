//! Typed realtime events
//!
//! The server emits events as `(name, payload)` pairs. [`RealtimeEvent::decode`]
//! turns a pair into a typed event; names this client does not handle decode
//! to `None`. Identifiers may arrive as JSON strings or numbers and are
//! normalized to strings, so scoping compares `"42"` and `42` as equal.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{Error, Result};

use super::identity::ViewerIdentity;

pub const VISITOR_UPDATE: &str = "visitor_update";
pub const TICKET_CREATED: &str = "ticket:created";
pub const TICKET_UPDATED: &str = "ticket:updated";
pub const NEW_CONVERSATION: &str = "newConversation";
pub const MESSAGE: &str = "message";
pub const WHATSAPP_MESSAGE_RECEIVED: &str = "whatsapp:message:received";
pub const ONBOARDING_UPDATED: &str = "onboarding:updated";
pub const OPEN_CHAT: &str = "open_chat";

/// Event names with a fixed name, bound for every identity
pub const STATIC_EVENT_NAMES: &[&str] = &[
    VISITOR_UPDATE,
    TICKET_CREATED,
    TICKET_UPDATED,
    NEW_CONVERSATION,
    MESSAGE,
    WHATSAPP_MESSAGE_RECEIVED,
    ONBOARDING_UPDATED,
];

// ============================================
// Identifiers
// ============================================

/// Accept a string, a number or null as an optional id.
fn deserialize_opt_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn id_matches(id: &Option<String>, expected: &str) -> bool {
    id.as_deref() == Some(expected)
}

// ============================================
// SEO job topics
// ============================================

/// Kind of long-running SEO job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeoDomain {
    Performance,
    Compliance,
}

impl SeoDomain {
    pub const ALL: [SeoDomain; 2] = [SeoDomain::Performance, SeoDomain::Compliance];

    pub fn as_str(&self) -> &'static str {
        match self {
            SeoDomain::Performance => "performance",
            SeoDomain::Compliance => "compliance",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "performance" => Some(SeoDomain::Performance),
            "compliance" => Some(SeoDomain::Compliance),
            _ => None,
        }
    }
}

/// Lifecycle phase of an SEO job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeoPhase {
    Started,
    Completed,
    Error,
}

impl SeoPhase {
    pub const ALL: [SeoPhase; 3] = [SeoPhase::Started, SeoPhase::Completed, SeoPhase::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            SeoPhase::Started => "started",
            SeoPhase::Completed => "completed",
            SeoPhase::Error => "error",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "started" => Some(SeoPhase::Started),
            "completed" => Some(SeoPhase::Completed),
            "error" => Some(SeoPhase::Error),
            _ => None,
        }
    }
}

/// An organization-scoped SEO event name, `seo:<domain>:<phase>:<orgId>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeoTopic {
    pub domain: SeoDomain,
    pub phase: SeoPhase,
    pub organization_id: String,
}

impl SeoTopic {
    pub fn new(domain: SeoDomain, phase: SeoPhase, organization_id: impl Into<String>) -> Self {
        Self {
            domain,
            phase,
            organization_id: organization_id.into(),
        }
    }

    /// Every topic of one organization
    pub fn all_for(organization_id: &str) -> Vec<SeoTopic> {
        SeoDomain::ALL
            .iter()
            .flat_map(|domain| {
                SeoPhase::ALL
                    .iter()
                    .map(move |phase| SeoTopic::new(*domain, *phase, organization_id))
            })
            .collect()
    }

    pub fn event_name(&self) -> String {
        format!(
            "seo:{}:{}:{}",
            self.domain.as_str(),
            self.phase.as_str(),
            self.organization_id
        )
    }

    /// Parse an event name; `None` if it is not an SEO topic
    pub fn parse(name: &str) -> Option<Self> {
        let mut parts = name.splitn(4, ':');
        if parts.next()? != "seo" {
            return None;
        }
        let domain = SeoDomain::parse(parts.next()?)?;
        let phase = SeoPhase::parse(parts.next()?)?;
        let organization_id = parts.next().filter(|id| !id.is_empty())?;
        Some(SeoTopic::new(domain, phase, organization_id))
    }
}

impl fmt::Display for SeoTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.event_name())
    }
}

// ============================================
// Payloads
// ============================================

/// Presence transition of a widget visitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceChange {
    Connected,
    Disconnected,
    Other(String),
}

impl<'de> Deserialize<'de> for PresenceChange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "connected" => PresenceChange::Connected,
            "disconnected" => PresenceChange::Disconnected,
            _ => PresenceChange::Other(s),
        })
    }
}

/// The live-visitor row the server broadcasts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VisitorRecord {
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub visitor_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub chatbot_id: Option<String>,
    #[serde(default)]
    pub is_online: Option<bool>,
    /// ISO-8601 string or Unix milliseconds
    #[serde(default, rename = "createdAt")]
    pub created_at: Option<Value>,
}

impl VisitorRecord {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        match self.created_at.as_ref()? {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Value::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VisitorUpdate {
    #[serde(rename = "type")]
    pub change: PresenceChange,
    pub visitor: VisitorRecord,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TicketInfo {
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConversationInfo {
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub chatbot_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageInfo {
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub chatbot_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl MessageInfo {
    /// Sent by a site visitor rather than an agent or the bot
    pub fn is_from_user(&self) -> bool {
        self.role.as_deref() == Some("user")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WhatsAppMessage {
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub from_number: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SeoPayload {
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub started_at: Option<Value>,
    #[serde(default)]
    pub estimated_time: Option<Value>,
    /// Server-provided failure reason
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OnboardingUpdate {
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub organization_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OpenChat {
    #[serde(default, rename = "conversationId", deserialize_with = "deserialize_opt_id")]
    pub conversation_id: Option<String>,
}

// ============================================
// Event
// ============================================

/// A server-originated event the client handles.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    VisitorUpdate(VisitorUpdate),
    TicketCreated(TicketInfo),
    TicketUpdated(TicketInfo),
    NewConversation(ConversationInfo),
    Message(MessageInfo),
    WhatsAppMessage(WhatsAppMessage),
    Seo(SeoTopic, SeoPayload),
    OnboardingUpdated(OnboardingUpdate),
    /// Widget side: the dashboard asked the visitor's widget to open a chat
    OpenChat(OpenChat),
}

#[derive(Deserialize)]
struct TicketCreatedEnvelope {
    ticket: TicketInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TicketUpdatedEnvelope {
    updated_ticket: TicketInfo,
}

#[derive(Deserialize)]
struct WhatsAppEnvelope {
    message: WhatsAppMessage,
}

impl RealtimeEvent {
    /// Decode a named payload.
    ///
    /// Returns `Ok(None)` for event names this client does not handle and
    /// [`Error::MalformedEvent`] for a known name with an unusable payload.
    pub fn decode(name: &str, payload: Value) -> Result<Option<Self>> {
        let malformed = |e: serde_json::Error| Error::MalformedEvent {
            event: name.to_string(),
            message: e.to_string(),
        };

        let event = match name {
            VISITOR_UPDATE => {
                RealtimeEvent::VisitorUpdate(serde_json::from_value(payload).map_err(malformed)?)
            }
            TICKET_CREATED => {
                let envelope: TicketCreatedEnvelope =
                    serde_json::from_value(payload).map_err(malformed)?;
                RealtimeEvent::TicketCreated(envelope.ticket)
            }
            TICKET_UPDATED => {
                let envelope: TicketUpdatedEnvelope =
                    serde_json::from_value(payload).map_err(malformed)?;
                RealtimeEvent::TicketUpdated(envelope.updated_ticket)
            }
            NEW_CONVERSATION => RealtimeEvent::NewConversation(
                serde_json::from_value(unwrap_key(payload, "conversation")).map_err(malformed)?,
            ),
            MESSAGE => RealtimeEvent::Message(
                serde_json::from_value(unwrap_key(payload, "newMessage")).map_err(malformed)?,
            ),
            WHATSAPP_MESSAGE_RECEIVED => {
                let envelope: WhatsAppEnvelope =
                    serde_json::from_value(payload).map_err(malformed)?;
                RealtimeEvent::WhatsAppMessage(envelope.message)
            }
            ONBOARDING_UPDATED => {
                let update = serde_json::from_value(payload).map_err(malformed)?;
                RealtimeEvent::OnboardingUpdated(update)
            }
            OPEN_CHAT => {
                RealtimeEvent::OpenChat(serde_json::from_value(payload).map_err(malformed)?)
            }
            _ => match SeoTopic::parse(name) {
                Some(topic) => {
                    RealtimeEvent::Seo(topic, serde_json::from_value(payload).map_err(malformed)?)
                }
                None => return Ok(None),
            },
        };

        Ok(Some(event))
    }

    /// Wire name of this event
    pub fn name(&self) -> String {
        match self {
            RealtimeEvent::VisitorUpdate(_) => VISITOR_UPDATE.to_string(),
            RealtimeEvent::TicketCreated(_) => TICKET_CREATED.to_string(),
            RealtimeEvent::TicketUpdated(_) => TICKET_UPDATED.to_string(),
            RealtimeEvent::NewConversation(_) => NEW_CONVERSATION.to_string(),
            RealtimeEvent::Message(_) => MESSAGE.to_string(),
            RealtimeEvent::WhatsAppMessage(_) => WHATSAPP_MESSAGE_RECEIVED.to_string(),
            RealtimeEvent::Seo(topic, _) => topic.event_name(),
            RealtimeEvent::OnboardingUpdated(_) => ONBOARDING_UPDATED.to_string(),
            RealtimeEvent::OpenChat(_) => OPEN_CHAT.to_string(),
        }
    }

    /// Whether this event belongs to `viewer`.
    ///
    /// Events missing the identifier they are scoped on are out of scope.
    /// Presence rows are already routed per chatbot by the server, so a
    /// visitor row without `chatbot_id` is accepted.
    pub fn in_scope(&self, viewer: &ViewerIdentity) -> bool {
        match self {
            RealtimeEvent::VisitorUpdate(update) => update
                .visitor
                .chatbot_id
                .as_deref()
                .map_or(true, |id| id == viewer.chatbot_id),
            RealtimeEvent::TicketCreated(ticket) | RealtimeEvent::TicketUpdated(ticket) => {
                id_matches(&ticket.organization_id, &viewer.organization_id)
            }
            RealtimeEvent::NewConversation(conversation) => {
                id_matches(&conversation.chatbot_id, &viewer.chatbot_id)
            }
            RealtimeEvent::Message(message) => id_matches(&message.chatbot_id, &viewer.chatbot_id),
            RealtimeEvent::WhatsAppMessage(message) => {
                id_matches(&message.organization_id, &viewer.organization_id)
            }
            RealtimeEvent::Seo(topic, payload) => {
                topic.organization_id == viewer.organization_id
                    && id_matches(&payload.organization_id, &viewer.organization_id)
            }
            RealtimeEvent::OnboardingUpdated(update) => {
                id_matches(&update.organization_id, &viewer.organization_id)
            }
            RealtimeEvent::OpenChat(_) => true,
        }
    }
}

/// Accept both `{key: {...}}` and the bare inner object.
fn unwrap_key(payload: Value, key: &str) -> Value {
    match payload {
        Value::Object(mut map) if map.get(key).is_some_and(Value::is_object) => {
            map.remove(key).unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn viewer() -> ViewerIdentity {
        ViewerIdentity::new("42", "bot-1")
    }

    #[test]
    fn test_seo_topic_roundtrip() {
        let topic = SeoTopic::new(SeoDomain::Compliance, SeoPhase::Error, "42");
        assert_eq!(topic.event_name(), "seo:compliance:error:42");
        assert_eq!(SeoTopic::parse("seo:compliance:error:42"), Some(topic));

        assert_eq!(SeoTopic::parse("seo:speed:started:42"), None);
        assert_eq!(SeoTopic::parse("seo:performance:started:"), None);
        assert_eq!(SeoTopic::parse("ticket:created"), None);
        assert_eq!(SeoTopic::all_for("42").len(), 6);
    }

    #[test]
    fn test_decode_ticket_created() {
        let event = RealtimeEvent::decode(
            TICKET_CREATED,
            json!({ "ticket": { "organization_id": 42, "subject": "Refund" } }),
        )
        .unwrap()
        .unwrap();

        match &event {
            RealtimeEvent::TicketCreated(ticket) => {
                assert_eq!(ticket.organization_id.as_deref(), Some("42"));
                assert_eq!(ticket.subject, "Refund");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(event.in_scope(&viewer()));
        assert!(!event.in_scope(&ViewerIdentity::new("7", "bot-1")));
    }

    #[test]
    fn test_decode_ticket_updated_envelope() {
        let event = RealtimeEvent::decode(
            TICKET_UPDATED,
            json!({ "updatedTicket": { "organization_id": "42", "subject": "Refund" } }),
        )
        .unwrap();
        assert!(matches!(event, Some(RealtimeEvent::TicketUpdated(_))));
    }

    #[test]
    fn test_conversation_bare_and_wrapped() {
        for payload in [
            json!({ "chatbot_id": "bot-1", "id": 9 }),
            json!({ "conversation": { "chatbot_id": "bot-1" } }),
        ] {
            let event = RealtimeEvent::decode(NEW_CONVERSATION, payload)
                .unwrap()
                .unwrap();
            assert!(event.in_scope(&viewer()));
        }
    }

    #[test]
    fn test_message_role() {
        let event = RealtimeEvent::decode(MESSAGE, json!({ "chatbot_id": "bot-1", "role": "bot" }))
            .unwrap()
            .unwrap();
        match event {
            RealtimeEvent::Message(message) => assert!(!message.is_from_user()),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_visitor_update_created_at() {
        let event = RealtimeEvent::decode(
            VISITOR_UPDATE,
            json!({
                "type": "connected",
                "visitor": {
                    "visitor_id": "v-1",
                    "chatbot_id": "bot-1",
                    "is_online": true,
                    "createdAt": "2026-01-01T00:00:00.000Z"
                }
            }),
        )
        .unwrap()
        .unwrap();

        let RealtimeEvent::VisitorUpdate(update) = &event else {
            panic!("unexpected event: {:?}", event);
        };
        assert_eq!(update.change, PresenceChange::Connected);
        assert_eq!(
            update.visitor.created_at(),
            Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
        );
        assert!(event.in_scope(&viewer()));
        assert!(!event.in_scope(&ViewerIdentity::new("42", "bot-2")));
    }

    #[test]
    fn test_seo_scope_checks_topic_and_payload() {
        let event = RealtimeEvent::decode(
            "seo:performance:started:42",
            json!({ "organization_id": "42", "estimated_time": 120 }),
        )
        .unwrap()
        .unwrap();
        assert!(event.in_scope(&viewer()));

        let mismatched = RealtimeEvent::decode(
            "seo:performance:started:42",
            json!({ "organization_id": "7" }),
        )
        .unwrap()
        .unwrap();
        assert!(!mismatched.in_scope(&viewer()));
    }

    #[test]
    fn test_missing_scope_id_is_out_of_scope() {
        let event = RealtimeEvent::decode(WHATSAPP_MESSAGE_RECEIVED, json!({ "message": {} }))
            .unwrap()
            .unwrap();
        assert!(!event.in_scope(&viewer()));
    }

    #[test]
    fn test_unknown_and_malformed() {
        assert!(RealtimeEvent::decode("voice-call-started", json!({}))
            .unwrap()
            .is_none());

        let err = RealtimeEvent::decode(TICKET_CREATED, json!("oops")).unwrap_err();
        assert!(matches!(err, Error::MalformedEvent { ref event, .. } if event == TICKET_CREATED));
    }
}
