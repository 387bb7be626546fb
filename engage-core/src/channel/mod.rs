//! Realtime event channel
//!
//! The dashboard keeps one Socket.IO connection per viewer identity. This
//! module covers the whole path from a text frame to a scoped, typed event:
//!
//! - [`codec`]: Engine.IO / Socket.IO framing
//! - [`transport`]: [`Connector`] and [`Connection`] over websockets or in memory
//! - [`event`]: [`RealtimeEvent`] decoding and tenant scoping
//! - [`session`]: [`ChannelSession`], identity changes and frame handling
//! - [`visitor`]: [`VisitorChannel`], the widget's own connection that
//!   receives `open_chat` requests

pub mod codec;
pub mod event;
pub mod identity;
pub mod session;
pub mod transport;
pub mod visitor;

pub use codec::{decode, encode, socket_url, OpenInfo, Packet};
pub use event::{
    ConversationInfo, MessageInfo, OnboardingUpdate, OpenChat, PresenceChange, RealtimeEvent,
    SeoDomain, SeoPayload, SeoPhase, SeoTopic, TicketInfo, VisitorRecord, VisitorUpdate,
    WhatsAppMessage, MESSAGE, NEW_CONVERSATION, ONBOARDING_UPDATED, OPEN_CHAT,
    STATIC_EVENT_NAMES, TICKET_CREATED, TICKET_UPDATED, VISITOR_UPDATE,
    WHATSAPP_MESSAGE_RECEIVED,
};
pub use identity::{ConnectQuery, ViewerIdentity, ANONYMOUS_EMAIL};
pub use session::{ChannelSession, ChannelStats, EventSink, FrameOutcome, Subscriptions};
pub use transport::{Connection, Connector, MemoryConnector, WsConnector};
pub use visitor::{visitor_query, VisitorChannel};
