//! Who is on the other end of a realtime connection

use std::fmt;

use crate::types::VisitorIdentity;

/// Email reported for widget visitors who have not given one
pub const ANONYMOUS_EMAIL: &str = "New Customer";

/// The dashboard viewer a channel is opened for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewerIdentity {
    pub organization_id: String,
    pub chatbot_id: String,
}

impl ViewerIdentity {
    pub fn new(organization_id: impl Into<String>, chatbot_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            chatbot_id: chatbot_id.into(),
        }
    }

    /// Both identifiers are known
    pub fn is_complete(&self) -> bool {
        !self.organization_id.is_empty() && !self.chatbot_id.is_empty()
    }
}

impl fmt::Display for ViewerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "org {} / chatbot {}", self.organization_id, self.chatbot_id)
    }
}

/// Handshake query a client connects with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectQuery {
    /// A dashboard viewer watching a chatbot's traffic
    Dashboard { chatbot_id: String },
    /// A site visitor's embedded widget
    Visitor {
        chatbot_id: String,
        visitor_id: String,
        ip_address: String,
        user_email: Option<String>,
    },
}

impl ConnectQuery {
    pub fn dashboard(viewer: &ViewerIdentity) -> Self {
        ConnectQuery::Dashboard {
            chatbot_id: viewer.chatbot_id.clone(),
        }
    }

    /// The widget's handshake for a tracked visitor
    pub fn visitor(
        chatbot_id: impl Into<String>,
        identity: &VisitorIdentity,
        ip_address: impl Into<String>,
    ) -> Self {
        ConnectQuery::Visitor {
            chatbot_id: chatbot_id.into(),
            visitor_id: identity.visitor_id.clone(),
            ip_address: ip_address.into(),
            user_email: identity.email.clone(),
        }
    }

    /// Query parameters in handshake order
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            ConnectQuery::Dashboard { chatbot_id } => vec![
                ("chatbot_id", chatbot_id.clone()),
                ("dashboard", "true".to_string()),
            ],
            ConnectQuery::Visitor {
                chatbot_id,
                visitor_id,
                ip_address,
                user_email,
            } => vec![
                ("chatbot_id", chatbot_id.clone()),
                ("visitor_id", visitor_id.clone()),
                ("ip_address", ip_address.clone()),
                (
                    "user_email",
                    user_email
                        .as_deref()
                        .filter(|email| !email.is_empty())
                        .unwrap_or(ANONYMOUS_EMAIL)
                        .to_string(),
                ),
                ("is_visitor", "true".to_string()),
            ],
        }
    }
}
