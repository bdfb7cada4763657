//! Guest and event identity models.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use shared::json::{first_id, first_present, first_text};

use super::rsvp::RsvpStatus;

/// Identifier of an event on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for EventId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a guest record on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuestId(String);

impl GuestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for GuestId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for GuestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a guest identity was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    /// A guest id was present in the notification payload.
    Direct,
    /// An invitation token was exchanged with the gateway.
    TokenValidated,
    /// The profile email matched an entry of the event's guest list.
    EmailMatched,
}

impl fmt::Display for IdentitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentitySource::Direct => write!(f, "direct"),
            IdentitySource::TokenValidated => write!(f, "token_validated"),
            IdentitySource::EmailMatched => write!(f, "email_matched"),
        }
    }
}

/// A guest identity resolved for an invitation notification.
///
/// `event_id` is the event context learned while resolving, when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestIdentity {
    pub guest_id: GuestId,
    pub source: IdentitySource,
    pub event_id: Option<EventId>,
}

impl GuestIdentity {
    pub fn new(guest_id: GuestId, source: IdentitySource) -> Self {
        Self {
            guest_id,
            source,
            event_id: None,
        }
    }

    pub fn with_event(mut self, event_id: Option<EventId>) -> Self {
        self.event_id = event_id;
        self
    }
}

/// Entry of an event's guest list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestRecord {
    pub guest_id: GuestId,
    pub email: Option<String>,
    pub rsvp_status: RsvpStatus,
}

impl GuestRecord {
    /// Parses a guest list entry. Entries without an id are rejected;
    /// an unknown or missing `rsvp_status` reads as unanswered.
    pub fn from_value(value: &Value) -> Option<Self> {
        let guest_id = first_id(value, &["guest_id", "guestId", "id"]).map(GuestId::new)?;
        let email = first_text(value, &["email", "guest_email", "user.email"]);
        let rsvp_status = first_present(value, &["rsvp_status", "rsvpStatus", "rsvp"])
            .and_then(RsvpStatus::from_value)
            .unwrap_or_default();

        Some(Self {
            guest_id,
            email,
            rsvp_status,
        })
    }
}

/// Result of exchanging an invitation token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenValidation {
    pub event_id: Option<EventId>,
    pub guest_id: GuestId,
}

impl TokenValidation {
    pub fn from_value(value: &Value) -> Option<Self> {
        let guest_id = first_id(value, &["guest_id", "guestId", "data.guest_id"])?;
        let event_id = first_id(value, &["event_id", "eventId", "data.event_id"]);

        Some(Self {
            event_id: event_id.map(EventId::new),
            guest_id: GuestId::new(guest_id),
        })
    }
}
