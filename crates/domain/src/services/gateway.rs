//! Notification gateway abstraction.
//!
//! The gateway is the remote service of record for notifications, invitation
//! tokens and guest RSVPs. The HTTP implementation lives in the client crate;
//! [`MockGateway`] is an in-memory stand-in for development and testing.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;

use crate::models::{EventId, GuestId, GuestRecord, RsvpStatus, TokenValidation};

/// Errors returned by gateway calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Gateway returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response from gateway: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Remote operations consumed by the inbox.
#[async_trait::async_trait]
pub trait NotificationGateway: Send + Sync {
    /// `GET /notifications/unread`, raw objects.
    async fn list_unread(&self) -> Result<Vec<Value>, GatewayError>;

    /// `GET /notifications/read`, raw objects.
    async fn list_read(&self) -> Result<Vec<Value>, GatewayError>;

    /// `PATCH /notifications/{id}/mark-as-read`.
    async fn mark_as_read(&self, notification_id: &str) -> Result<(), GatewayError>;

    /// `DELETE /notifications/{id}`.
    async fn delete_notification(&self, notification_id: &str) -> Result<(), GatewayError>;

    /// `GET /guests/invite/validate?token=...`.
    async fn validate_invite_token(&self, token: &str) -> Result<TokenValidation, GatewayError>;

    /// `GET /guests/event/{eventId}`.
    async fn list_event_guests(&self, event_id: &EventId)
        -> Result<Vec<GuestRecord>, GatewayError>;

    /// `PATCH /guests/{guestId}/rsvp`.
    async fn update_rsvp(&self, guest_id: &GuestId, status: RsvpStatus)
        -> Result<(), GatewayError>;

    /// `GET /events/{eventId}/invitation-photo/`, the `url_invitation` field.
    async fn invitation_photo(&self, event_id: &EventId) -> Result<Option<String>, GatewayError>;
}

/// Gateway endpoints, used to program [`MockGateway`] behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockEndpoint {
    ListUnread,
    ListRead,
    MarkAsRead,
    DeleteNotification,
    ValidateToken,
    ListEventGuests,
    UpdateRsvp,
    InvitationPhoto,
}

/// A call recorded by [`MockGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    ListUnread,
    ListRead,
    MarkAsRead(String),
    DeleteNotification(String),
    ValidateToken(String),
    ListEventGuests(EventId),
    UpdateRsvp(GuestId, RsvpStatus),
    InvitationPhoto(EventId),
}

impl MockCall {
    pub fn endpoint(&self) -> MockEndpoint {
        match self {
            MockCall::ListUnread => MockEndpoint::ListUnread,
            MockCall::ListRead => MockEndpoint::ListRead,
            MockCall::MarkAsRead(_) => MockEndpoint::MarkAsRead,
            MockCall::DeleteNotification(_) => MockEndpoint::DeleteNotification,
            MockCall::ValidateToken(_) => MockEndpoint::ValidateToken,
            MockCall::ListEventGuests(_) => MockEndpoint::ListEventGuests,
            MockCall::UpdateRsvp(_, _) => MockEndpoint::UpdateRsvp,
            MockCall::InvitationPhoto(_) => MockEndpoint::InvitationPhoto,
        }
    }
}

#[derive(Default)]
struct MockState {
    unread: Vec<Value>,
    read: Vec<Value>,
    tokens: HashMap<String, TokenValidation>,
    guests: HashMap<EventId, Vec<GuestRecord>>,
    photos: HashMap<EventId, String>,
    failing: HashSet<MockEndpoint>,
    gates: HashMap<MockEndpoint, watch::Sender<bool>>,
    calls: Vec<MockCall>,
}

/// In-memory gateway for development and testing.
///
/// Mutations behave like the real backend: marking as read moves the raw
/// object between lists, RSVP updates rewrite the guest list. Every call is
/// recorded, endpoints can be made to fail, and endpoints can be held so a
/// call stays in flight until released.
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    /// Create an empty mock gateway.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_unread(self, items: Vec<Value>) -> Self {
        self.state().unread = items;
        self
    }

    pub fn with_read(self, items: Vec<Value>) -> Self {
        self.state().read = items;
        self
    }

    pub fn with_token(self, token: &str, validation: TokenValidation) -> Self {
        self.state().tokens.insert(token.to_string(), validation);
        self
    }

    pub fn with_guests(self, event_id: EventId, guests: Vec<GuestRecord>) -> Self {
        self.state().guests.insert(event_id, guests);
        self
    }

    pub fn with_photo(self, event_id: EventId, url: &str) -> Self {
        self.state().photos.insert(event_id, url.to_string());
        self
    }

    /// Make every call to `endpoint` fail with a 503.
    pub fn fail(&self, endpoint: MockEndpoint) {
        self.state().failing.insert(endpoint);
    }

    /// Undo [`MockGateway::fail`].
    pub fn recover(&self, endpoint: MockEndpoint) {
        self.state().failing.remove(&endpoint);
    }

    /// Hold calls to `endpoint` in flight until [`MockGateway::release`].
    pub fn hold(&self, endpoint: MockEndpoint) {
        let (gate, _) = watch::channel(false);
        self.state().gates.insert(endpoint, gate);
    }

    /// Let held calls to `endpoint` complete.
    pub fn release(&self, endpoint: MockEndpoint) {
        if let Some(gate) = self.state().gates.remove(&endpoint) {
            gate.send_replace(true);
        }
    }

    /// Replace the recorded RSVP of a guest, as if answered on another device.
    pub fn set_rsvp(&self, event_id: &EventId, guest_id: &GuestId, status: RsvpStatus) {
        if let Some(guests) = self.state().guests.get_mut(event_id) {
            guests
                .iter_mut()
                .filter(|g| &g.guest_id == guest_id)
                .for_each(|g| g.rsvp_status = status);
        }
    }

    /// All calls recorded so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    /// Number of calls recorded for `endpoint`.
    pub fn call_count(&self, endpoint: MockEndpoint) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.endpoint() == endpoint)
            .count()
    }

    /// Records the call, waits on its gate if held, then reports whether the
    /// endpoint is programmed to fail.
    async fn enter(&self, call: MockCall) -> Result<(), GatewayError> {
        let endpoint = call.endpoint();
        let gate = {
            let mut state = self.state();
            state.calls.push(call);
            state.gates.get(&endpoint).map(watch::Sender::subscribe)
        };

        if let Some(mut gate) = gate {
            // A dropped sender means the gate was released.
            let _ = gate.wait_for(|open| *open).await;
        }

        if self.state().failing.contains(&endpoint) {
            tracing::warn!(endpoint = ?endpoint, "Mock gateway simulating failure");
            return Err(GatewayError::Status {
                status: 503,
                body: "Simulated failure".to_string(),
            });
        }
        Ok(())
    }
}

fn raw_id(raw: &Value) -> Option<String> {
    shared::json::first_id(raw, &["id", "notification_id", "notificationId", "_id"])
}

fn not_found(what: &str) -> GatewayError {
    GatewayError::Status {
        status: 404,
        body: format!("{} not found", what),
    }
}

#[async_trait::async_trait]
impl NotificationGateway for MockGateway {
    async fn list_unread(&self) -> Result<Vec<Value>, GatewayError> {
        self.enter(MockCall::ListUnread).await?;
        Ok(self.state().unread.clone())
    }

    async fn list_read(&self) -> Result<Vec<Value>, GatewayError> {
        self.enter(MockCall::ListRead).await?;
        Ok(self.state().read.clone())
    }

    async fn mark_as_read(&self, notification_id: &str) -> Result<(), GatewayError> {
        self.enter(MockCall::MarkAsRead(notification_id.to_string()))
            .await?;

        let mut state = self.state();
        if let Some(pos) = state
            .unread
            .iter()
            .position(|raw| raw_id(raw).as_deref() == Some(notification_id))
        {
            let raw = state.unread.remove(pos);
            state.read.push(raw);
        }
        Ok(())
    }

    async fn delete_notification(&self, notification_id: &str) -> Result<(), GatewayError> {
        self.enter(MockCall::DeleteNotification(notification_id.to_string()))
            .await?;

        let mut state = self.state();
        let before = state.unread.len() + state.read.len();
        state
            .unread
            .retain(|raw| raw_id(raw).as_deref() != Some(notification_id));
        state
            .read
            .retain(|raw| raw_id(raw).as_deref() != Some(notification_id));

        if state.unread.len() + state.read.len() == before {
            return Err(not_found("Notification"));
        }
        Ok(())
    }

    async fn validate_invite_token(&self, token: &str) -> Result<TokenValidation, GatewayError> {
        self.enter(MockCall::ValidateToken(token.to_string())).await?;
        self.state()
            .tokens
            .get(token)
            .cloned()
            .ok_or_else(|| not_found("Invitation token"))
    }

    async fn list_event_guests(
        &self,
        event_id: &EventId,
    ) -> Result<Vec<GuestRecord>, GatewayError> {
        self.enter(MockCall::ListEventGuests(event_id.clone())).await?;
        self.state()
            .guests
            .get(event_id)
            .cloned()
            .ok_or_else(|| not_found("Event"))
    }

    async fn update_rsvp(
        &self,
        guest_id: &GuestId,
        status: RsvpStatus,
    ) -> Result<(), GatewayError> {
        self.enter(MockCall::UpdateRsvp(guest_id.clone(), status))
            .await?;

        self.state()
            .guests
            .values_mut()
            .flatten()
            .filter(|g| &g.guest_id == guest_id)
            .for_each(|g| g.rsvp_status = status);
        Ok(())
    }

    async fn invitation_photo(&self, event_id: &EventId) -> Result<Option<String>, GatewayError> {
        self.enter(MockCall::InvitationPhoto(event_id.clone())).await?;
        Ok(self.state().photos.get(event_id).cloned())
    }
}
