//! Guest identity resolution for invitation notifications.
//!
//! Strategies run in a fixed order and the first success wins:
//!
//! 1. [`IdentitySource::Direct`]: a guest id already present in the payload.
//! 2. [`IdentitySource::TokenValidated`]: an invitation token exchanged with the gateway.
//! 3. [`IdentitySource::EmailMatched`]: the profile email found in the event's guest list.
//!
//! A gateway failure inside a strategy only fails that strategy.

use std::sync::Arc;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use shared::json::{collect_strings, first_id, first_text, lookup, value_as_id};
use shared::validation::emails_match;

use super::gateway::NotificationGateway;
use crate::models::notification::EVENT_ID_FIELDS;
use crate::models::{EventId, GuestId, GuestIdentity, IdentitySource, Notification};

/// Field names that carry a guest id.
const GUEST_ID_FIELDS: &[&str] = &["guest_id", "guestId", "invited_guest_id", "guest"];

/// Fields that may hold a guest object or display name rather than an id.
const GUEST_OBJECT_FIELDS: &[&str] = &["guest"];

/// Objects the backend nests payload fields under.
const PAYLOAD_CONTAINERS: &[&str] = &["data", "payload", "meta", "invitation"];

const TOKEN_FIELDS: &[&str] = &[
    "token",
    "invite_token",
    "inviteToken",
    "invitation_token",
    "invitationToken",
    "data.token",
    "data.invite_token",
    "data.invitation_token",
    "payload.token",
    "invitation.token",
];

lazy_static::lazy_static! {
    static ref TOKEN_PARAM_REGEX: Regex =
        Regex::new(r#"[?&]token=([^&#\s"'<>]+)"#).unwrap();
    static ref EVENT_LINK_REGEX: Regex =
        Regex::new(r"(?:[?&]event_?[iI]d=|/events?/)(\d+)").unwrap();
}

/// Scans the payload, then known nested containers, for a guest id.
pub fn direct_guest_id(raw: &Value) -> Option<GuestId> {
    std::iter::once(Some(raw))
        .chain(PAYLOAD_CONTAINERS.iter().map(|c| lookup(raw, c)))
        .flatten()
        .find_map(|scope| {
            GUEST_ID_FIELDS
                .iter()
                .filter_map(|field| scope.get(*field).map(|value| (*field, value)))
                .find_map(|(field, value)| match value {
                    Value::Object(_) => first_id(value, &["id", "guest_id"]),
                    // A string here is a name, not an id.
                    Value::String(_) if GUEST_OBJECT_FIELDS.contains(&field) => None,
                    other => value_as_id(other),
                })
        })
        .map(GuestId::new)
}

/// Invitation token from an explicit payload field.
pub fn explicit_token(raw: &Value) -> Option<String> {
    first_text(raw, TOKEN_FIELDS)
}

/// Invitation token pulled out of a `token=` query parameter in the message
/// or any link embedded in the payload.
///
/// Best effort only: the backend does not promise links carry a token.
pub fn token_from_text(notification: &Notification) -> Option<String> {
    let mut texts = vec![notification.message.as_str()];
    collect_strings(&notification.raw, &mut texts);
    texts.into_iter().find_map(|text| {
        TOKEN_PARAM_REGEX
            .captures(text)
            .map(|caps| caps[1].to_string())
    })
}

/// Event id for a notification: the normalized field, then the raw payload,
/// then (best effort) an event link in the text.
pub fn derive_event_id(notification: &Notification) -> Option<EventId> {
    if let Some(event_id) = &notification.event_id {
        return Some(event_id.clone());
    }
    if let Some(id) = first_id(&notification.raw, EVENT_ID_FIELDS) {
        return Some(EventId::new(id));
    }

    let mut texts = vec![notification.message.as_str()];
    collect_strings(&notification.raw, &mut texts);
    texts.into_iter().find_map(|text| {
        EVENT_LINK_REGEX
            .captures(text)
            .map(|caps| EventId::new(&caps[1]))
    })
}

/// Resolves invitation notifications to guest identities.
pub struct GuestIdentityResolver {
    gateway: Arc<dyn NotificationGateway>,
}

impl GuestIdentityResolver {
    pub fn new(gateway: Arc<dyn NotificationGateway>) -> Self {
        Self { gateway }
    }

    /// Run the strategy chain. Returns `None` when every strategy fails.
    pub async fn resolve(
        &self,
        notification: &Notification,
        profile_email: Option<&str>,
    ) -> Option<GuestIdentity> {
        if !notification.is_invite() {
            debug!(
                notification_id = %notification.id,
                kind = %notification.kind(),
                "Not an invitation"
            );
            return None;
        }

        let identity = match self.resolve_direct(notification) {
            Some(identity) => Some(identity),
            None => match self.resolve_by_token(notification).await {
                Some(identity) => Some(identity),
                None => self.resolve_by_email(notification, profile_email).await,
            },
        };

        match &identity {
            Some(identity) => info!(
                notification_id = %notification.id,
                guest_id = %identity.guest_id,
                source = %identity.source,
                "Guest identity resolved"
            ),
            None => warn!(
                notification_id = %notification.id,
                "Guest identity could not be resolved"
            ),
        }
        identity
    }

    fn resolve_direct(&self, notification: &Notification) -> Option<GuestIdentity> {
        direct_guest_id(&notification.raw).map(|guest_id| {
            GuestIdentity::new(guest_id, IdentitySource::Direct)
                .with_event(derive_event_id(notification))
        })
    }

    async fn resolve_by_token(&self, notification: &Notification) -> Option<GuestIdentity> {
        let token = explicit_token(&notification.raw).or_else(|| token_from_text(notification))?;

        match self.gateway.validate_invite_token(&token).await {
            Ok(validation) => {
                let event_id = validation
                    .event_id
                    .or_else(|| derive_event_id(notification));
                Some(
                    GuestIdentity::new(validation.guest_id, IdentitySource::TokenValidated)
                        .with_event(event_id),
                )
            }
            Err(e) => {
                warn!(notification_id = %notification.id, error = %e, "Token validation failed");
                None
            }
        }
    }

    async fn resolve_by_email(
        &self,
        notification: &Notification,
        profile_email: Option<&str>,
    ) -> Option<GuestIdentity> {
        let email = profile_email.filter(|e| !e.trim().is_empty())?;
        let event_id = derive_event_id(notification)?;

        let guests = match self.gateway.list_event_guests(&event_id).await {
            Ok(guests) => guests,
            Err(e) => {
                warn!(event_id = %event_id, error = %e, "Guest list fetch failed");
                return None;
            }
        };

        guests
            .into_iter()
            .find(|guest| {
                guest
                    .email
                    .as_deref()
                    .is_some_and(|guest_email| emails_match(guest_email, email))
            })
            .map(|guest| {
                GuestIdentity::new(guest.guest_id, IdentitySource::EmailMatched)
                    .with_event(Some(event_id))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GuestRecord, ReadState, RsvpStatus, TokenValidation};
    use crate::services::gateway::{MockEndpoint, MockGateway};
    use serde_json::json;

    fn invite(raw: Value) -> Notification {
        let mut raw = raw;
        raw["type"] = json!("INVITE");
        Notification::from_raw(raw, ReadState::Unread).unwrap()
    }

    fn resolver(gateway: MockGateway) -> (Arc<MockGateway>, GuestIdentityResolver) {
        let gateway = Arc::new(gateway);
        (gateway.clone(), GuestIdentityResolver::new(gateway))
    }

    fn guest(id: i64, email: &str) -> GuestRecord {
        GuestRecord {
            guest_id: GuestId::from(id),
            email: Some(email.to_string()),
            rsvp_status: RsvpStatus::Unanswered,
        }
    }

    #[test]
    fn test_direct_guest_id_field_variants() {
        assert_eq!(direct_guest_id(&json!({"guest_id": 7})), Some(GuestId::from(7)));
        assert_eq!(direct_guest_id(&json!({"guestId": "8"})), Some(GuestId::from(8)));
        assert_eq!(
            direct_guest_id(&json!({"guest": {"id": 3}})),
            Some(GuestId::from(3))
        );
        assert_eq!(
            direct_guest_id(&json!({"data": {"guest_id": 4}})),
            Some(GuestId::from(4))
        );
        assert_eq!(direct_guest_id(&json!({"guest": 12})), Some(GuestId::from(12)));
        assert_eq!(direct_guest_id(&json!({"guest_id": ""})), None);
        assert_eq!(direct_guest_id(&json!({"id": 1})), None);
    }

    #[test]
    fn test_token_from_message_link() {
        let n = invite(json!({
            "id": "n2",
            "message": "Open https://app.test/rsvp?token=abc123&x=1",
        }));
        assert_eq!(explicit_token(&n.raw), None);
        assert_eq!(token_from_text(&n), Some("abc123".to_string()));
    }

    #[test]
    fn test_token_from_embedded_link() {
        let n = invite(json!({
            "id": "n",
            "data": {"link": "https://app.test/i?foo=1&token=zz9"},
        }));
        assert_eq!(token_from_text(&n), Some("zz9".to_string()));
    }

    #[test]
    fn test_derive_event_id_order() {
        let n = invite(json!({"id": "n", "eventId": 5, "message": "/events/9"}));
        assert_eq!(derive_event_id(&n), Some(EventId::from(5)));

        let n = invite(json!({"id": "n", "message": "See https://app.test/events/9/details"}));
        assert_eq!(derive_event_id(&n), Some(EventId::from(9)));

        let n = invite(json!({"id": "n", "message": "nothing here"}));
        assert_eq!(derive_event_id(&n), None);
    }

    #[tokio::test]
    async fn test_direct_short_circuits_token_validation() {
        let (gateway, resolver) = resolver(MockGateway::new().with_token(
            "abc",
            TokenValidation {
                event_id: None,
                guest_id: GuestId::from(99),
            },
        ));
        let n = invite(json!({"id": "n1", "guest_id": 7, "token": "abc"}));

        let identity = resolver.resolve(&n, Some("ana@example.com")).await.unwrap();
        assert_eq!(identity.guest_id, GuestId::from(7));
        assert_eq!(identity.source, IdentitySource::Direct);
        assert!(gateway.calls().is_empty());
    }

    #[test]
    fn test_guest_name_is_not_an_id() {
        assert_eq!(direct_guest_id(&json!({"guest": "Ana Lopez"})), None);
        assert_eq!(direct_guest_id(&json!({"guest": "42"})), None);
        assert_eq!(
            direct_guest_id(&json!({"guest": "Ana Lopez", "guest_id": 6})),
            Some(GuestId::from(6))
        );
    }

    #[tokio::test]
    async fn test_guest_name_falls_through_to_token() {
        let (gateway, resolver) = resolver(MockGateway::new().with_token(
            "abc",
            TokenValidation {
                event_id: Some(EventId::from(5)),
                guest_id: GuestId::from(9),
            },
        ));
        let n = invite(json!({"id": "n6", "guest": "Ana Lopez", "token": "abc"}));

        let identity = resolver.resolve(&n, None).await.unwrap();
        assert_eq!(identity.guest_id, GuestId::from(9));
        assert_eq!(identity.source, IdentitySource::TokenValidated);
        assert_eq!(gateway.call_count(MockEndpoint::ValidateToken), 1);
    }

    #[tokio::test]
    async fn test_token_strategy_from_message() {
        let (gateway, resolver) = resolver(MockGateway::new().with_token(
            "abc123",
            TokenValidation {
                event_id: Some(EventId::from(5)),
                guest_id: GuestId::from(9),
            },
        ));
        let n = invite(json!({"id": "n2", "message": "Tap https://x.test/?token=abc123"}));

        let identity = resolver.resolve(&n, None).await.unwrap();
        assert_eq!(identity.guest_id, GuestId::from(9));
        assert_eq!(identity.source, IdentitySource::TokenValidated);
        assert_eq!(identity.event_id, Some(EventId::from(5)));
        assert_eq!(gateway.call_count(MockEndpoint::ValidateToken), 1);
        assert_eq!(gateway.call_count(MockEndpoint::ListEventGuests), 0);
    }

    #[tokio::test]
    async fn test_token_failure_falls_through_to_email() {
        let (gateway, resolver) = resolver(MockGateway::new().with_guests(
            EventId::from(5),
            vec![guest(3, "bo@example.com"), guest(4, " Ana@Example.com ")],
        ));
        gateway.fail(MockEndpoint::ValidateToken);
        let n = invite(json!({"id": "n3", "event_id": 5, "token": "stale"}));

        let identity = resolver.resolve(&n, Some("ana@example.com")).await.unwrap();
        assert_eq!(identity.guest_id, GuestId::from(4));
        assert_eq!(identity.source, IdentitySource::EmailMatched);
        assert_eq!(identity.event_id, Some(EventId::from(5)));
        assert_eq!(gateway.call_count(MockEndpoint::ValidateToken), 1);
    }

    #[tokio::test]
    async fn test_all_strategies_exhausted() {
        let (gateway, resolver) = resolver(MockGateway::new());
        gateway.fail(MockEndpoint::ListEventGuests);
        let n = invite(json!({"id": "n4", "event_id": 5}));

        assert!(resolver.resolve(&n, Some("ana@example.com")).await.is_none());
        assert_eq!(gateway.call_count(MockEndpoint::ListEventGuests), 1);
    }

    #[tokio::test]
    async fn test_email_strategy_needs_profile_email() {
        let (gateway, resolver) = resolver(
            MockGateway::new().with_guests(EventId::from(5), vec![guest(3, "ana@example.com")]),
        );
        let n = invite(json!({"id": "n5", "event_id": 5}));

        assert!(resolver.resolve(&n, None).await.is_none());
        assert!(resolver.resolve(&n, Some("  ")).await.is_none());
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_non_invite_is_not_resolved() {
        let (gateway, resolver) = resolver(MockGateway::new());
        let raw = json!({"id": "g", "type": "ALBUM", "guest_id": 1});
        let n = Notification::from_raw(raw, ReadState::Read).unwrap();

        assert!(resolver.resolve(&n, None).await.is_none());
        assert!(gateway.calls().is_empty());
    }
}
