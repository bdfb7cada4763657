//! Notification domain model and payload normalization.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use shared::json::{first_id, first_present, first_text};
use shared::time::parse_timestamp;

use super::guest::EventId;

const ID_FIELDS: &[&str] = &["id", "notification_id", "notificationId", "_id"];

const TYPE_FIELDS: &[&str] = &[
    "type",
    "notification_type",
    "notificationType",
    "kind",
    "category",
    "data.type",
    "data.notification_type",
];

const TITLE_FIELDS: &[&str] = &["title", "subject", "heading", "data.title"];

const MESSAGE_FIELDS: &[&str] = &[
    "message",
    "body",
    "content",
    "text",
    "data.message",
    "data.body",
];

const CREATED_AT_FIELDS: &[&str] = &[
    "created_at",
    "createdAt",
    "timestamp",
    "sent_at",
    "date",
    "data.created_at",
];

/// Field names the backend has used for the related event.
pub(crate) const EVENT_ID_FIELDS: &[&str] = &[
    "event_id",
    "eventId",
    "event.id",
    "data.event_id",
    "data.eventId",
    "data.event.id",
    "payload.event_id",
    "payload.eventId",
    "meta.event_id",
];

/// Closed set of notification kinds, decided once at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Invite,
    EventUpdate,
    StageChange,
    AlbumUpdate,
    Generic,
}

impl NotificationKind {
    /// Classifies a free-text backend type string.
    ///
    /// Matching is case-insensitive and checked in priority order, so a type
    /// such as `EVENT_INVITE` is an invite rather than an event update. An
    /// `RSVP` type is an invite only when it asks for an answer (`RSVP`,
    /// `RSVP_REQUEST`); host-side types like `RSVP_RECEIVED` are not.
    pub fn classify(type_field: &str) -> Self {
        let upper = type_field.trim().to_ascii_uppercase();
        if upper.is_empty() {
            NotificationKind::Generic
        } else if upper.contains("INVIT") || upper == "RSVP" || upper.contains("RSVP_REQUEST") {
            NotificationKind::Invite
        } else if upper.contains("STAGE") {
            NotificationKind::StageChange
        } else if upper.contains("ALBUM") || upper.contains("PHOTO") {
            NotificationKind::AlbumUpdate
        } else if upper.contains("EVENT") || upper.contains("UPDATE") {
            NotificationKind::EventUpdate
        } else {
            NotificationKind::Generic
        }
    }

    fn default_title(self) -> &'static str {
        match self {
            NotificationKind::Invite => "You're invited",
            NotificationKind::EventUpdate => "Event updated",
            NotificationKind::StageChange => "Event stage changed",
            NotificationKind::AlbumUpdate => "New photos",
            NotificationKind::Generic => "Notification",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::Invite => write!(f, "invite"),
            NotificationKind::EventUpdate => write!(f, "event_update"),
            NotificationKind::StageChange => write!(f, "stage_change"),
            NotificationKind::AlbumUpdate => write!(f, "album_update"),
            NotificationKind::Generic => write!(f, "generic"),
        }
    }
}

/// Which partition a notification belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadState {
    Unread,
    Read,
}

impl fmt::Display for ReadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadState::Unread => write!(f, "unread"),
            ReadState::Read => write!(f, "read"),
        }
    }
}

/// A normalized inbox notification.
///
/// `raw` keeps the original backend object so later resolution steps can
/// look at fields normalization does not model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub created_at: Option<DateTime<Utc>>,
    pub event_id: Option<EventId>,
    pub read_state: ReadState,
    pub raw: Value,
}

impl Notification {
    /// Normalizes a raw backend object fetched from the given partition.
    ///
    /// Returns `None` when the object carries no usable identifier.
    pub fn from_raw(raw: Value, read_state: ReadState) -> Option<Self> {
        let id = first_id(&raw, ID_FIELDS)?;

        let kind = first_text(&raw, TYPE_FIELDS)
            .map(|t| NotificationKind::classify(&t))
            .unwrap_or(NotificationKind::Generic);

        let title = first_text(&raw, TITLE_FIELDS)
            .unwrap_or_else(|| kind.default_title().to_string());
        let message = first_text(&raw, MESSAGE_FIELDS).unwrap_or_default();
        let created_at = first_present(&raw, CREATED_AT_FIELDS).and_then(parse_timestamp);
        let event_id = first_id(&raw, EVENT_ID_FIELDS).map(EventId::new);

        Some(Self {
            id,
            kind,
            title,
            message,
            created_at,
            event_id,
            read_state,
            raw,
        })
    }

    /// The kind assigned at ingestion.
    pub fn kind(&self) -> NotificationKind {
        self.kind
    }

    pub fn is_invite(&self) -> bool {
        self.kind == NotificationKind::Invite
    }

    pub fn is_unread(&self) -> bool {
        self.read_state == ReadState::Unread
    }

    /// Copy of this notification moved into another partition.
    pub fn with_read_state(&self, read_state: ReadState) -> Self {
        Self {
            read_state,
            ..self.clone()
        }
    }

    /// Sort key: missing timestamps count as the epoch.
    fn sort_timestamp(&self) -> i64 {
        self.created_at.map(|t| t.timestamp_millis()).unwrap_or(0)
    }
}

/// Newest-first ordering; notifications without a timestamp sort last.
pub fn newest_first(a: &Notification, b: &Notification) -> Ordering {
    b.sort_timestamp().cmp(&a.sort_timestamp())
}

/// Sorts a partition newest-first. The sort is stable, so ties keep backend order.
pub fn sort_newest_first(notifications: &mut [Notification]) {
    notifications.sort_by(newest_first);
}
