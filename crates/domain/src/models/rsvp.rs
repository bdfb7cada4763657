//! RSVP domain models.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use validator::Validate;

use super::guest::{EventId, GuestId};

/// A guest's response to an invitation.
///
/// Encoded on the wire as 0 (unanswered), 1 (accepted) or 2 (declined).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RsvpStatus {
    #[default]
    Unanswered,
    Accepted,
    Declined,
}

/// Raised for status codes outside 0..=2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid RSVP status code: {0}")]
pub struct InvalidRsvpStatus(pub u8);

impl RsvpStatus {
    pub fn code(self) -> u8 {
        match self {
            RsvpStatus::Unanswered => 0,
            RsvpStatus::Accepted => 1,
            RsvpStatus::Declined => 2,
        }
    }

    /// Accepted and declined are terminal; unanswered is not.
    pub fn is_terminal(self) -> bool {
        !matches!(self, RsvpStatus::Unanswered)
    }

    /// Reads a status from a JSON number or numeric string.
    pub fn from_value(value: &Value) -> Option<Self> {
        let code = match value {
            Value::Number(n) => n.as_u64()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        u8::try_from(code).ok().and_then(|c| Self::try_from(c).ok())
    }
}

impl TryFrom<u8> for RsvpStatus {
    type Error = InvalidRsvpStatus;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(RsvpStatus::Unanswered),
            1 => Ok(RsvpStatus::Accepted),
            2 => Ok(RsvpStatus::Declined),
            other => Err(InvalidRsvpStatus(other)),
        }
    }
}

impl From<RsvpStatus> for u8 {
    fn from(status: RsvpStatus) -> Self {
        status.code()
    }
}

impl fmt::Display for RsvpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RsvpStatus::Unanswered => write!(f, "unanswered"),
            RsvpStatus::Accepted => write!(f, "accepted"),
            RsvpStatus::Declined => write!(f, "declined"),
        }
    }
}

/// A guest's RSVP for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpRecord {
    pub event_id: EventId,
    pub guest_id: GuestId,
    pub status: RsvpStatus,
}

/// Form body of `PATCH /guests/{guestId}/rsvp`.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct RsvpUpdateForm {
    /// Only accepted (1) or declined (2) may be submitted.
    #[validate(range(min = 1, max = 2, message = "rsvp_status must be 1 or 2"))]
    pub rsvp_status: u8,
}

impl RsvpUpdateForm {
    pub fn new(status: RsvpStatus) -> Self {
        Self {
            rsvp_status: status.code(),
        }
    }
}
