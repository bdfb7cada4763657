//! Domain models for the RSVP inbox.

pub mod guest;
pub mod notification;
pub mod rsvp;

pub use guest::{EventId, GuestId, GuestIdentity, GuestRecord, IdentitySource, TokenValidation};
pub use notification::{sort_newest_first, Notification, NotificationKind, ReadState};
pub use rsvp::{InvalidRsvpStatus, RsvpRecord, RsvpStatus, RsvpUpdateForm};
