//! Domain services for the RSVP inbox.
//!
//! Services contain the inbox logic that operates on domain models and talks
//! to the remote gateway through [`NotificationGateway`].

pub mod detail_session;
pub mod gateway;
pub mod identity_resolution;
pub mod notification_store;
pub mod rsvp;

pub use detail_session::{
    AnswerError, AnswerOutcome, DetailSnapshot, InvitationDetailSession, SessionOptions,
    SessionPhase, TaskState,
};

pub use gateway::{GatewayError, MockCall, MockEndpoint, MockGateway, NotificationGateway};

pub use identity_resolution::{derive_event_id, GuestIdentityResolver};

pub use notification_store::{InboxError, InboxSnapshot, MarkReadOutcome, NotificationStore};

pub use rsvp::{RsvpError, RsvpReconciler, RsvpStatusCache};
