//! Invitation detail session.
//!
//! Orchestrates what happens when the user opens a notification:
//!
//! ```text
//! open ─┬─ mark as read (fire and forget)
//!       ├─ (a) invitation image
//!       └─ (b) identity resolution ──> (c) RSVP status check
//! ```
//!
//! (c) depends on (b) producing an identity. (a) starts at once when the
//! notification names its event, otherwise once (b) has learned one (token
//! validation returns it). The session is `Ready` once (b) completes.
//!
//! Every task result carries the id of the session that started it and is
//! dropped if that session is no longer current. Closing does not cancel
//! in-flight gateway calls.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::gateway::{GatewayError, NotificationGateway};
use super::identity_resolution::{derive_event_id, GuestIdentityResolver};
use super::notification_store::NotificationStore;
use super::rsvp::{RsvpError, RsvpReconciler};
use crate::models::{EventId, GuestId, GuestIdentity, Notification, RsvpStatus};

/// Lifecycle of the detail view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Closed,
    Opening,
    Ready,
    AnsweredTerminal,
}

/// State of one asynchronous sub-task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState<T> {
    NotStarted,
    Pending,
    Done(T),
    Failed(String),
}

impl<T> TaskState<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskState::Pending)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            TaskState::Done(value) => Some(value),
            _ => None,
        }
    }
}

/// What the detail view shows at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailSnapshot {
    pub session_id: Option<Uuid>,
    pub phase: SessionPhase,
    pub notification: Option<Notification>,
    /// `Done(None)` means every resolution strategy failed.
    pub identity: TaskState<Option<GuestIdentity>>,
    pub image: TaskState<Option<String>>,
    pub rsvp: TaskState<RsvpStatus>,
    pub submitting: bool,
}

impl DetailSnapshot {
    fn closed() -> Self {
        Self {
            session_id: None,
            phase: SessionPhase::Closed,
            notification: None,
            identity: TaskState::NotStarted,
            image: TaskState::NotStarted,
            rsvp: TaskState::NotStarted,
            submitting: false,
        }
    }

    pub fn resolved_identity(&self) -> Option<&GuestIdentity> {
        self.identity.value().and_then(Option::as_ref)
    }

    /// Resolution finished without an identity: show "missing information".
    pub fn identity_unresolved(&self) -> bool {
        matches!(self.identity, TaskState::Done(None))
    }

    /// Terminal RSVP status shown by this session, if any.
    pub fn answered_status(&self) -> Option<RsvpStatus> {
        self.rsvp.value().copied().filter(|s| s.is_terminal())
    }

    pub fn can_answer(&self) -> bool {
        self.phase == SessionPhase::Ready
            && self.resolved_identity().is_some()
            && self.answered_status().is_none()
            && !self.rsvp.is_pending()
            && !self.submitting
    }

    /// No sub-task is still pending.
    pub fn is_settled(&self) -> bool {
        self.phase != SessionPhase::Opening
            && !self.identity.is_pending()
            && !self.image.is_pending()
            && !self.rsvp.is_pending()
    }
}

/// Errors returned by [`InvitationDetailSession::answer`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnswerError {
    #[error("No invitation is open")]
    NoActiveSession,

    #[error("Guest identity is not resolved")]
    IdentityUnresolved,

    #[error("Invitation already answered: {0}")]
    AlreadyAnswered(RsvpStatus),

    #[error("An answer is already being submitted")]
    SubmissionInFlight,

    #[error("RSVP status is still being checked")]
    AwaitingStatus,

    #[error("Only accepted or declined can be submitted, got {0}")]
    InvalidStatus(RsvpStatus),

    #[error("Network error: {0}")]
    Network(GatewayError),
}

impl From<RsvpError> for AnswerError {
    fn from(err: RsvpError) -> Self {
        match err {
            RsvpError::InvalidStatus(status) => AnswerError::InvalidStatus(status),
            RsvpError::Network(e) => AnswerError::Network(e),
        }
    }
}

/// Result of a successful answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub status: RsvpStatus,
    /// The caller should leave the invitation flow.
    pub exit_flow: bool,
}

/// Session behaviour knobs.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Email of the signed-in user, for email-matched resolution.
    pub profile_email: Option<String>,
    /// Whether a declined answer also leaves the invitation flow.
    pub exit_on_decline: bool,
}

struct SessionShared {
    store: Arc<NotificationStore>,
    resolver: GuestIdentityResolver,
    reconciler: Arc<RsvpReconciler>,
    gateway: Arc<dyn NotificationGateway>,
    options: SessionOptions,
    identities: RwLock<HashMap<String, GuestIdentity>>,
    state: watch::Sender<DetailSnapshot>,
}

impl SessionShared {
    /// Apply `update` only if `session_id` is still the current session.
    fn apply(
        &self,
        session_id: Uuid,
        result: &'static str,
        update: impl FnOnce(&mut DetailSnapshot),
    ) -> bool {
        let applied = self.state.send_if_modified(|snapshot| {
            if snapshot.session_id != Some(session_id) {
                return false;
            }
            update(snapshot);
            true
        });
        if !applied {
            debug!(session_id = %session_id, result, "Discarding stale result");
        }
        applied
    }

    fn cached_identity(&self, notification_id: &str) -> Option<GuestIdentity> {
        self.identities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(notification_id)
            .cloned()
    }

    fn remember_identity(&self, notification_id: &str, identity: GuestIdentity) {
        self.identities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(notification_id.to_string(), identity);
    }

    async fn fetch_image(self: Arc<Self>, session_id: Uuid, event_id: EventId) {
        let result = self.gateway.invitation_photo(&event_id).await;
        if let Err(e) = &result {
            warn!(event_id = %event_id, error = %e, "Invitation image unavailable");
        }
        self.apply(session_id, "image", |snapshot| {
            snapshot.image = match result {
                Ok(url) => TaskState::Done(url),
                Err(e) => TaskState::Failed(e.to_string()),
            };
        });
    }

    /// `image_waiting` means the image task could not start without an event
    /// id and waits for the one resolution may learn.
    async fn resolve_then_check(
        self: Arc<Self>,
        session_id: Uuid,
        notification: Notification,
        image_waiting: bool,
    ) {
        let identity = match self.cached_identity(&notification.id) {
            Some(identity) => {
                debug!(notification_id = %notification.id, "Using cached guest identity");
                Some(identity)
            }
            None => {
                self.resolver
                    .resolve(&notification, self.options.profile_email.as_deref())
                    .await
            }
        };

        let event_id = identity
            .as_ref()
            .and_then(|i| i.event_id.clone())
            .or_else(|| derive_event_id(&notification));
        let late_image = event_id.clone().filter(|_| image_waiting);
        let check = identity.clone().zip(event_id);

        let applied = self.apply(session_id, "identity", |snapshot| {
            snapshot.identity = TaskState::Done(identity.clone());
            if snapshot.phase == SessionPhase::Opening {
                snapshot.phase = SessionPhase::Ready;
            }
            if check.is_some() {
                snapshot.rsvp = TaskState::Pending;
            }
            if image_waiting && late_image.is_none() {
                snapshot.image = TaskState::Done(None);
            }
        });
        if !applied {
            return;
        }
        if let Some(event_id) = late_image {
            tokio::spawn(self.clone().fetch_image(session_id, event_id));
        }
        if let Some(identity) = identity {
            self.remember_identity(&notification.id, identity);
        }

        // Dependency edge: the status check only runs with a resolved identity.
        let Some((identity, event_id)) = check else {
            return;
        };
        let result = self
            .reconciler
            .fetch_status(&event_id, &identity.guest_id)
            .await
            .map(|record| record.map(|r| r.status));

        let reconciler = &self.reconciler;
        self.apply(session_id, "rsvp", |snapshot| {
            let cached = match &result {
                Ok(Some(status)) => reconciler.record(&notification.id, *status),
                _ => reconciler.cached_status(&notification.id),
            };
            snapshot.rsvp = match (result, cached) {
                (_, Some(terminal)) => TaskState::Done(terminal),
                (Ok(status), None) => TaskState::Done(status.unwrap_or_default()),
                (Err(e), None) => TaskState::Failed(e.to_string()),
            };
            if let (SessionPhase::Ready, Some(status)) = (snapshot.phase, cached) {
                info!(
                    notification_id = %notification.id,
                    status = %status,
                    "Invitation already answered"
                );
            }
        });
    }
}

/// Detail-view orchestrator for one selected notification at a time.
///
/// Long-lived: the identity cache it keeps, the reconciler's status cache and
/// the store's partitions all outlive individual open/close cycles.
pub struct InvitationDetailSession {
    shared: Arc<SessionShared>,
}

impl InvitationDetailSession {
    pub fn new(
        store: Arc<NotificationStore>,
        reconciler: Arc<RsvpReconciler>,
        gateway: Arc<dyn NotificationGateway>,
        options: SessionOptions,
    ) -> Self {
        let (state, _) = watch::channel(DetailSnapshot::closed());
        Self {
            shared: Arc::new(SessionShared {
                store,
                resolver: GuestIdentityResolver::new(gateway.clone()),
                reconciler,
                gateway,
                options,
                identities: RwLock::new(HashMap::new()),
                state,
            }),
        }
    }

    /// Open a notification, replacing any current session.
    ///
    /// Returns immediately; sub-tasks run on the tokio runtime this is called from.
    pub fn open(&self, notification: Notification) -> Uuid {
        let shared = &self.shared;
        let session_id = Uuid::new_v4();
        let is_invite = notification.is_invite();
        let event_id = derive_event_id(&notification);

        shared.state.send_replace(DetailSnapshot {
            session_id: Some(session_id),
            phase: if is_invite {
                SessionPhase::Opening
            } else {
                SessionPhase::Ready
            },
            notification: Some(notification.clone()),
            identity: if is_invite {
                TaskState::Pending
            } else {
                TaskState::NotStarted
            },
            image: if is_invite {
                TaskState::Pending
            } else {
                TaskState::NotStarted
            },
            rsvp: shared
                .reconciler
                .cached_status(&notification.id)
                .map_or(TaskState::NotStarted, TaskState::Done),
            submitting: false,
        });

        info!(
            session_id = %session_id,
            notification_id = %notification.id,
            kind = %notification.kind(),
            "Detail session opened"
        );

        if notification.is_unread() {
            let store = shared.store.clone();
            let id = notification.id.clone();
            tokio::spawn(async move {
                if let Err(e) = store.mark_as_read(&id).await {
                    warn!(notification_id = %id, error = %e, "Mark as read on open failed");
                }
            });
        }

        if is_invite {
            let image_waiting = event_id.is_none();
            if let Some(event_id) = event_id {
                tokio::spawn(shared.clone().fetch_image(session_id, event_id));
            }
            tokio::spawn(
                shared
                    .clone()
                    .resolve_then_check(session_id, notification, image_waiting),
            );
        }

        session_id
    }

    /// Answer the open invitation.
    ///
    /// Allowed only with a resolved identity, no known terminal status and
    /// no status check in flight.
    pub async fn answer(&self, status: RsvpStatus) -> Result<AnswerOutcome, AnswerError> {
        if !status.is_terminal() {
            return Err(AnswerError::InvalidStatus(status));
        }

        let reconciler = &self.shared.reconciler;
        let mut claim = Err(AnswerError::NoActiveSession);
        self.shared.state.send_if_modified(|snapshot| {
            claim = claim_answer(snapshot, reconciler);
            claim.is_ok()
        });
        let (session_id, notification_id, guest_id) = claim?;

        match reconciler.submit(&notification_id, &guest_id, status).await {
            Ok(status) => {
                self.shared.apply(session_id, "answer", |snapshot| {
                    snapshot.submitting = false;
                    snapshot.phase = SessionPhase::AnsweredTerminal;
                    snapshot.rsvp = TaskState::Done(status);
                });
                let exit_flow = match status {
                    RsvpStatus::Accepted => true,
                    RsvpStatus::Declined => self.shared.options.exit_on_decline,
                    RsvpStatus::Unanswered => false,
                };
                Ok(AnswerOutcome { status, exit_flow })
            }
            Err(e) => {
                warn!(notification_id = %notification_id, error = %e, "RSVP submission failed");
                self.shared.apply(session_id, "answer", |snapshot| {
                    snapshot.submitting = false;
                });
                Err(e.into())
            }
        }
    }

    /// Close the current session. Caches and partition changes are kept.
    pub fn close(&self) {
        let previous = self.shared.state.send_replace(DetailSnapshot::closed());
        if let Some(session_id) = previous.session_id {
            info!(session_id = %session_id, "Detail session closed");
        }
    }

    pub fn snapshot(&self) -> DetailSnapshot {
        self.shared.state.borrow().clone()
    }

    /// Receive every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<DetailSnapshot> {
        self.shared.state.subscribe()
    }

    /// Wait until identity resolution has finished.
    pub async fn wait_ready(&self) -> DetailSnapshot {
        self.wait_until(|snapshot| snapshot.phase != SessionPhase::Opening)
            .await
    }

    /// Wait until no sub-task is pending.
    pub async fn wait_settled(&self) -> DetailSnapshot {
        self.wait_until(DetailSnapshot::is_settled).await
    }

    async fn wait_until(&self, predicate: impl FnMut(&DetailSnapshot) -> bool) -> DetailSnapshot {
        let mut updates = self.shared.state.subscribe();
        let snapshot = match updates.wait_for(predicate).await {
            Ok(snapshot) => Some(snapshot.clone()),
            Err(_) => None,
        };
        snapshot.unwrap_or_else(|| self.snapshot())
    }
}

/// Checks whether `snapshot` may be answered and, if so, marks it submitting.
fn claim_answer(
    snapshot: &mut DetailSnapshot,
    reconciler: &RsvpReconciler,
) -> Result<(Uuid, String, GuestId), AnswerError> {
    let (Some(session_id), Some(notification)) = (snapshot.session_id, &snapshot.notification)
    else {
        return Err(AnswerError::NoActiveSession);
    };

    if let Some(status) = reconciler
        .cached_status(&notification.id)
        .or(snapshot.answered_status())
    {
        return Err(AnswerError::AlreadyAnswered(status));
    }
    let Some(identity) = snapshot.resolved_identity() else {
        return Err(AnswerError::IdentityUnresolved);
    };
    // The check may still reveal an answer given elsewhere.
    if snapshot.rsvp.is_pending() {
        return Err(AnswerError::AwaitingStatus);
    }
    if snapshot.submitting {
        return Err(AnswerError::SubmissionInFlight);
    }

    let claim = (session_id, notification.id.clone(), identity.guest_id.clone());
    snapshot.submitting = true;
    Ok(claim)
}
