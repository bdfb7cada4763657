//! Wires the gateway and the inbox services together.

use std::sync::Arc;

use tracing::warn;

use domain::services::{
    DetailSnapshot, InboxError, InvitationDetailSession, NotificationGateway, NotificationStore,
    RsvpReconciler, SessionOptions,
};

use crate::config::Config;
use crate::gateway::{HttpGateway, HttpGatewayError};

/// A notification opened in the detail view and settled.
#[derive(Debug)]
pub struct OpenedNotification {
    pub snapshot: DetailSnapshot,
    /// Marking it read failed and was rolled back. The detail opened anyway.
    pub read_error: Option<InboxError>,
}

/// The inbox services for one app run.
///
/// The store, the reconciler's status cache and the session's identity
/// cache all live as long as this value.
pub struct Inbox {
    pub store: Arc<NotificationStore>,
    pub reconciler: Arc<RsvpReconciler>,
    pub session: InvitationDetailSession,
}

impl Inbox {
    pub fn with_gateway(gateway: Arc<dyn NotificationGateway>, options: SessionOptions) -> Self {
        let store = Arc::new(NotificationStore::new(gateway.clone()));
        let reconciler = Arc::new(RsvpReconciler::new(gateway.clone()));
        let session =
            InvitationDetailSession::new(store.clone(), reconciler.clone(), gateway, options);

        Self {
            store,
            reconciler,
            session,
        }
    }

    /// Marks the notification read, then opens it and waits for every sub-task.
    ///
    /// Marking is awaited here so it lands before a short-lived process exits.
    /// Only an unknown id is an error.
    pub async fn open_settled(&self, id: &str) -> Result<OpenedNotification, InboxError> {
        let read_error = match self.store.mark_as_read(id).await {
            Ok(_) => None,
            Err(InboxError::NotFound(id)) => return Err(InboxError::NotFound(id)),
            Err(e) => {
                warn!(notification_id = %id, error = %e, "Mark as read failed, opening anyway");
                Some(e)
            }
        };

        let notification = self
            .store
            .get(id)
            .await
            .ok_or_else(|| InboxError::NotFound(id.to_string()))?;
        self.session.open(notification);

        Ok(OpenedNotification {
            snapshot: self.session.wait_settled().await,
            read_error,
        })
    }
}

/// Build the inbox against the configured REST gateway.
pub fn create_inbox(config: &Config) -> Result<Inbox, HttpGatewayError> {
    let gateway = HttpGateway::from_config(&config.gateway)?;
    Ok(Inbox::with_gateway(
        Arc::new(gateway),
        config.session_options(),
    ))
}
