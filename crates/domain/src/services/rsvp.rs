//! RSVP reconciliation against the gateway.
//!
//! The reconciler owns the notification-keyed terminal status cache. The
//! cache lives for the whole app run and is deliberately separate from the
//! inbox partitions.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::gateway::{GatewayError, NotificationGateway};
use crate::models::{EventId, GuestId, RsvpRecord, RsvpStatus};

/// Errors returned by [`RsvpReconciler::submit`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RsvpError {
    #[error("Only accepted or declined can be submitted, got {0}")]
    InvalidStatus(RsvpStatus),

    #[error("Network error: {0}")]
    Network(#[from] GatewayError),
}

/// Terminal RSVP statuses known this run, keyed by notification id.
///
/// Monotonic: once a notification has a terminal status it never goes back
/// to unanswered. A later terminal status replaces an earlier one.
#[derive(Debug, Default)]
pub struct RsvpStatusCache {
    statuses: RwLock<HashMap<String, RsvpStatus>>,
}

impl RsvpStatusCache {
    pub fn get(&self, notification_id: &str) -> Option<RsvpStatus> {
        self.statuses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(notification_id)
            .copied()
    }

    /// Record a status; unanswered is ignored. Returns the cached status afterwards.
    pub fn record(&self, notification_id: &str, status: RsvpStatus) -> Option<RsvpStatus> {
        let mut statuses = self.statuses.write().unwrap_or_else(PoisonError::into_inner);
        if status.is_terminal() {
            statuses.insert(notification_id.to_string(), status);
        }
        statuses.get(notification_id).copied()
    }
}

/// Checks and submits RSVP answers.
pub struct RsvpReconciler {
    gateway: Arc<dyn NotificationGateway>,
    cache: RsvpStatusCache,
}

impl RsvpReconciler {
    pub fn new(gateway: Arc<dyn NotificationGateway>) -> Self {
        Self {
            gateway,
            cache: RsvpStatusCache::default(),
        }
    }

    /// Terminal status known for a notification this run.
    pub fn cached_status(&self, notification_id: &str) -> Option<RsvpStatus> {
        self.cache.get(notification_id)
    }

    /// Record a status learned elsewhere; unanswered is ignored.
    pub fn record(&self, notification_id: &str, status: RsvpStatus) -> Option<RsvpStatus> {
        self.cache.record(notification_id, status)
    }

    /// Fetch the guest's current RSVP from the event's guest list.
    ///
    /// `Ok(None)` means the guest is not on the list. Does not touch the cache.
    pub async fn fetch_status(
        &self,
        event_id: &EventId,
        guest_id: &GuestId,
    ) -> Result<Option<RsvpRecord>, GatewayError> {
        let guests = self.gateway.list_event_guests(event_id).await?;
        Ok(guests
            .into_iter()
            .find(|g| &g.guest_id == guest_id)
            .map(|g| RsvpRecord {
                event_id: event_id.clone(),
                guest_id: g.guest_id,
                status: g.rsvp_status,
            }))
    }

    /// Check the guest's status, caching it against the notification if terminal.
    ///
    /// Returns `None` when the guest is missing or the call fails. A terminal
    /// result here means the invitation was answered through another channel.
    pub async fn check_status(
        &self,
        notification_id: &str,
        event_id: &EventId,
        guest_id: &GuestId,
    ) -> Option<RsvpStatus> {
        match self.fetch_status(event_id, guest_id).await {
            Ok(Some(RsvpRecord { status, .. })) => {
                if status.is_terminal() {
                    self.cache.record(notification_id, status);
                }
                debug!(
                    notification_id = %notification_id,
                    guest_id = %guest_id,
                    status = %status,
                    "RSVP status checked"
                );
                Some(status)
            }
            Ok(None) => {
                debug!(event_id = %event_id, guest_id = %guest_id, "Guest not on event list");
                None
            }
            Err(e) => {
                warn!(event_id = %event_id, error = %e, "RSVP status check failed");
                None
            }
        }
    }

    /// Submit an answer. Only accepted or declined are valid.
    ///
    /// On success the cache is updated; on failure it is left untouched and
    /// the error is returned without retrying.
    pub async fn submit(
        &self,
        notification_id: &str,
        guest_id: &GuestId,
        status: RsvpStatus,
    ) -> Result<RsvpStatus, RsvpError> {
        if !status.is_terminal() {
            return Err(RsvpError::InvalidStatus(status));
        }

        self.gateway.update_rsvp(guest_id, status).await?;
        self.cache.record(notification_id, status);

        info!(
            notification_id = %notification_id,
            guest_id = %guest_id,
            status = %status,
            "RSVP submitted"
        );
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GuestRecord;
    use crate::services::gateway::{MockCall, MockEndpoint, MockGateway};

    fn guest(id: i64, status: RsvpStatus) -> GuestRecord {
        GuestRecord {
            guest_id: GuestId::from(id),
            email: None,
            rsvp_status: status,
        }
    }

    fn reconciler(gateway: MockGateway) -> (Arc<MockGateway>, RsvpReconciler) {
        let gateway = Arc::new(gateway);
        (gateway.clone(), RsvpReconciler::new(gateway))
    }

    #[test]
    fn test_cache_is_monotonic() {
        let cache = RsvpStatusCache::default();
        assert_eq!(cache.record("n1", RsvpStatus::Unanswered), None);
        assert_eq!(cache.record("n1", RsvpStatus::Accepted), Some(RsvpStatus::Accepted));
        assert_eq!(cache.record("n1", RsvpStatus::Unanswered), Some(RsvpStatus::Accepted));
        assert_eq!(cache.record("n1", RsvpStatus::Declined), Some(RsvpStatus::Declined));
        assert_eq!(cache.get("n2"), None);
    }

    #[tokio::test]
    async fn test_check_status_detects_cross_channel_answer() {
        let event = EventId::from(5);
        let (_, reconciler) = reconciler(
            MockGateway::new().with_guests(event.clone(), vec![guest(7, RsvpStatus::Accepted)]),
        );

        let status = reconciler
            .check_status("n1", &event, &GuestId::from(7))
            .await;
        assert_eq!(status, Some(RsvpStatus::Accepted));
        assert_eq!(reconciler.cached_status("n1"), Some(RsvpStatus::Accepted));
    }

    #[tokio::test]
    async fn test_fetch_status_leaves_cache_alone() {
        let event = EventId::from(5);
        let (_, reconciler) = reconciler(
            MockGateway::new().with_guests(event.clone(), vec![guest(7, RsvpStatus::Declined)]),
        );

        let record = reconciler
            .fetch_status(&event, &GuestId::from(7))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            record,
            RsvpRecord {
                event_id: event,
                guest_id: GuestId::from(7),
                status: RsvpStatus::Declined,
            }
        );
        assert_eq!(reconciler.cached_status("n1"), None);
    }

    #[tokio::test]
    async fn test_check_status_unanswered_is_not_cached() {
        let event = EventId::from(5);
        let (_, reconciler) = reconciler(
            MockGateway::new().with_guests(event.clone(), vec![guest(7, RsvpStatus::Unanswered)]),
        );

        let status = reconciler
            .check_status("n1", &event, &GuestId::from(7))
            .await;
        assert_eq!(status, Some(RsvpStatus::Unanswered));
        assert_eq!(reconciler.cached_status("n1"), None);
    }

    #[tokio::test]
    async fn test_check_status_missing_guest_or_failure() {
        let event = EventId::from(5);
        let (gateway, reconciler) = reconciler(
            MockGateway::new().with_guests(event.clone(), vec![guest(8, RsvpStatus::Declined)]),
        );

        assert_eq!(reconciler.check_status("n1", &event, &GuestId::from(7)).await, None);

        gateway.fail(MockEndpoint::ListEventGuests);
        assert_eq!(reconciler.check_status("n1", &event, &GuestId::from(8)).await, None);
        assert_eq!(reconciler.cached_status("n1"), None);
    }

    #[tokio::test]
    async fn test_submit_updates_cache() {
        let (gateway, reconciler) = reconciler(MockGateway::new());

        let status = reconciler
            .submit("n1", &GuestId::from(7), RsvpStatus::Accepted)
            .await
            .unwrap();

        assert_eq!(status, RsvpStatus::Accepted);
        assert_eq!(reconciler.cached_status("n1"), Some(RsvpStatus::Accepted));
        assert_eq!(
            gateway.calls(),
            vec![MockCall::UpdateRsvp(GuestId::from(7), RsvpStatus::Accepted)]
        );
    }

    #[tokio::test]
    async fn test_submit_rejects_unanswered() {
        let (gateway, reconciler) = reconciler(MockGateway::new());

        let err = reconciler
            .submit("n1", &GuestId::from(7), RsvpStatus::Unanswered)
            .await
            .unwrap_err();

        assert_eq!(err, RsvpError::InvalidStatus(RsvpStatus::Unanswered));
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_submit_failure_leaves_cache_unchanged() {
        let (gateway, reconciler) = reconciler(MockGateway::new());
        gateway.fail(MockEndpoint::UpdateRsvp);

        let result = reconciler
            .submit("n1", &GuestId::from(7), RsvpStatus::Declined)
            .await;

        assert!(matches!(result, Err(RsvpError::Network(_))));
        assert_eq!(reconciler.cached_status("n1"), None);
        assert_eq!(gateway.call_count(MockEndpoint::UpdateRsvp), 1);
    }
}
