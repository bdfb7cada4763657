//! REST implementation of [`NotificationGateway`].

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use validator::Validate;

use domain::models::{EventId, GuestId, GuestRecord, RsvpStatus, RsvpUpdateForm, TokenValidation};
use domain::services::{GatewayError, NotificationGateway};
use shared::json::{first_text, lookup};

use crate::config::GatewayConfig;
use crate::metrics::RequestTimer;

/// Envelope keys list endpoints have wrapped their arrays in.
const LIST_ENVELOPES: &[&str] = &[
    "data",
    "notifications",
    "results",
    "items",
    "data.notifications",
    "data.results",
];

/// Supplies the bearer token for each request.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current access token; `None` sends the request unauthenticated.
    async fn access_token(&self) -> Option<String>;
}

/// A token fixed at startup.
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// Errors building an [`HttpGateway`].
#[derive(Debug, Error)]
pub enum HttpGatewayError {
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Invalid gateway base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Gateway client over the backend REST API.
pub struct HttpGateway {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpGateway {
    pub fn new(
        config: &GatewayConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, HttpGatewayError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(HttpGatewayError::InvalidBaseUrl(config.base_url.clone()));
        }

        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            base_url,
            tokens,
        })
    }

    /// Gateway authenticated with the configured static token, if any.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, HttpGatewayError> {
        let tokens = StaticTokenProvider::new(config.access_token.clone());
        Self::new(config, Arc::new(tokens))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Sends `request` with auth, timing and status mapping applied.
    async fn send(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, GatewayError> {
        let request = match self.tokens.access_token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let timer = RequestTimer::new(endpoint);
        let result = execute(request).await;
        timer.finish(result.is_ok());

        match &result {
            Ok(response) => {
                debug!(endpoint, status = %response.status(), "Gateway request completed")
            }
            Err(e) => warn!(endpoint, error = %e, "Gateway request failed"),
        }
        result
    }

    async fn json(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<Value, GatewayError> {
        let response = self.send(endpoint, request).await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("{endpoint}: {e}")))
    }

    async fn list(&self, endpoint: &'static str, path: &str) -> Result<Vec<Value>, GatewayError> {
        let body = self.json(endpoint, self.client.get(self.url(path))).await?;
        extract_list(body)
            .ok_or_else(|| GatewayError::InvalidResponse(format!("{endpoint}: expected a list")))
    }
}

async fn execute(request: RequestBuilder) -> Result<Response, GatewayError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            GatewayError::Transport(format!("request timed out: {e}"))
        } else {
            GatewayError::Transport(e.to_string())
        }
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GatewayError::Unauthorized(
            format!("HTTP {}", status.as_u16()),
        )),
        _ => Err(GatewayError::Status {
            status: status.as_u16(),
            body,
        }),
    }
}

/// A bare array, or an array under one of the known envelope keys.
fn extract_list(body: Value) -> Option<Vec<Value>> {
    if let Value::Array(items) = body {
        return Some(items);
    }
    LIST_ENVELOPES
        .iter()
        .find_map(|key| lookup(&body, key).and_then(Value::as_array))
        .cloned()
}

#[async_trait]
impl NotificationGateway for HttpGateway {
    async fn list_unread(&self) -> Result<Vec<Value>, GatewayError> {
        self.list("list_unread", "notifications/unread").await
    }

    async fn list_read(&self) -> Result<Vec<Value>, GatewayError> {
        self.list("list_read", "notifications/read").await
    }

    async fn mark_as_read(&self, notification_id: &str) -> Result<(), GatewayError> {
        let url = self.url(&format!("notifications/{notification_id}/mark-as-read"));
        self.send("mark_as_read", self.client.patch(url)).await?;
        Ok(())
    }

    async fn delete_notification(&self, notification_id: &str) -> Result<(), GatewayError> {
        let url = self.url(&format!("notifications/{notification_id}"));
        self.send("delete_notification", self.client.delete(url))
            .await?;
        Ok(())
    }

    async fn validate_invite_token(&self, token: &str) -> Result<TokenValidation, GatewayError> {
        let request = self
            .client
            .get(self.url("guests/invite/validate"))
            .query(&[("token", token)]);
        let body = self.json("validate_invite_token", request).await?;

        TokenValidation::from_value(&body)
            .or_else(|| lookup(&body, "data").and_then(TokenValidation::from_value))
            .ok_or_else(|| {
                GatewayError::InvalidResponse("validate_invite_token: no guest_id".to_string())
            })
    }

    async fn list_event_guests(
        &self,
        event_id: &EventId,
    ) -> Result<Vec<GuestRecord>, GatewayError> {
        let raw = self
            .list("list_event_guests", &format!("guests/event/{event_id}"))
            .await?;
        let total = raw.len();
        let guests: Vec<_> = raw.iter().filter_map(GuestRecord::from_value).collect();
        if guests.len() < total {
            debug!(
                event_id = %event_id,
                skipped = total - guests.len(),
                "Skipped guest entries without an id"
            );
        }
        Ok(guests)
    }

    async fn update_rsvp(
        &self,
        guest_id: &GuestId,
        status: RsvpStatus,
    ) -> Result<(), GatewayError> {
        let form = RsvpUpdateForm::new(status);
        form.validate()
            .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;

        let url = self.url(&format!("guests/{guest_id}/rsvp"));
        self.send("update_rsvp", self.client.patch(url).form(&form))
            .await?;
        Ok(())
    }

    async fn invitation_photo(&self, event_id: &EventId) -> Result<Option<String>, GatewayError> {
        let request = self
            .client
            .get(self.url(&format!("events/{event_id}/invitation-photo/")));
        match self.json("invitation_photo", request).await {
            Ok(body) => Ok(first_text(&body, &["url_invitation", "data.url_invitation"])),
            // No photo uploaded for the event.
            Err(GatewayError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
