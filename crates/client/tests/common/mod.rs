//! In-process fake of the backend REST gateway for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, patch};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use shared::json::value_as_id;

use rsvp_inbox_client::config::GatewayConfig;
use rsvp_inbox_client::gateway::HttpGateway;

pub const TEST_TOKEN: &str = "test-token";

#[derive(Default)]
pub struct FakeBackend {
    pub unread: Vec<Value>,
    pub read: Vec<Value>,
    /// token -> validation body
    pub tokens: HashMap<String, Value>,
    /// event id -> guest list
    pub guests: HashMap<String, Vec<Value>>,
    /// event id -> photo url
    pub photos: HashMap<String, String>,
    /// Delay applied to every response
    pub delay: Option<Duration>,
    /// "METHOD path [body]" for every authorized request
    pub requests: Vec<String>,
}

pub struct FakeGateway {
    pub base_url: String,
    backend: Arc<Mutex<FakeBackend>>,
}

impl FakeGateway {
    /// Start the fake on an ephemeral local port.
    pub async fn spawn(backend: FakeBackend) -> Self {
        let backend = Arc::new(Mutex::new(backend));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake gateway");
        let addr = listener.local_addr().unwrap();

        let app = router(backend.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            backend,
        }
    }

    pub fn backend(&self) -> MutexGuard<'_, FakeBackend> {
        self.backend.lock().unwrap()
    }

    pub fn requests(&self) -> Vec<String> {
        self.backend().requests.clone()
    }

    pub fn config(&self, access_token: Option<&str>) -> GatewayConfig {
        GatewayConfig {
            base_url: self.base_url.clone(),
            timeout_ms: 2000,
            access_token: access_token.map(str::to_string),
        }
    }

    /// HTTP gateway authenticated with [`TEST_TOKEN`].
    pub fn client(&self) -> HttpGateway {
        HttpGateway::from_config(&self.config(Some(TEST_TOKEN))).unwrap()
    }
}

type Shared = Arc<Mutex<FakeBackend>>;
type Reply = Result<Json<Value>, StatusCode>;

fn router(backend: Shared) -> Router {
    Router::new()
        .route("/notifications/unread", get(list_unread))
        .route("/notifications/read", get(list_read))
        .route("/notifications/:id/mark-as-read", patch(mark_as_read))
        .route("/notifications/:id", delete(delete_notification))
        .route("/guests/invite/validate", get(validate_token))
        .route("/guests/event/:event_id", get(list_guests))
        .route("/guests/:guest_id/rsvp", patch(update_rsvp))
        .route("/events/:event_id/invitation-photo/", get(invitation_photo))
        .with_state(backend)
}

/// Checks the bearer token, records the request and applies the delay.
async fn enter(backend: &Shared, headers: &HeaderMap, request: String) -> Result<(), StatusCode> {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {TEST_TOKEN}"))
        .unwrap_or(false);
    if !authorized {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let delay = {
        let mut backend = backend.lock().unwrap();
        backend.requests.push(request);
        backend.delay
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    Ok(())
}

fn raw_id(raw: &Value) -> String {
    value_as_id(&raw["id"]).unwrap_or_default()
}

async fn list_unread(State(backend): State<Shared>, headers: HeaderMap) -> Reply {
    enter(&backend, &headers, "GET /notifications/unread".into()).await?;
    let unread = backend.lock().unwrap().unread.clone();
    Ok(Json(json!({ "data": unread })))
}

async fn list_read(State(backend): State<Shared>, headers: HeaderMap) -> Reply {
    enter(&backend, &headers, "GET /notifications/read".into()).await?;
    let read = backend.lock().unwrap().read.clone();
    Ok(Json(Value::Array(read)))
}

async fn mark_as_read(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    enter(&backend, &headers, format!("PATCH /notifications/{id}/mark-as-read")).await?;
    let mut backend = backend.lock().unwrap();
    let position = backend.unread.iter().position(|raw| raw_id(raw) == id);
    match position {
        Some(index) => {
            let raw = backend.unread.remove(index);
            backend.read.push(raw);
            Ok(StatusCode::OK)
        }
        None if backend.read.iter().any(|raw| raw_id(raw) == id) => Ok(StatusCode::OK),
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn delete_notification(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    enter(&backend, &headers, format!("DELETE /notifications/{id}")).await?;
    let mut backend = backend.lock().unwrap();
    let before = backend.unread.len() + backend.read.len();
    backend.unread.retain(|raw| raw_id(raw) != id);
    backend.read.retain(|raw| raw_id(raw) != id);
    if backend.unread.len() + backend.read.len() < before {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

#[derive(Deserialize)]
struct TokenQuery {
    token: String,
}

async fn validate_token(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Reply {
    enter(&backend, &headers, format!("GET /guests/invite/validate {}", query.token)).await?;
    let validation = backend.lock().unwrap().tokens.get(&query.token).cloned();
    validation.map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn list_guests(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Path(event_id): Path<String>,
) -> Reply {
    enter(&backend, &headers, format!("GET /guests/event/{event_id}")).await?;
    let guests = backend.lock().unwrap().guests.get(&event_id).cloned();
    guests
        .map(|guests| Json(Value::Array(guests)))
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(Deserialize)]
struct RsvpForm {
    rsvp_status: u8,
}

async fn update_rsvp(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Path(guest_id): Path<String>,
    Form(form): Form<RsvpForm>,
) -> Reply {
    enter(
        &backend,
        &headers,
        format!("PATCH /guests/{guest_id}/rsvp rsvp_status={}", form.rsvp_status),
    )
    .await?;
    if !(1..=2).contains(&form.rsvp_status) {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let mut backend = backend.lock().unwrap();
    for guests in backend.guests.values_mut() {
        for guest in guests.iter_mut() {
            if value_as_id(&guest["guest_id"]).as_deref() == Some(guest_id.as_str()) {
                guest["rsvp_status"] = json!(form.rsvp_status);
            }
        }
    }
    Ok(Json(json!({ "guest_id": guest_id, "rsvp_status": form.rsvp_status })))
}

async fn invitation_photo(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Path(event_id): Path<String>,
) -> Reply {
    enter(&backend, &headers, format!("GET /events/{event_id}/invitation-photo/")).await?;
    let url = backend.lock().unwrap().photos.get(&event_id).cloned();
    url.map(|url| Json(json!({ "url_invitation": url })))
        .ok_or(StatusCode::NOT_FOUND)
}
