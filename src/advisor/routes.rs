//! REST endpoints for conversational sessions, the questionnaire and the
//! catalog.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};
use uuid::Uuid;

use super::catalog::CatalogLookup;
use super::features::FeatureForm;
use super::session::{DialogueManager, DialogueSession};
use crate::error::{ClassifierError, DialogueError};
use crate::stream::StreamLabel;

/// Live sessions, keyed by id. Each session has its own lock, held for the
/// whole turn, so turns of one session never interleave while different
/// sessions proceed independently.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<DialogueSession>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session and return its id and greeting.
    pub async fn create(&self) -> (Uuid, String) {
        let session = DialogueSession::new();
        let id = session.id();
        let greeting = session.greeting().to_string();
        self.sessions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(session)));
        (id, greeting)
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<Mutex<DialogueSession>>, DialogueError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(DialogueError::SessionNotFound { id })
    }

    /// Drop a session. Fails when the id is unknown.
    pub async fn remove(&self, id: Uuid) -> Result<(), DialogueError> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(DialogueError::SessionNotFound { id })
    }

    /// Drop every session idle for at least `ttl`. Sessions in the middle of
    /// a turn are kept. Returns how many were dropped.
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl))
        else {
            return 0;
        };

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| match session.try_lock() {
            Ok(session) => session.last_active() > cutoff,
            Err(_) => true,
        });
        before - sessions.len()
    }

    /// Run [`evict_idle`](Self::evict_idle) in the background every half `ttl`.
    pub fn spawn_sweeper(self: Arc<Self>, ttl: Duration) -> JoinHandle<()> {
        let period = (ttl / 2).max(Duration::from_millis(10));
        tokio::spawn(async move {
            info!("Session sweeper started (ttl: {}s)", ttl.as_secs());

            let mut tick = tokio::time::interval(period);
            // First tick fires immediately
            loop {
                tick.tick().await;
                let evicted = self.evict_idle(ttl).await;
                if evicted > 0 {
                    let remaining = self.len().await;
                    info!(evicted, remaining, "Evicted idle sessions");
                }
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<DialogueManager>,
    pub sessions: Arc<SessionRegistry>,
}

/// Build the advisor router over a session registry.
pub fn advisor_routes(manager: Arc<DialogueManager>, sessions: Arc<SessionRegistry>) -> Router {
    let state = AppState { manager, sessions };

    Router::new()
        .route("/health", get(health))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", get(get_session).delete(delete_session))
        .route("/api/sessions/{id}/messages", post(post_message))
        .route("/api/recommend", post(recommend))
        .route("/api/catalog/{stream}", get(get_catalog))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "stream-advisor"
    }))
}

// ── Sessions ────────────────────────────────────────────────────────────

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({"error": message.into()}))).into_response()
}

fn parse_session_id(id: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(id).map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid session ID"))
}

async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    let (session_id, greeting) = state.sessions.create().await;
    info!(session_id = %session_id, "Session started");
    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "session_id": session_id,
            "greeting": greeting,
        })),
    )
}

async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = match parse_session_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.sessions.get(id).await {
        Ok(session) => Json(session.lock().await.snapshot()).into_response(),
        Err(e) => error_response(StatusCode::NOT_FOUND, e.to_string()),
    }
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = match parse_session_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.sessions.remove(id).await {
        Ok(()) => {
            info!(session_id = %id, "Session closed");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => error_response(StatusCode::NOT_FOUND, e.to_string()),
    }
}

#[derive(Deserialize)]
struct MessageRequest {
    text: String,
}

async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<MessageRequest>,
) -> Response {
    let id = match parse_session_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let session = match state.sessions.get(id).await {
        Ok(session) => session,
        Err(e) => return error_response(StatusCode::NOT_FOUND, e.to_string()),
    };

    let mut session = session.lock().await;
    match state.manager.handle_turn(&mut session, &body.text).await {
        Ok(payload) => Json(payload).into_response(),
        Err(e @ DialogueError::EmptyInput) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => error_response(StatusCode::NOT_FOUND, e.to_string()),
    }
}

// ── Questionnaire ───────────────────────────────────────────────────────

async fn recommend(
    State(state): State<AppState>,
    form: Result<Json<FeatureForm>, JsonRejection>,
) -> Response {
    let Json(form) = match form {
        Ok(form) => form,
        Err(rejection) => {
            debug!(reason = %rejection.body_text(), "Unreadable questionnaire");
            return (
                rejection.status(),
                Json(serde_json::json!({
                    "error": rejection.body_text(),
                    "field": null,
                })),
            )
                .into_response();
        }
    };
    match state.manager.recommend_from_form(form) {
        Ok(payload) => Json(payload).into_response(),
        Err(ClassifierError::InvalidFeatureVector { field, reason }) => {
            debug!(field = %field, reason = %reason, "Rejected questionnaire");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({
                    "error": format!("{field} {reason}"),
                    "field": field,
                })),
            )
                .into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ── Catalog ─────────────────────────────────────────────────────────────

async fn get_catalog(State(state): State<AppState>, Path(stream): Path<String>) -> Response {
    let stream: StreamLabel = match stream.parse() {
        Ok(stream) => stream,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("{e}")),
    };
    match state.manager.lookup(stream) {
        CatalogLookup::Found(view) => Json(view).into_response(),
        CatalogLookup::Missing => error_response(
            StatusCode::NOT_FOUND,
            format!("No financial data for {stream}"),
        ),
    }
}
