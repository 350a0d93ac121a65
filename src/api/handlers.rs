use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Query, State},
    http::{Extensions, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::history::HistoryEntry;
use crate::playlist::Playlist;
use crate::state::TokenResponse;
use crate::token::Token;

pub const DEFAULT_HISTORY_LIMIT: usize = 25;
pub const MAX_HISTORY_LIMIT: usize = 1000;

// ── Payloads ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub run_zapscript: bool,
    pub active_token: Option<TokenResponse>,
    pub last_scanned: Option<TokenResponse>,
    pub software_token: Option<TokenResponse>,
    pub readers: Vec<String>,
    pub playlist: Option<Playlist>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub text: String,
    #[serde(default)]
    pub uid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResponse {
    pub queued: bool,
    /// Restricted commands will be refused for this token.
    pub unsafe_origin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsRequest {
    pub run_zapscript: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub run_zapscript: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub mappings: usize,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn error_response(status: StatusCode, message: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// A request is local when the peer address is loopback. Without connection
/// info (e.g. a router driven in-process) the origin is treated as remote.
fn is_local(extensions: &Extensions) -> bool {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .is_some_and(|ConnectInfo(addr)| addr.ip().is_loopback())
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// GET /api/status
pub async fn status(State(state): State<AppState>) -> Response {
    let runtime = &state.runtime;
    let active = runtime.active_token();
    let body = StatusResponse {
        run_zapscript: runtime.run_zapscript_enabled(),
        active_token: (!active.is_removal()).then(|| TokenResponse::from(&active)),
        last_scanned: runtime.last_scanned().as_ref().map(TokenResponse::from),
        software_token: runtime.software_token().as_ref().map(TokenResponse::from),
        readers: runtime.list_readers(),
        playlist: runtime.active_playlist().map(|p| (*p).clone()),
    };
    Json(body).into_response()
}

/// POST /api/run: queue script text as an API token.
pub async fn run(
    State(state): State<AppState>,
    extensions: Extensions,
    Json(req): Json<RunRequest>,
) -> Response {
    if req.text.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "text must not be empty");
    }

    let local = is_local(&extensions);
    let token = Token::from_api(req.uid.unwrap_or_default(), req.text, local);
    tracing::info!("api token queued (local: {}): {}", local, token.text);

    if state.tokens.send(token).await.is_err() {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "service is stopping");
    }
    (
        StatusCode::ACCEPTED,
        Json(RunResponse {
            queued: true,
            unsafe_origin: !local,
        }),
    )
        .into_response()
}

/// PUT /api/settings
pub async fn update_settings(
    State(state): State<AppState>,
    Json(req): Json<SettingsRequest>,
) -> Response {
    if let Some(run) = req.run_zapscript {
        tracing::info!("run_zapscript set to {}", run);
        state.runtime.set_run_zapscript(run);
    }
    Json(SettingsResponse {
        run_zapscript: state.runtime.run_zapscript_enabled(),
    })
    .into_response()
}

/// POST /api/mappings/reload
pub async fn reload_mappings(State(state): State<AppState>) -> Response {
    match state.mappings.reload() {
        Ok(mappings) => Json(ReloadResponse { mappings }).into_response(),
        Err(e) => {
            tracing::error!("mapping reload failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

/// GET /api/history?limit=N, newest first.
pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);
    match state.history.recent(limit) {
        Ok(entries) => Json::<Vec<HistoryEntry>>(entries).into_response(),
        Err(e) => {
            tracing::error!("history read failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}
