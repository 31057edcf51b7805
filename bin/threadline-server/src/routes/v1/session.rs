//! Active-session routes.
//!
//! The service keeps exactly one active thread at a time, mirroring a
//! single chat window: `GET /v1/session` shows it, `POST /v1/session/new`
//! swaps in a fresh unlisted thread, `POST /v1/session/select` switches
//! to a listed one, and `POST /v1/session/messages` runs a turn on it,
//! streamed over SSE when `stream: true`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::json;
use tracing::{debug, error, info};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::pipeline::{PipelineError, TurnEvent};
use crate::schemas::v1::session::{
    MessageResponse, SelectThreadRequest, SessionResponse, SubmitRequest, SubmitResponse,
};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(get_session, new_chat, select_thread, submit_message),
    components(schemas(
        SubmitRequest,
        SubmitResponse,
        SelectThreadRequest,
        SessionResponse,
        MessageResponse
    ))
)]
pub struct SessionApi;

/// Register active-session routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/session", get(get_session))
        .route("/session/new", post(new_chat))
        .route("/session/select", post(select_thread))
        .route("/session/messages", post(submit_message))
}

// ── Session handlers ──────────────────────────────────────────────────────────

/// Current session snapshot (`GET /v1/session`).
#[utoipa::path(
    get,
    path = "/v1/session",
    tag = "session",
    responses(
        (status = 200, description = "Active session", body = SessionResponse),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionResponse>, ServerError> {
    let view = state.session.snapshot().await;
    let title = state.registry.title_for(&view.thread_id).await;
    Ok(Json(view.to_response(title)))
}

/// Start a new chat (`POST /v1/session/new`).
///
/// The fresh thread stays out of the thread list until its first message.
#[utoipa::path(
    post,
    path = "/v1/session/new",
    tag = "session",
    responses(
        (status = 200, description = "Fresh session", body = SessionResponse),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn new_chat(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionResponse>, ServerError> {
    let view = state.session.new_chat().await;
    let title = state.registry.title_for(&view.thread_id).await;
    Ok(Json(view.to_response(title)))
}

/// Switch the active session to a listed thread (`POST /v1/session/select`).
#[utoipa::path(
    post,
    path = "/v1/session/select",
    tag = "session",
    request_body = SelectThreadRequest,
    responses(
        (status = 200, description = "Thread selected", body = SessionResponse),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Unknown thread"),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn select_thread(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SelectThreadRequest>,
) -> Result<Json<SessionResponse>, ServerError> {
    if req.thread_id.trim().is_empty() {
        return Err(ServerError::BadRequest("thread_id must not be empty".into()));
    }
    let view = state.session.select_thread(&req.thread_id).await?;
    let title = state.registry.title_for(&view.thread_id).await;
    Ok(Json(view.to_response(title)))
}

/// Submit a user message on the active thread (`POST /v1/session/messages`).
///
/// When `stream: true`, the reply is streamed as SSE events: one
/// `{"delta": token}` per fragment, then `{"done": true, "content": full}`
/// once the turn is persisted, or `{"error": msg}` if it breaks off. The
/// user message is appended before the model is invoked, so it survives a
/// failed turn either way.
#[utoipa::path(
    post,
    path = "/v1/session/messages",
    tag = "session",
    request_body = SubmitRequest,
    responses(
        (status = 200, description = "Assistant reply (JSON or SSE)", body = SubmitResponse),
        (status = 502, description = "Model invocation failed"),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn submit_message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitRequest>,
) -> Result<Response, ServerError> {
    debug!(text_len = req.text.len(), stream = req.stream, "message submitted");

    if req.stream {
        let turn = state.session.submit_stream(req.text).await?;
        let sse_stream = turn.map(|event| {
            let data = match event {
                Ok(TurnEvent::Delta(token)) => json!({ "delta": token }).to_string(),
                Ok(TurnEvent::Completed(message)) => {
                    json!({ "done": true, "content": message.content }).to_string()
                }
                Err(e) => {
                    error!(error = %e, "streaming turn failed");
                    let message = match &e {
                        PipelineError::Storage(_) => {
                            "storage error; your message may not have been saved"
                        }
                        PipelineError::Model(_) => {
                            "the model call failed; your message was saved but no reply was generated"
                        }
                    };
                    json!({ "error": message }).to_string()
                }
            };
            Ok::<Event, Infallible>(Event::default().data(data))
        });
        return Ok(Sse::new(sse_stream).into_response());
    }

    let reply = state.session.submit(&req.text).await?;
    let title = state.registry.title_for(&reply.thread_id).await;
    info!(thread_id = %reply.thread_id, reply_len = reply.content.len(), "turn completed");
    Ok(Json(SubmitResponse {
        thread_id: reply.thread_id.clone(),
        title,
        reply: reply.to_response(),
    })
    .into_response())
}

// ── Tests ──────────────────────────────────────────────────────────────────────
