//! Thread listing and history routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::entities::CheckpointStore;
use crate::error::ServerError;
use crate::schemas::v1::threads::{ThreadMessagesResponse, ThreadSummaryResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(list_threads, thread_messages),
    components(schemas(ThreadSummaryResponse, ThreadMessagesResponse))
)]
pub struct ThreadsApi;

/// Register thread routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/threads", get(list_threads))
        .route("/threads/{thread_id}/messages", get(thread_messages))
}

// ── Thread handlers ───────────────────────────────────────────────────────────

/// All listed threads (`GET /v1/threads`), newest first.
#[utoipa::path(
    get,
    path = "/v1/threads",
    tag = "threads",
    responses(
        (status = 200, description = "Thread list", body = Vec<ThreadSummaryResponse>),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn list_threads(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ThreadSummaryResponse>>, ServerError> {
    // The registry keeps stable discovery order; clients want the most
    // recently started thread on top.
    let mut threads = state.registry.list_threads();
    threads.reverse();
    Ok(Json(threads.iter().map(|t| t.to_response()).collect()))
}

/// Persisted history of one thread (`GET /v1/threads/{thread_id}/messages`).
#[utoipa::path(
    get,
    path = "/v1/threads/{thread_id}/messages",
    tag = "threads",
    responses(
        (status = 200, description = "Thread history", body = ThreadMessagesResponse),
        (status = 404, description = "Unknown thread"),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn thread_messages(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> Result<Json<ThreadMessagesResponse>, ServerError> {
    let Some(thread_state) = state.store.get_state(&thread_id).await? else {
        return Err(ServerError::NotFound(format!("unknown thread: {thread_id}")));
    };
    let title = state.registry.title_for(&thread_id).await;
    Ok(Json(ThreadMessagesResponse {
        thread_id,
        title,
        messages: thread_state
            .messages
            .iter()
            .map(|m| m.to_response())
            .collect(),
    }))
}

// ── Tests ──────────────────────────────────────────────────────────────────────
