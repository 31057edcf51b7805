//! Session API v1 request / response types.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::ThreadMessage;
use crate::session::SessionView;

/// A single persisted message.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub id: String,
    pub thread_id: String,
    /// Position within the thread, starting at 0.
    pub seq: i64,
    /// The message author (`"user"` or `"assistant"`).
    pub role: String,
    pub content: String,
    pub created_at: String,
}

/// Request body for `POST /v1/session/messages`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitRequest {
    /// The user message text.
    pub text: String,
    /// When `true`, the reply is streamed fragment-by-fragment using SSE.
    #[serde(default)]
    pub stream: bool,
}

/// Request body for `POST /v1/session/select`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SelectThreadRequest {
    pub thread_id: String,
}

/// Response body for `GET /v1/session` and the session mutations.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub thread_id: String,
    /// Title shown for this thread; `"New chat"` until the first message.
    pub title: String,
    /// Whether the thread appears in the thread list yet.
    pub listed: bool,
    /// Full message history of the active thread, oldest first.
    pub messages: Vec<MessageResponse>,
}

/// Response body for a non-streaming `POST /v1/session/messages`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitResponse {
    pub thread_id: String,
    /// Thread title after the submit; the first message sets it.
    pub title: String,
    /// The assistant reply, as persisted.
    pub reply: MessageResponse,
}

impl ThreadMessage {
    pub fn to_response(&self) -> MessageResponse {
        MessageResponse {
            id: self.id.clone(),
            thread_id: self.thread_id.clone(),
            seq: self.seq,
            role: self.role.to_string(),
            content: self.content.clone(),
            created_at: self.created_at.to_rfc3339(),
        }
    }
}

impl SessionView {
    pub fn to_response(&self, title: String) -> SessionResponse {
        SessionResponse {
            thread_id: self.thread_id.clone(),
            title,
            listed: self.listed,
            messages: self.messages.iter().map(|m| m.to_response()).collect(),
        }
    }
}
