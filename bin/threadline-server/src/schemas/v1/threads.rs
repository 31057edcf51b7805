//! Thread listing API v1 response types.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::registry::ThreadSummary;
use crate::schemas::v1::session::MessageResponse;

/// One entry in the thread list.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ThreadSummaryResponse {
    pub thread_id: String,
    /// Derived from the first user message; `"New chat"` otherwise.
    pub title: String,
}

/// Response body for `GET /v1/threads/{thread_id}/messages`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ThreadMessagesResponse {
    pub thread_id: String,
    pub title: String,
    /// Full message history, oldest first.
    pub messages: Vec<MessageResponse>,
}

impl ThreadSummary {
    pub fn to_response(&self) -> ThreadSummaryResponse {
        ThreadSummaryResponse {
            thread_id: self.thread_id.clone(),
            title: self.title.clone(),
        }
    }
}
