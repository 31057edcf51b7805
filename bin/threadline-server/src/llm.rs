//! Model invocation boundary.
//!
//! [`ModelClient`] is the seam between the conversation pipeline and the
//! remote language model: ordered messages in, one assistant reply out,
//! either whole or as a stream of content fragments whose concatenation
//! forms the reply. The production implementation [`GenaiClient`]
//! delegates to [`genai::Client`], so any provider genai supports works
//! unchanged; credentials come from the provider's usual environment
//! variables (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, …).

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use genai::chat::{ChatMessage, ChatRequest, ChatStreamEvent};
use thiserror::Error;

use crate::entities::{Role, ThreadMessage};

/// Errors from the model boundary.
///
/// An empty completion is a valid response (`Ok("")`), never an error;
/// this type only covers call failures and mid-stream transport faults.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model provider error: {0}")]
    Provider(#[from] genai::Error),
}

/// Boxed stream of content fragments for one assistant reply.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, ModelError>> + Send>>;

/// Abstraction over the remote chat model.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Run one whole-response completion over the full ordered history.
    async fn complete(&self, messages: &[ThreadMessage]) -> Result<String, ModelError>;

    /// Run one streaming completion. Fragments arrive in order and the
    /// stream ends after the last one; it can only be restarted by
    /// invoking again.
    async fn complete_stream(&self, messages: &[ThreadMessage])
    -> Result<TokenStream, ModelError>;
}

/// Production model client backed by [`genai::Client`].
pub struct GenaiClient {
    client: genai::Client,
    model: String,
}

impl GenaiClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: genai::Client::default(),
            model: model.into(),
        }
    }
}

impl std::fmt::Debug for GenaiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenaiClient")
            .field("model", &self.model)
            .finish()
    }
}

/// Convert the thread history into a provider chat request, in order.
fn chat_request(messages: &[ThreadMessage]) -> ChatRequest {
    let converted = messages
        .iter()
        .map(|m| match m.role {
            Role::User => ChatMessage::user(m.content.clone()),
            Role::Assistant => ChatMessage::assistant(m.content.clone()),
        })
        .collect();
    ChatRequest::new(converted)
}

#[async_trait]
impl ModelClient for GenaiClient {
    async fn complete(&self, messages: &[ThreadMessage]) -> Result<String, ModelError> {
        let resp = self
            .client
            .exec_chat(&self.model, chat_request(messages), None)
            .await?;
        Ok(resp.first_text().map(str::to_owned).unwrap_or_default())
    }

    async fn complete_stream(
        &self,
        messages: &[ThreadMessage],
    ) -> Result<TokenStream, ModelError> {
        let resp = self
            .client
            .exec_chat_stream(&self.model, chat_request(messages), None)
            .await?;
        let fragments = resp.stream.filter_map(|event| async move {
            match event {
                Ok(ChatStreamEvent::Chunk(chunk)) => Some(Ok(chunk.content)),
                // Start / reasoning / tool-call events carry no reply text.
                Ok(_) => None,
                Err(e) => Some(Err(ModelError::from(e))),
            }
        });
        Ok(Box::pin(fragments))
    }
}

// ── Test support ───────────────────────────────────────────────────────────────


// ── Tests ──────────────────────────────────────────────────────────────────────
