//! Conversation pipeline: the fixed step sequence of one turn.
//!
//! A turn appends the user message first, invokes the model over the
//! full ordered history, then appends the assistant reply. In streaming
//! mode fragments are forwarded as they arrive but the store is only
//! written once the whole reply has been assembled, so a checkpoint
//! never contains a half-finished message. Streaming changes the
//! observable timeline, not the durability boundary.

use std::sync::Arc;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::entities::{CheckpointStore, NewMessage, SqliteStore, ThreadMessage};
use crate::llm::{ModelClient, ModelError};

/// Failures of one pipeline turn.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Persistence failure. The caller must assume the message may not
    /// have been saved.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Model call failure or abnormal stream termination. The user
    /// message is already durable when this surfaces.
    #[error("model invocation failed: {0}")]
    Model(#[from] ModelError),
}

/// Events emitted over the course of one streaming turn.
#[derive(Debug)]
pub enum TurnEvent {
    /// One reply fragment, in arrival order.
    Delta(String),
    /// The turn is durable: the assembled assistant message as persisted.
    Completed(ThreadMessage),
}

/// Runs turns against one thread: checkpointed state plus a user
/// message in, a persisted assistant message out.
pub struct ChatPipeline {
    store: Arc<SqliteStore>,
    model: Arc<dyn ModelClient>,
}

impl ChatPipeline {
    pub fn new(store: Arc<SqliteStore>, model: Arc<dyn ModelClient>) -> Self {
        Self { store, model }
    }

    /// Run one whole-response turn.
    pub async fn run(&self, thread_id: &str, text: &str) -> Result<ThreadMessage, PipelineError> {
        let state = self
            .store
            .append(thread_id, vec![NewMessage::user(text)])
            .await?;
        debug!(
            thread_id,
            history = state.messages.len(),
            "user message persisted"
        );

        let reply = self.model.complete(&state.messages).await?;

        let mut state = self
            .store
            .append(thread_id, vec![NewMessage::assistant(reply)])
            .await?;
        match state.messages.pop() {
            Some(message) => Ok(message),
            None => Err(PipelineError::Storage(sqlx::Error::RowNotFound)),
        }
    }

    /// Run one streaming turn.
    ///
    /// The returned stream yields `Delta` events followed by a single
    /// `Completed`, or an error in place of `Completed` if the model
    /// stream breaks off. A spawned driver owns assembly and
    /// persistence, so the assistant message still reaches the store
    /// when the receiver is dropped mid-turn.
    pub async fn run_stream(
        &self,
        thread_id: &str,
        text: &str,
    ) -> Result<ReceiverStream<Result<TurnEvent, PipelineError>>, PipelineError> {
        let state = self
            .store
            .append(thread_id, vec![NewMessage::user(text)])
            .await?;
        debug!(
            thread_id,
            history = state.messages.len(),
            "user message persisted"
        );

        let mut fragments = self.model.complete_stream(&state.messages).await?;

        let (tx, rx) = mpsc::channel(32);
        let store = Arc::clone(&self.store);
        let thread_id = thread_id.to_owned();

        tokio::spawn(async move {
            let mut assembled = String::new();
            while let Some(item) = fragments.next().await {
                match item {
                    Ok(fragment) => {
                        assembled.push_str(&fragment);
                        // The receiver may already be gone; keep
                        // consuming so the turn still reaches the store.
                        let _ = tx.send(Ok(TurnEvent::Delta(fragment))).await;
                    }
                    Err(e) => {
                        warn!(thread_id = %thread_id, error = %e, "model stream failed mid-turn");
                        let _ = tx.send(Err(PipelineError::Model(e))).await;
                        return;
                    }
                }
            }

            match store
                .append(&thread_id, vec![NewMessage::assistant(assembled)])
                .await
            {
                Ok(mut state) => {
                    if let Some(message) = state.messages.pop() {
                        let _ = tx.send(Ok(TurnEvent::Completed(message))).await;
                    }
                }
                Err(e) => {
                    warn!(thread_id = %thread_id, error = %e, "failed to persist assistant reply");
                    let _ = tx.send(Err(PipelineError::Storage(e))).await;
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::entities::Role;
    use crate::llm::testing::{MockModel, MockTurn};
    use std::time::Duration;

    async fn fixture(turns: Vec<MockTurn>) -> (ChatPipeline, Arc<SqliteStore>, Arc<MockModel>) {
        let store = Arc::new(SqliteStore::connect("sqlite://:memory:").await.unwrap());
        let model = MockModel::scripted(turns);
        let pipeline = ChatPipeline::new(Arc::clone(&store), model.clone());
        (pipeline, store, model)
    }

    #[tokio::test]
    async fn turn_persists_user_then_assistant() {
        let (pipeline, store, _) = fixture(vec![MockTurn::Reply("hi from the model")]).await;

        let reply = pipeline.run("t1", "hello").await.unwrap();
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, "hi from the model");

        let state = store.get_state("t1").await.unwrap().expect("state");
        assert_eq!(state.version, 2);
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].role, Role::User);
        assert_eq!(state.messages[0].content, "hello");
        assert_eq!(state.messages[1].content, "hi from the model");
    }

    #[tokio::test]
    async fn model_sees_the_full_ordered_history() {
        let (pipeline, _, model) =
            fixture(vec![MockTurn::Reply("first"), MockTurn::Reply("second")]).await;

        pipeline.run("t1", "one").await.unwrap();
        pipeline.run("t1", "two").await.unwrap();

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[1],
            vec![
                (Role::User, "one".to_string()),
                (Role::Assistant, "first".to_string()),
                (Role::User, "two".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn failed_model_call_leaves_the_user_message_durable() {
        let (pipeline, store, _) = fixture(vec![MockTurn::Fail]).await;

        let err = pipeline.run("t1", "hello").await.unwrap_err();
        assert!(matches!(err, PipelineError::Model(_)));

        let state = store.get_state("t1").await.unwrap().expect("state");
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn streaming_turn_assembles_fragments_before_persisting() {
        let (pipeline, store, _) =
            fixture(vec![MockTurn::Fragments(vec!["Hel", "lo ", "world"])]).await;

        let mut turn = pipeline.run_stream("t1", "hi").await.unwrap();
        let mut deltas = Vec::new();
        let mut completed = None;
        while let Some(event) = turn.next().await {
            match event.unwrap() {
                TurnEvent::Delta(d) => deltas.push(d),
                TurnEvent::Completed(m) => completed = Some(m),
            }
        }

        assert_eq!(deltas, ["Hel", "lo ", "world"]);
        let completed = completed.expect("completed event");
        assert_eq!(completed.role, Role::Assistant);
        assert_eq!(completed.content, "Hello world");

        // One assistant row, not one per fragment.
        let state = store.get_state("t1").await.unwrap().expect("state");
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[1].content, "Hello world");
        assert_eq!(state.version, 2);
    }

    #[tokio::test]
    async fn broken_stream_persists_no_assistant_message() {
        let (pipeline, store, _) =
            fixture(vec![MockTurn::FragmentsThenError(vec!["par", "tial"])]).await;

        let mut turn = pipeline.run_stream("t1", "hi").await.unwrap();
        let mut deltas = Vec::new();
        let mut failure = None;
        while let Some(event) = turn.next().await {
            match event {
                Ok(TurnEvent::Delta(d)) => deltas.push(d),
                Ok(TurnEvent::Completed(_)) => panic!("broken stream must not complete"),
                Err(e) => failure = Some(e),
            }
        }

        assert_eq!(deltas, ["par", "tial"]);
        assert!(matches!(failure, Some(PipelineError::Model(_))));

        let state = store.get_state("t1").await.unwrap().expect("state");
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_lose_the_turn() {
        let (pipeline, store, _) =
            fixture(vec![MockTurn::Fragments(vec!["still ", "saved"])]).await;

        let turn = pipeline.run_stream("t1", "hi").await.unwrap();
        drop(turn);

        // The driver finishes on its own; wait for the append to land.
        for _ in 0..100 {
            if let Some(state) = store.get_state("t1").await.unwrap() {
                if state.messages.len() == 2 {
                    assert_eq!(state.messages[1].content, "still saved");
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("assistant reply was never persisted");
    }
}
