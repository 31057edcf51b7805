//! Session controller: the single active-thread pointer.
//!
//! The controller owns which thread is current, its in-memory message
//! view, and the listed/unlisted distinction: a brand-new thread stays
//! out of the registry until its first user message is submitted. One
//! turn is fully processed before the next is accepted; the session
//! mutex enforces that, and the streaming path moves the owned guard
//! into its driver task so the session stays held until the turn ends.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::{CheckpointStore, SqliteStore, ThreadMessage};
use crate::error::ServerError;
use crate::pipeline::{ChatPipeline, PipelineError, TurnEvent};
use crate::registry::ThreadRegistry;

/// Point-in-time copy of the active session, for rendering.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub thread_id: String,
    /// Whether the thread is in the registry, i.e. has received at
    /// least one user message.
    pub listed: bool,
    pub messages: Vec<ThreadMessage>,
}

struct ActiveSession {
    thread_id: String,
    listed: bool,
    messages: Vec<ThreadMessage>,
}

impl ActiveSession {
    fn fresh() -> Self {
        Self {
            thread_id: Uuid::new_v4().to_string(),
            listed: false,
            messages: Vec::new(),
        }
    }

    fn view(&self) -> SessionView {
        SessionView {
            thread_id: self.thread_id.clone(),
            listed: self.listed,
            messages: self.messages.clone(),
        }
    }

    /// Reload the message view from the store. The store is the source
    /// of truth either way, so a failed read only costs freshness.
    async fn refresh(&mut self, store: &SqliteStore) {
        match store.get_state(&self.thread_id).await {
            Ok(Some(state)) => self.messages = state.messages,
            Ok(None) => {}
            Err(e) => {
                warn!(thread_id = %self.thread_id, error = %e, "failed to refresh session view");
            }
        }
    }
}

/// Client-facing orchestration over one active thread at a time.
pub struct SessionController {
    store: Arc<SqliteStore>,
    registry: Arc<ThreadRegistry>,
    pipeline: ChatPipeline,
    active: Arc<Mutex<ActiveSession>>,
}

impl SessionController {
    /// Starts on a fresh, unlisted thread.
    pub fn new(
        store: Arc<SqliteStore>,
        registry: Arc<ThreadRegistry>,
        pipeline: ChatPipeline,
    ) -> Self {
        Self {
            store,
            registry,
            pipeline,
            active: Arc::new(Mutex::new(ActiveSession::fresh())),
        }
    }

    /// Snapshot of the active session.
    pub async fn snapshot(&self) -> SessionView {
        self.active.lock().await.view()
    }

    /// Swap in a brand-new thread. It stays out of the registry until
    /// its first submit, so abandoned empty chats never clutter the
    /// thread list.
    pub async fn new_chat(&self) -> SessionView {
        let mut session = self.active.lock().await;
        *session = ActiveSession::fresh();
        info!(thread_id = %session.thread_id, "new chat started");
        session.view()
    }

    /// Switch to a listed thread and reload its history from the store.
    pub async fn select_thread(&self, thread_id: &str) -> Result<SessionView, ServerError> {
        if !self.registry.contains(thread_id) {
            return Err(ServerError::NotFound(format!("unknown thread: {thread_id}")));
        }
        let mut session = self.active.lock().await;
        let messages = match self.store.get_state(thread_id).await? {
            Some(state) => state.messages,
            None => Vec::new(),
        };
        session.thread_id = thread_id.to_owned();
        session.listed = true;
        session.messages = messages;
        info!(thread_id, history = session.messages.len(), "thread selected");
        Ok(session.view())
    }

    /// On the first submit of a fresh thread: list it with a provisional
    /// title, then immediately derive the real one from the just-typed
    /// text. Happens before the turn runs, so the thread is findable
    /// even if the model call fails.
    fn list_if_first(&self, session: &mut ActiveSession, text: &str) {
        if !session.listed {
            self.registry.register(&session.thread_id);
            self.registry.set_title(&session.thread_id, text);
            session.listed = true;
        }
    }

    /// Submit one user message on the active thread and wait for the
    /// whole assistant reply.
    pub async fn submit(&self, text: &str) -> Result<ThreadMessage, ServerError> {
        let mut session = self.active.lock().await;
        self.list_if_first(&mut session, text);

        let result = self.pipeline.run(&session.thread_id, text).await;
        // The user message is durable even when the model call failed;
        // the view follows the store either way.
        session.refresh(&self.store).await;
        Ok(result?)
    }

    /// Submit one user message, streaming reply fragments as they
    /// arrive. The session lock travels with the returned stream's
    /// driver and is released once the turn is fully settled.
    pub async fn submit_stream(
        &self,
        text: String,
    ) -> Result<ReceiverStream<Result<TurnEvent, PipelineError>>, ServerError> {
        let mut session = Arc::clone(&self.active).lock_owned().await;
        self.list_if_first(&mut session, &text);

        let mut turn = match self.pipeline.run_stream(&session.thread_id, &text).await {
            Ok(turn) => turn,
            Err(e) => {
                session.refresh(&self.store).await;
                return Err(e.into());
            }
        };

        let (tx, rx) = mpsc::channel(32);
        let store = Arc::clone(&self.store);

        tokio::spawn(async move {
            while let Some(event) = turn.next().await {
                // A dropped receiver must not cut the turn short.
                let _ = tx.send(event).await;
            }
            session.refresh(&store).await;
            drop(session);
        });

        Ok(ReceiverStream::new(rx))
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController").finish()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::entities::Role;
    use crate::llm::testing::{MockModel, MockTurn};
    use crate::title;

    struct Harness {
        store: Arc<SqliteStore>,
        registry: Arc<ThreadRegistry>,
        controller: SessionController,
    }

    async fn harness(turns: Vec<MockTurn>) -> Harness {
        let store = Arc::new(SqliteStore::connect("sqlite://:memory:").await.unwrap());
        let registry = Arc::new(ThreadRegistry::new(Arc::clone(&store)));
        let model = MockModel::scripted(turns);
        let pipeline = ChatPipeline::new(Arc::clone(&store), model);
        let controller =
            SessionController::new(Arc::clone(&store), Arc::clone(&registry), pipeline);
        Harness {
            store,
            registry,
            controller,
        }
    }

    #[tokio::test]
    async fn a_fresh_session_is_unlisted_and_empty() {
        let h = harness(vec![]).await;
        let view = h.controller.snapshot().await;
        assert!(!view.thread_id.is_empty());
        assert!(!view.listed);
        assert!(view.messages.is_empty());
        assert!(h.registry.list_threads().is_empty());
    }

    #[tokio::test]
    async fn first_submit_lists_the_thread_with_the_derived_title() {
        let h = harness(vec![MockTurn::Reply("sure")]).await;
        let view = h.controller.snapshot().await;

        h.controller
            .submit("How do I rename a git branch?")
            .await
            .unwrap();

        let threads = h.registry.list_threads();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].thread_id, view.thread_id);
        assert_eq!(threads[0].title, "How do I rename a git branch?");
        assert!(h.controller.snapshot().await.listed);
    }

    #[tokio::test]
    async fn later_submits_do_not_change_the_title() {
        let h = harness(vec![MockTurn::Reply("one"), MockTurn::Reply("two")]).await;

        h.controller.submit("First message").await.unwrap();
        h.controller.submit("Completely different text").await.unwrap();

        assert_eq!(h.registry.list_threads()[0].title, "First message");
    }

    #[tokio::test]
    async fn submits_append_both_sides_to_the_view_in_order() {
        let h = harness(vec![MockTurn::Reply("a1"), MockTurn::Reply("a2")]).await;

        let reply = h.controller.submit("q1").await.unwrap();
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, "a1");
        h.controller.submit("q2").await.unwrap();

        let view = h.controller.snapshot().await;
        let contents: Vec<&str> = view.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["q1", "a1", "q2", "a2"]);
    }

    #[tokio::test]
    async fn new_chat_swaps_in_a_fresh_thread_and_keeps_the_old_one_listed() {
        let h = harness(vec![MockTurn::Reply("hi")]).await;
        h.controller.submit("keep me around").await.unwrap();
        let old = h.controller.snapshot().await;

        let fresh = h.controller.new_chat().await;
        assert_ne!(fresh.thread_id, old.thread_id);
        assert!(!fresh.listed);
        assert!(fresh.messages.is_empty());
        assert_eq!(h.registry.list_threads().len(), 1);
    }

    #[tokio::test]
    async fn select_thread_reloads_history_from_the_store() {
        let h = harness(vec![MockTurn::Reply("answer")]).await;
        h.controller.submit("question").await.unwrap();
        let old = h.controller.snapshot().await;

        h.controller.new_chat().await;
        let view = h.controller.select_thread(&old.thread_id).await.unwrap();

        assert_eq!(view.thread_id, old.thread_id);
        assert!(view.listed);
        let contents: Vec<&str> = view.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["question", "answer"]);
    }

    #[tokio::test]
    async fn selecting_an_unknown_thread_is_not_found() {
        let h = harness(vec![]).await;
        let err = h.controller.select_thread("no-such-thread").await.unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
    }

    #[tokio::test]
    async fn an_abandoned_fresh_thread_is_never_listed() {
        let h = harness(vec![MockTurn::Reply("hello")]).await;
        h.controller.new_chat().await;
        h.controller.new_chat().await;
        h.controller.submit("only this one counts").await.unwrap();
        assert_eq!(h.registry.list_threads().len(), 1);
    }

    #[tokio::test]
    async fn failed_turn_keeps_the_user_message_and_the_title() {
        let h = harness(vec![MockTurn::Fail]).await;
        let view = h.controller.snapshot().await;

        let err = h.controller.submit("doomed question").await.unwrap_err();
        assert!(matches!(err, ServerError::Model(_)));

        // The message was appended before the model call.
        let state = h.store.get_state(&view.thread_id).await.unwrap().unwrap();
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].content, "doomed question");

        // The thread is listed, titled, and still the active session.
        assert_eq!(h.registry.list_threads()[0].title, "doomed question");
        let after = h.controller.snapshot().await;
        assert_eq!(after.thread_id, view.thread_id);
        assert_eq!(after.messages.len(), 1);
    }

    #[tokio::test]
    async fn streaming_submit_settles_the_view_after_the_last_event() {
        let h = harness(vec![MockTurn::Fragments(vec!["str", "eamed"])]).await;

        let mut turn = h.controller.submit_stream("stream it".into()).await.unwrap();
        let mut deltas = Vec::new();
        let mut completed = None;
        while let Some(event) = turn.next().await {
            match event.unwrap() {
                TurnEvent::Delta(d) => deltas.push(d),
                TurnEvent::Completed(m) => completed = Some(m),
            }
        }
        assert_eq!(deltas, ["str", "eamed"]);
        assert_eq!(completed.expect("completed").content, "streamed");

        // snapshot() waits out the driver's session guard.
        let view = h.controller.snapshot().await;
        let contents: Vec<&str> = view.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["stream it", "streamed"]);
        assert_eq!(h.registry.list_threads()[0].title, "stream it");
    }

    #[tokio::test]
    async fn resume_shows_the_same_thread_after_a_fresh_start() {
        let h = harness(vec![MockTurn::Reply("the reply")]).await;
        h.controller.submit("a durable question").await.unwrap();
        let thread_id = h.controller.snapshot().await.thread_id;

        // Same store, new registry and controller: a process restart.
        let registry = Arc::new(ThreadRegistry::new(Arc::clone(&h.store)));
        registry.bootstrap().await.unwrap();
        let pipeline = ChatPipeline::new(Arc::clone(&h.store), MockModel::scripted(vec![]));
        let controller =
            SessionController::new(Arc::clone(&h.store), Arc::clone(&registry), pipeline);

        let threads = registry.list_threads();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].title, "a durable question");

        let view = controller.select_thread(&thread_id).await.unwrap();
        let contents: Vec<&str> = view.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["a durable question", "the reply"]);
    }

    #[tokio::test]
    async fn fresh_session_title_is_the_default() {
        let h = harness(vec![]).await;
        let view = h.controller.snapshot().await;
        assert_eq!(h.registry.title_for(&view.thread_id).await, title::DEFAULT_TITLE);
    }
}
