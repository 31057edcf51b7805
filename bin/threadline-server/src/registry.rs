//! Thread registry: the listed-thread set and its title cache.
//!
//! The registry derives the known-thread list from the checkpoint store
//! once at startup and keeps titles in memory for the process lifetime.
//! Titles are labels, never state: wiping the cache and re-deriving
//! from stored messages yields the same values, so nothing here is
//! persisted. Ordering is discovery order, store order at bootstrap
//! followed by registration order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::entities::{CheckpointStore, SqliteStore};
use crate::title;

/// One listed thread, as shown in a thread picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub title: String,
}

struct RegistryInner {
    /// Listed ids in discovery order.
    order: Vec<String>,
    titles: HashMap<String, String>,
}

/// In-memory view of which threads exist and what to call them.
pub struct ThreadRegistry {
    store: Arc<SqliteStore>,
    inner: Mutex<RegistryInner>,
}

impl ThreadRegistry {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self {
            store,
            inner: Mutex::new(RegistryInner {
                order: Vec::new(),
                titles: HashMap::new(),
            }),
        }
    }

    /// Discover every stored thread and derive its title.
    ///
    /// Called once at startup, before the first request is served.
    pub async fn bootstrap(&self) -> Result<(), sqlx::Error> {
        let ids = self.store.list_thread_ids().await?;
        let mut titled = Vec::with_capacity(ids.len());
        for id in ids {
            let title = match self.store.get_state(&id).await? {
                Some(state) => title::derive_title(&state.messages),
                None => title::DEFAULT_TITLE.to_owned(),
            };
            titled.push((id, title));
        }

        let mut listed = 0;
        if let Ok(mut inner) = self.inner.lock() {
            for (id, title) in titled {
                if !inner.order.iter().any(|known| *known == id) {
                    inner.order.push(id.clone());
                }
                inner.titles.insert(id, title);
            }
            listed = inner.order.len();
        }
        info!(threads = listed, "thread registry bootstrapped");
        Ok(())
    }

    /// All listed threads in discovery order.
    pub fn list_threads(&self) -> Vec<ThreadSummary> {
        match self.inner.lock() {
            Ok(inner) => inner
                .order
                .iter()
                .map(|id| ThreadSummary {
                    thread_id: id.clone(),
                    title: inner
                        .titles
                        .get(id)
                        .cloned()
                        .unwrap_or_else(|| title::DEFAULT_TITLE.to_owned()),
                })
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Whether `thread_id` is listed.
    pub fn contains(&self, thread_id: &str) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.order.iter().any(|id| id == thread_id))
            .unwrap_or(false)
    }

    /// Title for `thread_id`, deriving from stored messages and caching
    /// on a miss. Never fails: unknown ids and storage errors only cost
    /// the label.
    pub async fn title_for(&self, thread_id: &str) -> String {
        if let Ok(inner) = self.inner.lock() {
            if let Some(title) = inner.titles.get(thread_id) {
                return title.clone();
            }
        }

        let title = match self.store.get_state(thread_id).await {
            Ok(Some(state)) => title::derive_title(&state.messages),
            Ok(None) => title::DEFAULT_TITLE.to_owned(),
            Err(e) => {
                warn!(thread_id, error = %e, "failed to load state for title; using default");
                return title::DEFAULT_TITLE.to_owned();
            }
        };
        if let Ok(mut inner) = self.inner.lock() {
            inner
                .titles
                .entry(thread_id.to_owned())
                .or_insert_with(|| title.clone());
        }
        title
    }

    /// List `thread_id` with the provisional title, if not yet listed.
    pub fn register(&self, thread_id: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            if !inner.order.iter().any(|id| id == thread_id) {
                inner.order.push(thread_id.to_owned());
            }
            inner
                .titles
                .entry(thread_id.to_owned())
                .or_insert_with(|| title::DEFAULT_TITLE.to_owned());
        }
    }

    /// Set the title from raw message text, listing the thread first if
    /// needed. Used on the first user message of a thread, where the
    /// text is already at hand and a store read would be wasted.
    pub fn set_title(&self, thread_id: &str, text: &str) {
        let derived = title::title_from_text(text);
        if let Ok(mut inner) = self.inner.lock() {
            if !inner.order.iter().any(|id| id == thread_id) {
                inner.order.push(thread_id.to_owned());
            }
            inner.titles.insert(thread_id.to_owned(), derived);
        }
    }
}

impl std::fmt::Debug for ThreadRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listed = self.inner.lock().map(|inner| inner.order.len()).unwrap_or(0);
        f.debug_struct("ThreadRegistry")
            .field("listed", &listed)
            .finish()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::entities::NewMessage;

    async fn store_with_threads(threads: &[(&str, &str)]) -> Arc<SqliteStore> {
        let store = Arc::new(SqliteStore::connect("sqlite://:memory:").await.unwrap());
        for (id, first_message) in threads {
            store
                .append(id, vec![NewMessage::user(*first_message)])
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn bootstrap_lists_stored_threads_in_order_with_derived_titles() {
        let store = store_with_threads(&[
            ("alpha", "First question about lifetimes"),
            ("beta", "Second thread"),
        ])
        .await;
        let registry = ThreadRegistry::new(store);
        registry.bootstrap().await.unwrap();

        let threads = registry.list_threads();
        assert_eq!(
            threads,
            vec![
                ThreadSummary {
                    thread_id: "alpha".into(),
                    title: "First question about lifetimes".into(),
                },
                ThreadSummary {
                    thread_id: "beta".into(),
                    title: "Second thread".into(),
                },
            ]
        );
        assert!(registry.contains("alpha"));
        assert!(!registry.contains("gamma"));
    }

    #[tokio::test]
    async fn bootstrap_of_an_empty_store_lists_nothing() {
        let store = store_with_threads(&[]).await;
        let registry = ThreadRegistry::new(store);
        registry.bootstrap().await.unwrap();
        assert!(registry.list_threads().is_empty());
    }

    #[tokio::test]
    async fn registered_threads_follow_bootstrapped_ones() {
        let store = store_with_threads(&[("alpha", "Stored thread")]).await;
        let registry = ThreadRegistry::new(Arc::clone(&store));
        registry.bootstrap().await.unwrap();

        registry.register("fresh");
        let threads = registry.list_threads();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].thread_id, "alpha");
        assert_eq!(threads[1].thread_id, "fresh");
        assert_eq!(threads[1].title, title::DEFAULT_TITLE);
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let store = store_with_threads(&[]).await;
        let registry = ThreadRegistry::new(store);

        registry.register("t1");
        registry.register("t1");
        assert_eq!(registry.list_threads().len(), 1);
    }

    #[tokio::test]
    async fn set_title_overrides_the_provisional_title() {
        let store = store_with_threads(&[]).await;
        let registry = ThreadRegistry::new(store);

        registry.register("t1");
        registry.set_title("t1", "How do I rename a git branch?");
        assert_eq!(
            registry.list_threads()[0].title,
            "How do I rename a git branch?"
        );
    }

    #[tokio::test]
    async fn title_lookup_derives_from_the_store_on_a_cache_miss() {
        let store = store_with_threads(&[("alpha", "Tell me about borrowing")]).await;
        let registry = ThreadRegistry::new(store);

        // No bootstrap: the first lookup has to hit the store.
        assert_eq!(registry.title_for("alpha").await, "Tell me about borrowing");
    }

    #[tokio::test]
    async fn cached_titles_win_over_stored_state() {
        let store = store_with_threads(&[("alpha", "Stored text")]).await;
        let registry = ThreadRegistry::new(store);
        registry.bootstrap().await.unwrap();

        registry.set_title("alpha", "Overridden");
        assert_eq!(registry.title_for("alpha").await, "Overridden");
    }

    #[tokio::test]
    async fn unknown_threads_get_the_default_title() {
        let store = store_with_threads(&[]).await;
        let registry = ThreadRegistry::new(store);
        assert_eq!(registry.title_for("nowhere").await, title::DEFAULT_TITLE);
        assert!(!registry.contains("nowhere"));
    }
}
