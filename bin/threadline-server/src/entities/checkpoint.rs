//! The checkpoint store contract and its SQLite implementation.
//!
//! A checkpoint is one successful [`CheckpointStore::append`]: the thread
//! index row is bumped and the new messages are inserted in the same
//! transaction, so readers either see the whole batch or none of it.
//! "Current state" is always the full replayed sequence; the latest write
//! wins and no delta merging is ever needed on the read side.

use std::future::Future;

use chrono::Utc;
use uuid::Uuid;

use crate::entities::dao::{NewMessage, Role, ThreadMessage, ThreadState};
use crate::entities::sqlite::SqliteStore;

/// Durable, append-capable storage keyed by thread id.
pub trait CheckpointStore: Send + Sync + 'static {
    /// Latest cumulative state for `thread_id`, or `None` for a thread
    /// with zero writes. Ids never written are not an error.
    fn get_state(
        &self,
        thread_id: &str,
    ) -> impl Future<Output = Result<Option<ThreadState>, sqlx::Error>> + Send;

    /// Atomically append `new_messages` in order as one checkpoint and
    /// return the updated full state. A `get_state` on the same store
    /// immediately after sees the appended messages.
    fn append(
        &self,
        thread_id: &str,
        new_messages: Vec<NewMessage>,
    ) -> impl Future<Output = Result<ThreadState, sqlx::Error>> + Send;

    /// Every distinct thread id ever written, in creation order.
    fn list_thread_ids(&self) -> impl Future<Output = Result<Vec<String>, sqlx::Error>> + Send;
}

impl CheckpointStore for SqliteStore {
    async fn get_state(&self, thread_id: &str) -> Result<Option<ThreadState>, sqlx::Error> {
        let thread: Option<(i64, String)> =
            sqlx::query_as("SELECT checkpoint_version, updated_at FROM threads WHERE id = ?1")
                .bind(thread_id)
                .fetch_optional(&self.pool)
                .await?;

        let (version, updated_at) = match thread {
            Some(row) => row,
            None => return Ok(None),
        };

        let rows: Vec<(String, String, i64, String, String, String)> = sqlx::query_as(
            "SELECT id, thread_id, seq, role, content, created_at \
             FROM thread_messages WHERE thread_id = ?1 ORDER BY seq ASC",
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;

        let messages = rows
            .into_iter()
            .map(|(id, thread_id, seq, role, content, created_at)| ThreadMessage {
                id,
                thread_id,
                seq,
                role: role.parse().unwrap_or_else(|e: strum::ParseError| {
                    tracing::warn!(raw = %role, error = %e, "unknown message role; treating as user");
                    Role::User
                }),
                content,
                created_at: created_at.parse().unwrap_or_else(|e: chrono::ParseError| {
                    tracing::warn!(raw = %created_at, error = %e, "failed to parse message created_at; using now");
                    Utc::now()
                }),
            })
            .collect();

        Ok(Some(ThreadState {
            thread_id: thread_id.to_owned(),
            messages,
            version,
            updated_at: updated_at.parse().unwrap_or_else(|e: chrono::ParseError| {
                tracing::warn!(raw = %updated_at, error = %e, "failed to parse thread updated_at; using now");
                Utc::now()
            }),
        }))
    }

    async fn append(
        &self,
        thread_id: &str,
        new_messages: Vec<NewMessage>,
    ) -> Result<ThreadState, sqlx::Error> {
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        // Creates the index row on first write, bumps the checkpoint
        // version on every later one.
        sqlx::query(
            "INSERT INTO threads (id, checkpoint_version, created_at, updated_at) \
             VALUES (?1, 1, ?2, ?2) \
             ON CONFLICT(id) DO UPDATE SET \
                 checkpoint_version = checkpoint_version + 1, updated_at = ?2",
        )
        .bind(thread_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let (next_seq,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(seq) + 1, 0) FROM thread_messages WHERE thread_id = ?1",
        )
        .bind(thread_id)
        .fetch_one(&mut *tx)
        .await?;

        for (offset, msg) in new_messages.into_iter().enumerate() {
            sqlx::query(
                "INSERT INTO thread_messages (id, thread_id, seq, role, content, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(thread_id)
            .bind(next_seq + offset as i64)
            .bind(msg.role.to_string())
            .bind(&msg.content)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        // Re-read after commit so the caller gets exactly what a
        // subsequent get_state would return.
        match self.get_state(thread_id).await? {
            Some(state) => Ok(state),
            None => Err(sqlx::Error::RowNotFound),
        }
    }

    async fn list_thread_ids(&self) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT id FROM threads ORDER BY created_at ASC, id ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
