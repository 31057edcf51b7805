use chrono::{DateTime, Utc};

/// Author of one message. Persisted as its lowercase string form; the
/// schema carries a matching CHECK constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single row in the `thread_messages` table.
///
/// Rows are immutable once written: a thread's sequence only grows, and
/// `seq` fixes the order.
#[derive(Debug, Clone)]
pub struct ThreadMessage {
    pub id: String,
    pub thread_id: String,
    /// 0-based dense position within the thread.
    pub seq: i64,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A message to append. The store assigns id, `seq` and timestamp at
/// write time.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
}

impl NewMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Latest cumulative state of one thread: the full replayed message
/// sequence plus checkpoint bookkeeping.
#[derive(Debug, Clone)]
pub struct ThreadState {
    pub thread_id: String,
    pub messages: Vec<ThreadMessage>,
    /// Checkpoint count; increments once per append.
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}
