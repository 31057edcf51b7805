//! Persistence layer.
//!
//! [`CheckpointStore`] defines the interface for durable thread state.
//! The default implementation is [`sqlite::SqliteStore`]. To swap to
//! another database (Postgres, MySQL, …), implement [`CheckpointStore`]
//! for your new type and change the concrete type in
//! [`crate::state::AppState`].
//!
//! All trait methods use `impl Future` in their signatures (stable since
//! Rust 1.75) so no extra `async-trait` crate is required here.

pub mod checkpoint;
pub mod dao;
pub mod sqlite;

pub use checkpoint::CheckpointStore;
pub use dao::{NewMessage, Role, ThreadMessage, ThreadState};
pub use sqlite::SqliteStore;
