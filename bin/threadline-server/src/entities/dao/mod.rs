pub mod thread;

pub use thread::{NewMessage, Role, ThreadMessage, ThreadState};
