pub mod session;
pub mod threads;
