//! Loss-tolerant transform channel

pub mod endpoint;
pub mod listener;

pub use listener::run_listener;
