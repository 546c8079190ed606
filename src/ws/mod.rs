//! Reliable channel: WebSocket sessions and the JSON wire protocol

pub mod decode;
pub mod handler;
pub mod outbound;
pub mod protocol;
