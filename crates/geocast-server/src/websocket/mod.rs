//! WebSocket transport: per-connection state, topic fan-out, STOMP frame
//! handling and the session loop.

pub mod broadcast;
pub mod connection;
pub mod handler;
pub mod session;
