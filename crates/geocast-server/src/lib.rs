//! # geocast-server
//!
//! Realtime location fan-out over STOMP/WebSocket.
//!
//! - `realtime`: session registry, inbound events and the dispatcher that
//!   persists positions before publishing them to `/topic/locations`
//! - `stomp`: the STOMP 1.2 frame codec
//! - `websocket`: connection state, topic broker, frame handling, session loop
//! - `api`: development admin routes over the location store
//! - HTTP: `/health`, `/metrics`, CORS, graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod health;
pub mod metrics;
pub mod realtime;
pub mod server;
pub mod shutdown;
pub mod stomp;
pub mod websocket;
