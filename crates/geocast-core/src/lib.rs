//! # geocast-core
//!
//! Shared vocabulary for the geocast crates:
//!
//! - **Position types**: [`PositionReport`] as received from clients and
//!   [`StoredPosition`] as persisted by the store
//! - **Branded IDs**: [`RecordId`] and [`ConnectionId`] newtypes (UUID v7)
//! - **Protocol constants**: the broadcast topic and inbound destinations
//! - **Logging**: `tracing` subscriber setup and an in-memory capture layer
//!   for tests

#![deny(unsafe_code)]

pub mod constants;
pub mod ids;
pub mod logging;
pub mod position;

pub use ids::{ConnectionId, RecordId};
pub use position::{PositionReport, StoredPosition};
