//! # geocast-store
//!
//! Append-only position store with a `SQLite` backend.
//!
//! - **[`LocationStore`]**: the contract the realtime dispatcher depends on
//!   (`save`, `find_latest_by_client`) plus the administrative helpers
//! - **[`SqliteLocationStore`]**: pooled `rusqlite` implementation
//! - **`SQLite` backend**: connection pool, migrations, stateless repository
//!
//! Records are never updated in place. "Most recent" is decided by the
//! insertion sequence, never by scan order.

#![deny(unsafe_code)]

pub mod errors;
pub mod sqlite;
pub mod store;

pub use errors::{Result, StoreError};
pub use sqlite::{ConnectionConfig, ConnectionPool, new_file, new_in_memory, run_migrations};
pub use store::{LocationStore, SqliteLocationStore};
