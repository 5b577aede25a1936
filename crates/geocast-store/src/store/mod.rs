//! The store contract and its `SQLite` implementation.

mod location_store;

pub use location_store::{LocationStore, SqliteLocationStore};
