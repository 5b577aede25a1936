//! Stateless repositories. Each method takes a `&Connection` and runs SQL.

pub mod location;

pub use location::LocationRepo;
