//! HTTP admin routes over the location store.

pub mod admin;
