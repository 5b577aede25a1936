//! # geocast-settings
//!
//! Layered configuration for the geocast server.
//!
//! Settings are resolved from three layers (in priority order):
//! 1. **Compiled defaults**: [`GeocastSettings::default()`]
//! 2. **User file**: `~/.geocast/settings.json`, deep-merged over defaults
//! 3. **Environment variables**: `GEOCAST_*` overrides (highest priority)
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, geocast_home, load_settings,
    load_settings_from_path, settings_path,
};
pub use types::*;
