//! Dispatcher and registry behaviour.

use serde::{Deserialize, Serialize};

/// Fan-out behaviour.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatcherSettings {
    /// Publish `{"error": ..., "clientId": ...}` for ids that cannot be
    /// looked up during a fan-out, instead of skipping them silently.
    pub publish_error_markers: bool,
}

/// Session registry retention.
///
/// With `max_idle_secs` unset, clients stay registered for the life of the
/// process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrySettings {
    /// Clients not heard from for this long are left out of fan-outs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_idle_secs: Option<u64>,
    /// How often idle clients are swept from the registry. Only used when
    /// `max_idle_secs` is set.
    pub sweep_interval_secs: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            max_idle_secs: None,
            sweep_interval_secs: 60,
        }
    }
}
