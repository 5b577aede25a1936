//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a partial
//! JSON file is enough: missing fields keep their default value.

mod realtime;
mod server;

pub use realtime::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9090 },
///   "registry": { "maxIdleSecs": 600 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeocastSettings {
    /// HTTP and WebSocket listener.
    pub server: ServerSettings,
    /// Position database.
    pub storage: StorageSettings,
    /// Log output.
    pub logging: LoggingSettings,
    /// Fan-out behaviour.
    pub dispatcher: DispatcherSettings,
    /// Session registry retention.
    pub registry: RegistrySettings,
}

impl GeocastSettings {
    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.storage.pool_size == 0 {
            return Err(SettingsError::InvalidValue(
                "storage.poolSize must be at least 1".into(),
            ));
        }
        if self.server.outbound_buffer == 0 {
            return Err(SettingsError::InvalidValue(
                "server.outboundBuffer must be at least 1".into(),
            ));
        }
        if self.server.ping_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "server.pingIntervalSecs must be at least 1".into(),
            ));
        }
        if self.server.pong_timeout_secs < self.server.ping_interval_secs {
            return Err(SettingsError::InvalidValue(format!(
                "server.pongTimeoutSecs ({}) is shorter than server.pingIntervalSecs ({})",
                self.server.pong_timeout_secs, self.server.ping_interval_secs
            )));
        }
        if self.registry.max_idle_secs == Some(0) {
            return Err(SettingsError::InvalidValue(
                "registry.maxIdleSecs must be positive when set".into(),
            ));
        }
        if self.registry.max_idle_secs.is_some() && self.registry.sweep_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "registry.sweepIntervalSecs must be positive when maxIdleSecs is set".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn defaults_validate() {
        GeocastSettings::default().validate().unwrap();
    }

    #[test]
    fn serializes_camel_case() {
        let value = serde_json::to_value(GeocastSettings::default()).unwrap();
        assert!(value["server"]["maxMessageSize"].is_number());
        assert!(value["storage"]["dbPath"].is_string());
        assert_eq!(value["dispatcher"]["publishErrorMarkers"], json!(false));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: GeocastSettings =
            serde_json::from_value(json!({"server": {"port": 9000}})).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, ServerSettings::default().host);
        assert_eq!(settings.storage, StorageSettings::default());
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let mut settings = GeocastSettings::default();
        settings.storage.pool_size = 0;
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn pong_timeout_shorter_than_ping_is_rejected() {
        let mut settings = GeocastSettings::default();
        settings.server.ping_interval_secs = 60;
        settings.server.pong_timeout_secs = 30;
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(msg)) if msg.contains("pongTimeoutSecs"));
    }

    #[test]
    fn zero_ping_interval_is_rejected() {
        let mut settings = GeocastSettings::default();
        settings.server.ping_interval_secs = 0;
        settings.server.pong_timeout_secs = 0;
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(msg)) if msg.contains("pingIntervalSecs"));
    }

    #[test]
    fn zero_max_idle_is_rejected() {
        let mut settings = GeocastSettings::default();
        settings.registry.max_idle_secs = Some(0);
        assert!(settings.validate().is_err());
    }
}
