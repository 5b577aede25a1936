//! Server configuration.

use std::time::Duration;

use geocast_settings::GeocastSettings;

use crate::realtime::DispatcherOptions;

/// Floor for [`ServerConfig::ping_interval`]. A zero period would stop
/// every session's writer.
pub const MIN_PING_INTERVAL: Duration = Duration::from_secs(1);

/// Runtime configuration for [`GeocastServer`](crate::server::GeocastServer).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind. `0` picks an ephemeral port.
    pub port: u16,
    /// Allowed CORS origins. `*` allows any.
    pub cors_origins: Vec<String>,
    /// Largest accepted WebSocket message, in bytes.
    pub max_message_size: usize,
    /// Interval between server pings. Values below [`MIN_PING_INTERVAL`]
    /// are raised to it.
    pub ping_interval: Duration,
    /// Silence after which a connection is considered dead.
    pub pong_timeout: Duration,
    /// Per-connection outbound queue capacity.
    pub outbound_buffer: usize,
    /// Clients idle longer than this are left out of fan-outs.
    pub registry_max_idle: Option<Duration>,
    /// How often idle clients are swept.
    pub registry_sweep_interval: Duration,
    /// Dispatcher switches.
    pub dispatcher: DispatcherOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            cors_origins: vec!["*".into()],
            max_message_size: 64 * 1024,
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
            outbound_buffer: 256,
            registry_max_idle: None,
            registry_sweep_interval: Duration::from_secs(60),
            dispatcher: DispatcherOptions::default(),
        }
    }
}

impl ServerConfig {
    /// Derive the server configuration from loaded settings.
    pub fn from_settings(settings: &GeocastSettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            cors_origins: server.cors_origins.clone(),
            max_message_size: server.max_message_size,
            ping_interval: Duration::from_secs(server.ping_interval_secs).max(MIN_PING_INTERVAL),
            pong_timeout: Duration::from_secs(server.pong_timeout_secs),
            outbound_buffer: server.outbound_buffer,
            registry_max_idle: settings.registry.max_idle_secs.map(Duration::from_secs),
            registry_sweep_interval: Duration::from_secs(settings.registry.sweep_interval_secs),
            dispatcher: DispatcherOptions {
                publish_error_markers: settings.dispatcher.publish_error_markers,
            },
        }
    }

    /// Ping period actually used by sessions.
    pub fn effective_ping_interval(&self) -> Duration {
        self.ping_interval.max(MIN_PING_INTERVAL)
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_ephemeral() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr(), "127.0.0.1:0");
        assert!(cfg.registry_max_idle.is_none());
        assert!(!cfg.dispatcher.publish_error_markers);
    }

    #[test]
    fn from_settings_copies_values() {
        let mut settings = GeocastSettings::default();
        settings.server.port = 9100;
        settings.server.ping_interval_secs = 5;
        settings.server.cors_origins = vec!["http://localhost:3000".into()];
        settings.registry.max_idle_secs = Some(120);
        settings.dispatcher.publish_error_markers = true;

        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:9100");
        assert_eq!(cfg.ping_interval, Duration::from_secs(5));
        assert_eq!(cfg.cors_origins, vec!["http://localhost:3000"]);
        assert_eq!(cfg.registry_max_idle, Some(Duration::from_secs(120)));
        assert!(cfg.dispatcher.publish_error_markers);
    }

    #[test]
    fn zero_ping_interval_is_raised_to_floor() {
        let mut settings = GeocastSettings::default();
        settings.server.ping_interval_secs = 0;
        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.ping_interval, MIN_PING_INTERVAL);

        let direct = ServerConfig {
            ping_interval: Duration::ZERO,
            ..ServerConfig::default()
        };
        assert_eq!(direct.effective_ping_interval(), MIN_PING_INTERVAL);
        assert_eq!(ServerConfig::default().effective_ping_interval(), Duration::from_secs(30));
    }
}
