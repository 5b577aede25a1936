//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Call once at startup, before anything is recorded. The handle renders the
/// `/metrics` body.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// WebSocket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket connections currently open (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connections closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// WebSocket connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Topic publishes (counter, labels: topic).
pub const TOPIC_PUBLISHES_TOTAL: &str = "topic_publishes_total";
/// Messages dropped because a subscriber's queue was full or closed (counter).
pub const TOPIC_DROPS_TOTAL: &str = "topic_drops_total";
/// Inbound events handled (counter, labels: event).
pub const DISPATCH_EVENTS_TOTAL: &str = "dispatch_events_total";
/// Failed store saves and lookups during dispatch (counter).
pub const DISPATCH_STORE_ERRORS_TOTAL: &str = "dispatch_store_errors_total";
/// Time to handle one inbound event (histogram, labels: event).
pub const DISPATCH_DURATION_SECONDS: &str = "dispatch_duration_seconds";
/// Client frames rejected with an ERROR frame (counter, labels: reason).
pub const STOMP_ERRORS_TOTAL: &str = "stomp_errors_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unattached_recorder_renders() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('\n'));
    }

    #[test]
    fn metric_names_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTION_DURATION_SECONDS,
            TOPIC_PUBLISHES_TOTAL,
            TOPIC_DROPS_TOTAL,
            DISPATCH_EVENTS_TOTAL,
            DISPATCH_STORE_ERRORS_TOTAL,
            DISPATCH_DURATION_SECONDS,
            STOMP_ERRORS_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "{name} is not snake_case"
            );
        }
    }
}
