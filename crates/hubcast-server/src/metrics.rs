//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Call once at startup, before any metric is recorded. The returned handle
/// renders the `/metrics` endpoint.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Connections admitted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Connections that left the registry (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Current registry size (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Upgrade requests refused by the gate (counter, labels: reason).
pub const WS_AUTH_REJECTIONS_TOTAL: &str = "ws_auth_rejections_total";
/// Envelopes broadcast (counter, labels: event_type).
pub const WS_BROADCAST_EVENTS_TOTAL: &str = "ws_broadcast_events_total";
/// Frames dropped on full or closed queues (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Events that could not be translated (counter, labels: event_type).
pub const WS_TRANSLATION_ERRORS_TOTAL: &str = "ws_translation_errors_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_recorder_renders() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(WS_CONNECTIONS_TOTAL).increment(2);
        });
        assert!(handle.render().contains("ws_connections_total 2"));
    }

    #[test]
    fn metric_names_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_AUTH_REJECTIONS_TOTAL,
            WS_BROADCAST_EVENTS_TOTAL,
            WS_BROADCAST_DROPS_TOTAL,
            WS_TRANSLATION_ERRORS_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
