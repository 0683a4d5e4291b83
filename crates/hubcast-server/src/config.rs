//! Server configuration.

use std::time::Duration;

use hubcast_core::AdmissionPolicy;
use serde::{Deserialize, Serialize};

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `8184`, `0` for auto-assign).
    pub port: u16,
    /// Upgrade route.
    pub path: String,
    /// Scheme reported to the endpoint registrar.
    pub advertised_scheme: String,
    /// Per-connection outbound queue capacity.
    pub max_send_queue: usize,
    /// Frames a connection may drop before it is evicted.
    pub max_dropped_messages: u64,
    pub heartbeat_interval_secs: u64,
    /// A peer silent for this long is treated as gone.
    pub heartbeat_timeout_secs: u64,
    pub auth_timeout_ms: u64,
    pub shutdown_timeout_secs: u64,
    /// Roles that grant read access to the stream.
    pub admission: AdmissionPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8184,
            path: "/websockets".into(),
            advertised_scheme: "ws".into(),
            max_send_queue: 256,
            max_dropped_messages: 100,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            auth_timeout_ms: 5_000,
            shutdown_timeout_secs: 10,
            admission: AdmissionPolicy::default(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs.max(1))
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms.max(1))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubcast_core::auth::{ROLE_ADMINISTRATOR, ROLE_USER_READ};

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 8184);
        assert_eq!(cfg.path, "/websockets");
        assert_eq!(cfg.advertised_scheme, "ws");
        assert_eq!(cfg.max_send_queue, 256);
        assert_eq!(cfg.auth_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn default_admission_is_read_access() {
        let cfg = ServerConfig::default();
        assert!(cfg.admission.any_of.contains(ROLE_ADMINISTRATOR));
        assert!(cfg.admission.any_of.contains(ROLE_USER_READ));
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let cfg = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.bind_addr(), "127.0.0.1:0");
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let cfg = ServerConfig {
            heartbeat_interval_secs: 0,
            heartbeat_timeout_secs: 0,
            auth_timeout_ms: 0,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(1));
        assert_eq!(cfg.heartbeat_timeout(), Duration::from_secs(1));
        assert_eq!(cfg.auth_timeout(), Duration::from_millis(1));
    }
}
