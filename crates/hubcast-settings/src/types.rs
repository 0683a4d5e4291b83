//! Settings schema.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubcastSettings {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub logging: LoggingSettings,
}

/// Listening endpoint and per-connection limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listening port.
    pub port: u16,
    /// Upgrade path.
    pub path: String,
    /// Scheme advertised to the rest of the hub once bound.
    pub advertised_scheme: String,
    /// Outbound frames buffered per connection before drops start.
    pub max_send_queue: usize,
    /// Dropped frames after which a slow connection is evicted.
    pub max_dropped_messages: u64,
    pub heartbeat_interval_secs: u64,
    pub heartbeat_timeout_secs: u64,
    /// Upper bound on a single credential check.
    pub auth_timeout_ms: u64,
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8184,
            path: "/websockets".to_string(),
            advertised_scheme: "ws".to_string(),
            max_send_queue: 256,
            max_dropped_messages: 100,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            auth_timeout_ms: 5_000,
            shutdown_timeout_secs: 10,
        }
    }
}

/// A bearer token accepted by the built-in token table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    pub token: String,
    pub subject: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Admission policy and the built-in token table.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// A principal holding any of these roles may connect.
    pub admit_roles: Vec<String>,
    pub tokens: Vec<TokenGrant>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            admit_roles: vec!["administrator".to_string(), "userRead".to_string()],
            tokens: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level (`trace`..`error`). `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Per-module level overrides, e.g. `{"hubcast_server": "debug"}`.
    pub module_levels: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            module_levels: BTreeMap::new(),
        }
    }
}
