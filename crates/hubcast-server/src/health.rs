//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process is serving HTTP.
    pub status: String,
    pub uptime_secs: u64,
    /// Current registry size.
    pub connections: usize,
    /// Whether the relay is accepting and broadcasting.
    pub listening: bool,
}

pub fn health_check(start_time: Instant, connections: usize, listening: bool) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        listening,
    }
}
