//! Per-connection state, the socket loop, heartbeat and the hub event bridge.

pub mod connection;
pub mod event_bridge;
pub mod handler;
pub mod heartbeat;
