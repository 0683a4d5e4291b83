//! # hubcast-server
//!
//! Relays hub events to authenticated WebSocket clients.
//!
//! - [`gate`]: credential extraction and admission on the upgrade route
//! - [`registry`]: the set of open, admitted connections
//! - [`translate`]: hub event to wire envelope
//! - [`broadcaster`]: serialize once, fan out to every member
//! - [`server`]: bind, register the endpoint, serve, shut down

pub mod broadcaster;
pub mod config;
pub mod gate;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod translate;
pub mod websocket;

pub use broadcaster::Broadcaster;
pub use config::ServerConfig;
pub use registry::ConnectionRegistry;
pub use server::{
    AdvertisedEndpoint, EndpointRegistrar, HubcastServer, LoggingRegistrar, ServerDeps,
    ServerError, ServerHandle,
};
pub use translate::{translate, Envelope, EnvelopeBody, TranslationError};
