//! # hubcast-core
//!
//! Domain types shared across the relay:
//!
//! - [`events`]: the typed hub events the relay subscribes to
//! - [`auth`]: principals, the `Authenticator` seam and the admission policy
//! - [`tasks`]: task lookup used when describing task events
//! - [`ids`]: prefixed identifiers

pub mod auth;
pub mod events;
pub mod ids;
pub mod tasks;

pub use auth::{AdmissionPolicy, AuthError, Authenticator, Principal, StaticTokenAuthenticator};
pub use events::HubEvent;
pub use ids::{ConnectionId, EventId};
pub use tasks::{InMemoryTaskCatalog, TaskCatalog, TaskSnapshot};
