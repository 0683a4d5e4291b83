//! `HubcastServer`: binds the endpoint and wires gate, registry and
//! broadcaster together.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::{Json, Response};
use axum::routing::get;
use axum::{middleware, Extension, Router};
use hubcast_core::{Authenticator, HubEvent, Principal, TaskCatalog};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::broadcaster::Broadcaster;
use crate::config::ServerConfig;
use crate::gate::{self, GateState};
use crate::health::{self, HealthResponse};
use crate::registry::ConnectionRegistry;
use crate::websocket::event_bridge::EventBridge;
use crate::websocket::handler::{serve_connection, ConnectionSettings};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Where clients can reach the relay, announced once the port is bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdvertisedEndpoint {
    pub scheme: String,
    pub port: u16,
    pub path: String,
}

/// Receives the relay's endpoint after a successful bind.
pub trait EndpointRegistrar: Send + Sync {
    fn register(&self, endpoint: &AdvertisedEndpoint);
}

/// Registrar that only logs the endpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingRegistrar;

impl EndpointRegistrar for LoggingRegistrar {
    fn register(&self, endpoint: &AdvertisedEndpoint) {
        info!(
            scheme = %endpoint.scheme,
            port = endpoint.port,
            path = %endpoint.path,
            "websocket endpoint registered"
        );
    }
}

/// Collaborators the server consumes.
pub struct ServerDeps {
    pub authenticator: Arc<dyn Authenticator>,
    pub tasks: Arc<dyn TaskCatalog>,
    pub registrar: Arc<dyn EndpointRegistrar>,
    /// Enables `/metrics` when present.
    pub metrics: Option<PrometheusHandle>,
}

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
struct AppState {
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<Broadcaster>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    connection: ConnectionSettings,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

pub struct HubcastServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<Broadcaster>,
    gate: GateState,
    registrar: Arc<dyn EndpointRegistrar>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl HubcastServer {
    pub fn new(config: ServerConfig, deps: ServerDeps) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.max_dropped_messages));
        let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&registry), deps.tasks));
        let gate = GateState::new(
            deps.authenticator,
            config.admission.clone(),
            config.auth_timeout(),
        );
        Self {
            config,
            registry,
            broadcaster,
            gate,
            registrar: deps.registrar,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            metrics: deps.metrics,
            start_time: Instant::now(),
        }
    }

    /// Routes: the gated upgrade path, `/health`, and `/metrics` when a
    /// Prometheus handle was supplied.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            broadcaster: Arc::clone(&self.broadcaster),
            shutdown: self.shutdown.clone(),
            tracker: self.tracker.clone(),
            connection: ConnectionSettings {
                max_send_queue: self.config.max_send_queue,
                heartbeat_interval: self.config.heartbeat_interval(),
                heartbeat_timeout: self.config.heartbeat_timeout(),
            },
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        let upgrade = Router::new()
            .route(&self.config.path, get(upgrade_handler))
            .route_layer(middleware::from_fn_with_state(
                self.gate.clone(),
                gate::authorize,
            ));

        let mut router = Router::new()
            .route("/health", get(health_handler))
            .merge(upgrade);
        if self.metrics.is_some() {
            router = router.route("/metrics", get(metrics_handler));
        }

        router.layer(TraceLayer::new_for_http()).with_state(state)
    }

    /// Bind, announce the endpoint, then serve and bridge events in the
    /// background.
    ///
    /// A bind failure is returned and nothing is announced.
    pub async fn start(
        &self,
        events: broadcast::Receiver<HubEvent>,
    ) -> Result<ServerHandle, ServerError> {
        let addr = self.config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        self.broadcaster.activate();
        self.registrar.register(&AdvertisedEndpoint {
            scheme: self.config.advertised_scheme.clone(),
            port: local_addr.port(),
            path: self.config.path.clone(),
        });
        info!(addr = %local_addr, path = %self.config.path, "hubcast relay listening");

        let token = self.shutdown.clone();
        let router = self.router();
        let server = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "server error");
            }
        });

        let bridge = tokio::spawn(
            EventBridge::new(events, Arc::clone(&self.broadcaster), self.shutdown.clone()).run(),
        );

        Ok(ServerHandle {
            local_addr,
            registry: Arc::clone(&self.registry),
            broadcaster: Arc::clone(&self.broadcaster),
            shutdown: self.shutdown.clone(),
            tracker: self.tracker.clone(),
            tasks: vec![server, bridge],
            timeout: self.config.shutdown_timeout(),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Running server. Dropping it leaves the server running; call
/// [`ServerHandle::shutdown`] to stop.
pub struct ServerHandle {
    local_addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<Broadcaster>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    tasks: Vec<JoinHandle<()>>,
    timeout: Duration,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Stop the relay in order: no new broadcasts, every member closed, the
    /// acceptor and bridge cancelled, then a wait bounded by the shutdown
    /// timeout for them and every connection task.
    ///
    /// Tasks still running after the timeout are left to the runtime.
    pub async fn shutdown(self) {
        self.broadcaster.deactivate();
        let closed = self.registry.close_all();
        self.shutdown.cancel();
        self.tracker.close();
        info!(closed, connection_tasks = self.tracker.len(), "stopping hubcast relay");

        let Self {
            tracker,
            tasks,
            timeout,
            ..
        } = self;
        let drain = async move {
            for result in futures::future::join_all(tasks).await {
                if let Err(e) = result {
                    warn!(error = %e, "server task ended abnormally");
                }
            }
            tracker.wait().await;
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(?timeout, "shutdown timed out, some tasks may still be running");
        } else {
            info!("hubcast relay stopped");
        }
    }
}

/// GET on the upgrade path, reached only through the gate.
async fn upgrade_handler(
    ws: WebSocketUpgrade,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
) -> Response {
    let closed = state.shutdown.child_token();
    let AppState {
        registry,
        tracker,
        connection,
        ..
    } = state;
    ws.on_upgrade(move |socket| {
        tracker.track_future(async move {
            let _ = serve_connection(socket, principal, registry, connection, closed).await;
        })
    })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.size(),
        state.broadcaster.is_active(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}
