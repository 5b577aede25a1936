//! `GeocastServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use geocast_core::ConnectionId;
use geocast_store::LocationStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};

use crate::api::admin;
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::realtime::{Dispatcher, SessionRegistry};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::broadcast::TopicBroker;
use crate::websocket::session::{SessionDeps, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Event dispatcher shared by every session.
    pub dispatcher: Arc<Dispatcher>,
    /// Topic broker for `/topic/*` fan-out.
    pub broker: Arc<TopicBroker>,
    /// Known client ids.
    pub registry: Arc<SessionRegistry>,
    /// Location store.
    pub store: Arc<dyn LocationStore>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Renders `/metrics`. `None` disables the route.
    pub metrics: Option<PrometheusHandle>,
}

/// The geocast server.
pub struct GeocastServer {
    state: AppState,
}

impl GeocastServer {
    /// Wire the registry, broker and dispatcher around `store`.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn LocationStore>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::with_max_idle(config.registry_max_idle));
        let broker = Arc::new(TopicBroker::new());
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            store.clone(),
            broker.clone(),
            config.dispatcher,
        ));
        Self {
            state: AppState {
                dispatcher,
                broker,
                registry,
                store,
                config: Arc::new(config),
                shutdown: Arc::new(ShutdownCoordinator::new()),
                start_time: Instant::now(),
                metrics,
            },
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let cors = cors_layer(&self.state.config.cors_origins);
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .merge(admin::routes())
            .with_state(self.state.clone())
            .layer(cors)
    }

    /// Bind and serve in the background.
    ///
    /// Returns the bound address and the server task, which finishes after
    /// [`ShutdownCoordinator::shutdown`] once open connections have closed.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.state.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.state.shutdown.token();

        let sweeper = self.state.config.registry_max_idle.map(|_| {
            spawn_idle_sweeper(
                self.state.registry.clone(),
                self.state.config.registry_sweep_interval,
                token.clone(),
            )
        });

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(token.cancelled_owned());
            if let Err(e) = serve.await {
                error!(error = %e, "server error");
            }
            if let Some(sweeper) = sweeper {
                let _ = sweeper.await;
            }
            info!("server stopped");
        });

        info!(%addr, "geocast listening");
        Ok((addr, handle))
    }

    /// Get the topic broker.
    pub fn broker(&self) -> &Arc<TopicBroker> {
        &self.state.broker
    }

    /// Get the session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.state.registry
    }

    /// Get the dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.state.dispatcher
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

fn spawn_idle_sweeper(
    registry: Arc<SessionRegistry>,
    every: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if every.is_zero() {
            return;
        }
        let mut interval = tokio::time::interval(every);
        let _ = interval.tick().await;
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = interval.tick() => {
                    let _ = registry.sweep_expired();
                }
            }
        }
    })
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let deps = SessionDeps {
        dispatcher: state.dispatcher,
        broker: state.broker,
        shutdown: state.shutdown,
        config: state.config.clone(),
    };
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, ConnectionId::new(), deps))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.broker.connection_count().await;
    Json(health::health_check(
        state.start_time,
        connections,
        state.registry.len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
