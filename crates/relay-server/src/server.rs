//! `RelayServer`: Axum HTTP + WebSocket + SSE surface.
//!
//! | Route                | Transport                                         |
//! |----------------------|---------------------------------------------------|
//! | `GET /ws`            | duplex session, one prompt per Turn               |
//! | `POST /invocations`  | request/stream session, `text/event-stream` reply |
//! | `GET /ping`          | health JSON                                       |
//! | `GET /metrics`       | Prometheus text                                   |

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use futures::Stream;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use relay_runtime::{RelayContext, SessionChannel, run_request};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::metrics::{INVOCATIONS_TOTAL, WS_CONNECTIONS_REJECTED_TOTAL};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::{ConnectionTracker, SessionOptions, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Relay context shared by every Turn.
    pub ctx: RelayContext,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Open WebSocket connections.
    pub connections: Arc<ConnectionTracker>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Prometheus handle for `/metrics`, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// Monotonic start time.
    pub start_time: Instant,
    /// Wall-clock start time.
    pub started_at: DateTime<Utc>,
}

/// The relay server.
pub struct RelayServer {
    state: AppState,
}

impl RelayServer {
    /// Create a server around `ctx`.
    pub fn new(config: ServerConfig, ctx: RelayContext) -> Self {
        let connections = Arc::new(ConnectionTracker::new(config.max_connections));
        Self {
            state: AppState {
                ctx,
                config: Arc::new(config),
                connections,
                shutdown: Arc::new(ShutdownCoordinator::new()),
                metrics: None,
                start_time: Instant::now(),
                started_at: Utc::now(),
            },
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/invocations", post(invocations_handler))
            .route("/ping", get(ping_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind and serve in a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    /// The task ends after [`ShutdownCoordinator::shutdown`].
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let config = &self.state.config;
        let addr = format!("{}:{}", config.host, config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let router = self.router();
        let token = self.state.shutdown.token();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server terminated");
            }
        });

        info!(
            %local,
            backend = self.state.ctx.backend.name(),
            multi_turn = config.multi_turn,
            "relay server listening"
        );
        Ok((local, handle))
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Connection tracker.
    pub fn connections(&self) -> &Arc<ConnectionTracker> {
        &self.state.connections
    }

    /// Relay context.
    pub fn context(&self) -> &RelayContext {
        &self.state.ctx
    }
}

/// GET /ws
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let Some(permit) = state.connections.try_acquire() else {
        warn!(
            max = state.connections.max(),
            "connection limit reached, refusing upgrade"
        );
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };

    let options = SessionOptions {
        multi_turn: state.config.multi_turn,
        heartbeat_interval: state.config.heartbeat_interval(),
        heartbeat_timeout: state.config.heartbeat_timeout(),
    };
    let shutdown = state.shutdown.clone();
    let ctx = state.ctx.clone();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| {
            let token = shutdown.token();
            shutdown.track(run_ws_session(socket, ctx, options, permit, token))
        })
}

/// POST /invocations
///
/// The body is the prompt JSON. Each wire event becomes one `data:` line and
/// the stream ends after the terminal event.
async fn invocations_handler(
    State(state): State<AppState>,
    body: String,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    counter!(INVOCATIONS_TOTAL).increment(1);
    let (tx, rx) = mpsc::channel(state.ctx.channel_capacity);
    let ctx = state.ctx.clone();
    let _ = state.shutdown.spawn(async move {
        let mut channel = SessionChannel::request_stream(tx);
        let _ = run_request(&ctx, &mut channel, &body).await;
    });

    let stream = ReceiverStream::new(rx).map(|event| Ok(Event::default().data(event.to_json())));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// GET /ping
async fn ping_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.started_at,
        state.connections.count(),
        state.ctx.active_turns(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
