//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Networking API surface for external integrations."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! HTTP transport for the decision engine.
//!
//! | Route | Purpose |
//! | --- | --- |
//! | `GET /` | liveness probe |
//! | `POST /optimize` | telemetry in, control command out |
//! | `GET /metrics` | Prometheus exposition (when enabled) |

use std::fmt;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use eco_source_core::{
    optimize_with, ControlCommand, FieldViolation, OptimizationRequest, OptimizeError,
    PolicyEngine,
};
use eco_source_metrics::{render_metrics, DecisionMetrics, SharedRegistry};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub const SERVICE_STATUS: &str = "Eco-Source decision engine is running";

/// Shared, immutable state handed to every request.
pub struct ApiState {
    engine: PolicyEngine,
    metrics: Option<ApiMetrics>,
}

struct ApiMetrics {
    registry: SharedRegistry,
    decisions: DecisionMetrics,
}

impl ApiState {
    pub fn new(engine: PolicyEngine) -> Self {
        Self {
            engine,
            metrics: None,
        }
    }

    /// Register decision counters on `registry` and expose it at `/metrics`.
    pub fn with_metrics(mut self, registry: SharedRegistry) -> Result<Self> {
        let decisions = DecisionMetrics::new(&registry)?;
        self.metrics = Some(ApiMetrics {
            registry,
            decisions,
        });
        Ok(self)
    }

    pub fn decision_metrics(&self) -> Option<&DecisionMetrics> {
        self.metrics.as_ref().map(|m| &m.decisions)
    }

    fn optimize(&self, request: OptimizationRequest) -> eco_source_core::Result<ControlCommand> {
        let started = Instant::now();
        let outcome = optimize_with(&self.engine, request.into_payload());
        if let Some(metrics) = &self.metrics {
            metrics.decisions.record(&outcome, started.elapsed());
        }
        outcome
    }
}

impl Default for ApiState {
    fn default() -> Self {
        Self::new(PolicyEngine::new())
    }
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState")
            .field("rules", &self.engine.rules().len())
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    /// Address actually bound, which differs from the requested one for port 0.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Build the router without binding a socket.
pub fn router(state: Arc<ApiState>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", get(get_root))
        .route("/optimize", post(post_optimize))
        .route("/metrics", get(get_metrics))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}

/// Bind `addr` and serve the API until [`ApiServer::shutdown`] is called.
pub fn spawn_api_server(
    state: Arc<ApiState>,
    addr: SocketAddr,
    request_timeout: Duration,
) -> Result<ApiServer> {
    let router = router(state, request_timeout);

    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind API listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let bound = listener
        .local_addr()
        .context("failed to read API listener address")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %bound, "api server listening");
        if let Err(err) = axum::serve(tcp_listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %bound, error = %err, "api server exited with error");
            return Err(err.into());
        }
        Ok(())
    });

    Ok(ApiServer {
        addr: bound,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
}

/// Error body returned for every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<FieldViolation>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
    violations: Vec<FieldViolation>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            violations: Vec::new(),
        }
    }
}

impl From<OptimizeError> for ApiError {
    fn from(err: OptimizeError) -> Self {
        let message = err.to_string();
        match err {
            OptimizeError::Payload(_) => ApiError::new(StatusCode::BAD_REQUEST, message),
            OptimizeError::Validation(validation) => ApiError {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                message,
                violations: validation.violations,
            },
            OptimizeError::Policy(_) => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            message: self.message,
            violations: self.violations,
        });
        (self.status, body).into_response()
    }
}

async fn get_root() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: SERVICE_STATUS.to_owned(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
    })
}

async fn post_optimize(
    State(state): State<Arc<ApiState>>,
    payload: std::result::Result<Json<OptimizationRequest>, JsonRejection>,
) -> std::result::Result<Json<ControlCommand>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        if let Some(metrics) = state.decision_metrics() {
            metrics.record_malformed();
        }
        warn!(error = %rejection.body_text(), "optimize request rejected before validation");
        let status = match rejection {
            JsonRejection::MissingJsonContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::BAD_REQUEST,
        };
        ApiError::new(status, rejection.body_text())
    })?;

    match state.optimize(request) {
        Ok(command) => {
            info!(site_id = %command.site_id, action = %command.action, "control command issued");
            Ok(Json(command))
        }
        Err(err) => {
            if err.is_client_error() {
                warn!(error = %err, "optimize request rejected");
            } else {
                error!(error = %err, "optimize request failed");
            }
            Err(err.into())
        }
    }
}

async fn get_metrics(State(state): State<Arc<ApiState>>) -> Response {
    match &state.metrics {
        Some(metrics) => render_metrics(&metrics.registry),
        None => ApiError::new(StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
