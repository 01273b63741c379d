//! HTTP API: lifecycle triggers, node and job views, monitor notifications.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::ClustermError;
use crate::manager::Manager;
use crate::node::Node;
use crate::scheduler::JobInfo;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodesRequest {
    pub nodes: Vec<String>,
    #[serde(default)]
    pub extra_vars: String,
    #[serde(default)]
    pub host_group: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoverRequest {
    pub addrs: Vec<String>,
    #[serde(default)]
    pub extra_vars: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalsRequest {
    #[serde(default)]
    pub extra_vars: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDiscoveredRequest {
    pub name: String,
    pub addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDisappearedRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub cancelled: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A manager error on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ClustermError);

impl From<ClustermError> for ApiError {
    fn from(e: ClustermError) -> Self {
        Self(e)
    }
}

pub fn status_code(err: &ClustermError) -> StatusCode {
    use ClustermError::*;
    match err {
        UnexpectedArgCount { .. }
        | InvalidIpAddr(_)
        | InvalidHostGroup(_)
        | InvalidExtraVars(_)
        | ClustermError::Config(_) => StatusCode::BAD_REQUEST,
        NodeNotExists(_)
        | NodeConfigNotExists(_)
        | NodeInventoryNotExists(_)
        | NoActiveJob
        | NoLastJob => StatusCode::NOT_FOUND,
        ActiveJob(_) => StatusCode::CONFLICT,
        NodesNotDiscovered(_)
        | NodeAlreadyExists(_)
        | NodeAlreadyCommissioned(_)
        | NodeNotCommissioned(_)
        | WorkersWithoutMaster => StatusCode::PRECONDITION_FAILED,
        TransitionFailed { .. } | AssetNotFound(_) | JobCancelled | Workflow(_) | Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_code(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, status = %status, "Request rejected");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(manager: Arc<Manager>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/nodes", get(list_nodes_handler))
        .route("/api/v1/node/{name}", get(get_node_handler))
        .route("/api/v1/nodes/commission", post(commission_handler))
        .route("/api/v1/nodes/decommission", post(decommission_handler))
        .route("/api/v1/nodes/update", post(update_handler))
        .route("/api/v1/nodes/discover", post(discover_handler))
        .route(
            "/api/v1/globals",
            get(get_globals_handler).post(set_globals_handler),
        )
        .route("/api/v1/config", post(apply_config_handler))
        .route("/api/v1/jobs/active", get(active_job_handler))
        .route("/api/v1/jobs/active/cancel", post(cancel_job_handler))
        .route("/api/v1/jobs/last", get(last_job_handler))
        .route("/api/v1/monitor/discovered", post(node_discovered_handler))
        .route("/api/v1/monitor/disappeared", post(node_disappeared_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(manager)
}

/// Serve the API until `shutdown` fires.
pub async fn run_api(
    addr: SocketAddr,
    manager: Arc<Manager>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let app = router(manager);

    tracing::info!(addr = %addr, "Starting API server");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn list_nodes_handler(State(manager): State<Arc<Manager>>) -> Json<Vec<Node>> {
    Json(manager.nodes().await)
}

async fn get_node_handler(
    State(manager): State<Arc<Manager>>,
    Path(name): Path<String>,
) -> ApiResult<Node> {
    Ok(Json(manager.node(&name).await?))
}

async fn commission_handler(
    State(manager): State<Arc<Manager>>,
    Json(req): Json<NodesRequest>,
) -> ApiResult<JobInfo> {
    let job = manager
        .commission_nodes(&req.nodes, &req.extra_vars, &req.host_group)
        .await?;
    Ok(Json(job))
}

async fn decommission_handler(
    State(manager): State<Arc<Manager>>,
    Json(req): Json<NodesRequest>,
) -> ApiResult<JobInfo> {
    let job = manager
        .decommission_nodes(&req.nodes, &req.extra_vars)
        .await?;
    Ok(Json(job))
}

async fn update_handler(
    State(manager): State<Arc<Manager>>,
    Json(req): Json<NodesRequest>,
) -> ApiResult<JobInfo> {
    let job = manager
        .update_nodes(&req.nodes, &req.extra_vars, &req.host_group)
        .await?;
    Ok(Json(job))
}

async fn discover_handler(
    State(manager): State<Arc<Manager>>,
    Json(req): Json<DiscoverRequest>,
) -> ApiResult<JobInfo> {
    let job = manager.discover_nodes(&req.addrs, &req.extra_vars).await?;
    Ok(Json(job))
}

async fn get_globals_handler(State(manager): State<Arc<Manager>>) -> Json<GlobalsRequest> {
    Json(GlobalsRequest {
        extra_vars: manager.globals().await,
    })
}

async fn set_globals_handler(
    State(manager): State<Arc<Manager>>,
    Json(req): Json<GlobalsRequest>,
) -> Result<StatusCode, ApiError> {
    manager.set_globals(&req.extra_vars).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn apply_config_handler(
    State(manager): State<Arc<Manager>>,
    body: axum::body::Bytes,
) -> Result<StatusCode, ApiError> {
    let config = Config::read(body.as_ref())?;
    manager.apply_config(config).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn active_job_handler(State(manager): State<Arc<Manager>>) -> ApiResult<JobInfo> {
    Ok(Json(manager.active_job()?))
}

async fn last_job_handler(State(manager): State<Arc<Manager>>) -> ApiResult<JobInfo> {
    let job = manager.last_job().ok_or(ClustermError::NoLastJob)?;
    Ok(Json(job))
}

async fn cancel_job_handler(State(manager): State<Arc<Manager>>) -> ApiResult<CancelResponse> {
    let cancelled = manager.cancel_active_job()?;
    Ok(Json(CancelResponse { cancelled }))
}

async fn node_discovered_handler(
    State(manager): State<Arc<Manager>>,
    Json(req): Json<NodeDiscoveredRequest>,
) -> Result<StatusCode, ApiError> {
    manager.node_discovered(&req.name, &req.addr).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn node_disappeared_handler(
    State(manager): State<Arc<Manager>>,
    Json(req): Json<NodeDisappearedRequest>,
) -> Result<StatusCode, ApiError> {
    manager.node_disappeared(&req.name).await?;
    Ok(StatusCode::NO_CONTENT)
}
