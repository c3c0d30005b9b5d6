// HTTP + WebSocket routes over the snapshot store

mod http;
mod ws;

use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::activity::ActivityTracker;
use crate::config::AppConfig;
use crate::store::SnapshotStore;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<SnapshotStore>,
    pub(crate) activity: Arc<ActivityTracker>,
    pub(crate) config: AppConfig,
}

pub fn app(store: Arc<SnapshotStore>, activity: Arc<ActivityTracker>, config: AppConfig) -> Router {
    let state = AppState {
        store,
        activity,
        config,
    };
    Router::new()
        .route("/", get(|| async { "hostwatch: metrics engine running" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/metrics", get(http::metrics_handler)) // GET /api/metrics
        .route("/api/overview", get(http::overview_handler)) // GET /api/overview
        .route("/api/docker", get(http::docker_handler)) // GET /api/docker
        .route("/api/disk", get(http::disk_handler)) // GET /api/disk
        .route("/api/network", get(http::network_handler)) // GET /api/network
        .route("/api/processes", get(http::processes_handler)) // GET /api/processes
        .route("/api/v1/system", get(http::v1_system_handler)) // GET /api/v1/system
        .route("/api/v1/stats", get(http::v1_stats_handler)) // GET /api/v1/stats
        .route("/api/v1/docker", get(http::v1_docker_handler)) // GET /api/v1/docker
        .route("/ws/metrics", get(ws::ws_metrics)) // WS /ws/metrics
        .fallback(|| async { (StatusCode::NOT_FOUND, "not found") })
        .layer(middleware::from_fn_with_state(state.clone(), track_activity))
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}

/// Every request, whatever the route, counts as activity.
async fn track_activity(State(state): State<AppState>, request: Request, next: Next) -> Response {
    state.activity.touch();
    next.run(request).await
}
