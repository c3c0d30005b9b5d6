// GET handlers: all read the current snapshot, none sample

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::AppState;
use crate::version::{NAME, VERSION};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/metrics: the full current snapshot.
pub(super) async fn metrics_handler(State(state): State<AppState>) -> Response {
    let snapshot = state.store.read();
    Json(&*snapshot).into_response()
}

/// GET /api/overview: cpu, memory and uptime.
pub(super) async fn overview_handler(State(state): State<AppState>) -> Response {
    let snapshot = state.store.read();
    Json(json!({
        "cpu": snapshot.cpu,
        "memory": snapshot.memory,
        "uptime": snapshot.uptime,
        "timestamp": snapshot.timestamp,
    }))
    .into_response()
}

pub(super) async fn docker_handler(State(state): State<AppState>) -> Response {
    let snapshot = state.store.read();
    Json(&snapshot.docker).into_response()
}

pub(super) async fn disk_handler(State(state): State<AppState>) -> Response {
    let snapshot = state.store.read();
    Json(&snapshot.disk).into_response()
}

pub(super) async fn network_handler(State(state): State<AppState>) -> Response {
    let snapshot = state.store.read();
    Json(&snapshot.network).into_response()
}

pub(super) async fn processes_handler(State(state): State<AppState>) -> Response {
    let snapshot = state.store.read();
    Json(&snapshot.processes).into_response()
}

/// GET /api/v1/system: identity and uptime.
pub(super) async fn v1_system_handler(State(state): State<AppState>) -> Response {
    let snapshot = state.store.read();
    let system = &snapshot.system;
    Json(json!({
        "hostname": system.hostname,
        "os": system.os,
        "architecture": system.architecture,
        "processor": system.processor,
        "cpu_count": system.cpu_count,
        "uptime_seconds": snapshot.uptime.uptime_seconds,
        "uptime_formatted": snapshot.uptime.uptime_formatted,
    }))
    .into_response()
}

/// GET /api/v1/stats: headline figures, memory in GiB.
pub(super) async fn v1_stats_handler(State(state): State<AppState>) -> Response {
    let snapshot = state.store.read();
    let memory = &snapshot.memory;
    Json(json!({
        "timestamp": snapshot.timestamp,
        "cpu": {
            "percent": snapshot.cpu.overall_percent,
            "cores": snapshot.cpu.per_core_percent.len(),
        },
        "memory": {
            "total_gb": gib(memory.total),
            "used_gb": gib(memory.used),
            "percent": memory.percent,
        },
        "swap": {
            "total_gb": gib(memory.swap_total),
            "used_gb": gib(memory.swap_used),
            "percent": memory.swap_percent,
        },
        "network": {
            "bytes_sent": snapshot.network.bytes_sent,
            "bytes_recv": snapshot.network.bytes_recv,
        },
    }))
    .into_response()
}

/// GET /api/v1/docker: containers with headline usage; zero when stats are absent.
pub(super) async fn v1_docker_handler(State(state): State<AppState>) -> Response {
    let snapshot = state.store.read();
    let containers: Vec<_> = snapshot
        .docker
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "name": c.name,
                "status": c.status,
                "image": c.image,
                "cpu_percent": c.stats.as_ref().map_or(0.0, |s| s.cpu_percent),
                "memory_percent": c.stats.as_ref().map_or(0.0, |s| s.mem_percent),
            })
        })
        .collect();
    Json(json!({
        "total": containers.len(),
        "containers": containers,
    }))
    .into_response()
}

fn gib(bytes: u64) -> f64 {
    (bytes as f64 / GIB * 100.0).round() / 100.0
}
