use anyhow::Result;
use hostwatch::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;

    let sysinfo_repo = sysinfo_repo::SysinfoRepo::new(
        &app_config.host.proc_path,
        &app_config.host.sys_path,
        &app_config.host.etc_path,
    );
    let system_info = sysinfo_repo
        .get_system_info()
        .await
        .map_err(|e| anyhow::anyhow!("system info: {}", e))?;
    tracing::info!(
        hostname = %system_info.hostname,
        os = %system_info.os,
        cores = system_info.cpu_count_logical,
        "system identity collected"
    );

    let docker_repo = if app_config.docker.enabled {
        match docker_repo::DockerRepo::connect(app_config.docker.socket.as_deref()) {
            Ok(repo) => Some(repo),
            Err(e) => {
                tracing::warn!(error = %e, "Docker client unavailable; container list stays empty");
                None
            }
        }
    } else {
        None
    };

    let sampler = Arc::new(sampler::SystemSampler::new(sysinfo_repo, docker_repo));
    let store = Arc::new(store::SnapshotStore::new(models::MetricsSnapshot::empty(
        system_info,
    )));
    let activity = Arc::new(activity::ActivityTracker::new());
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let worker_handle = worker::spawn(
        worker::WorkerDeps {
            sampler,
            store: store.clone(),
            activity: activity.clone(),
            shutdown_rx,
        },
        worker::WorkerConfig::from(&app_config.sampling),
    );

    let app = routes::app(store, activity, app_config.clone());
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
        }
    }

    let _ = shutdown_tx.send(());
    if let Err(e) = worker_handle.await {
        tracing::warn!(error = %e, "worker task ended abnormally");
    }
    Ok(())
}

/// Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
