use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub docker: DockerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Scheduler cadence. Active mode samples everything every `active_interval_ms`;
/// idle mode only refreshes disk and containers every `idle_interval_ms`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub active_interval_ms: u64,
    pub idle_interval_ms: u64,
    /// No request for this long switches the scheduler to idle mode.
    pub idle_timeout_ms: u64,
    pub disk_interval_ms: u64,
    pub container_interval_ms: u64,
    pub process_limit: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            active_interval_ms: 1000,
            idle_interval_ms: 30_000,
            idle_timeout_ms: 5000,
            disk_interval_ms: 5000,
            container_interval_ms: 5000,
            process_limit: 10,
        }
    }
}

impl SamplingConfig {
    pub fn active_interval(&self) -> Duration {
        Duration::from_millis(self.active_interval_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Disk refresh period in active mode; never shorter than the active interval.
    pub fn disk_interval(&self) -> Duration {
        Duration::from_millis(self.disk_interval_ms.max(self.active_interval_ms))
    }

    /// Container refresh period in active mode; never shorter than the active interval.
    pub fn container_interval(&self) -> Duration {
        Duration::from_millis(self.container_interval_ms.max(self.active_interval_ms))
    }
}

/// Where host pseudo-filesystems live (bind mounts when running inside a container).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub proc_path: String,
    pub sys_path: String,
    pub etc_path: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            proc_path: "/proc".into(),
            sys_path: "/sys".into(),
            etc_path: "/etc".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    pub enabled: bool,
    /// Unix socket path; local defaults when unset.
    pub socket: Option<String>,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            socket: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            self.sampling.active_interval_ms > 0,
            "sampling.active_interval_ms must be > 0, got {}",
            self.sampling.active_interval_ms
        );
        anyhow::ensure!(
            self.sampling.idle_interval_ms > 0,
            "sampling.idle_interval_ms must be > 0, got {}",
            self.sampling.idle_interval_ms
        );
        anyhow::ensure!(
            self.sampling.idle_interval_ms >= self.sampling.active_interval_ms,
            "sampling.idle_interval_ms ({}) must be >= sampling.active_interval_ms ({})",
            self.sampling.idle_interval_ms,
            self.sampling.active_interval_ms
        );
        anyhow::ensure!(
            self.sampling.idle_timeout_ms > 0,
            "sampling.idle_timeout_ms must be > 0, got {}",
            self.sampling.idle_timeout_ms
        );
        anyhow::ensure!(
            self.sampling.disk_interval_ms > 0,
            "sampling.disk_interval_ms must be > 0, got {}",
            self.sampling.disk_interval_ms
        );
        anyhow::ensure!(
            self.sampling.container_interval_ms > 0,
            "sampling.container_interval_ms must be > 0, got {}",
            self.sampling.container_interval_ms
        );
        anyhow::ensure!(
            self.sampling.process_limit > 0,
            "sampling.process_limit must be > 0, got {}",
            self.sampling.process_limit
        );
        anyhow::ensure!(
            !self.host.proc_path.is_empty(),
            "host.proc_path must be non-empty"
        );
        anyhow::ensure!(
            !self.host.sys_path.is_empty(),
            "host.sys_path must be non-empty"
        );
        anyhow::ensure!(
            !self.host.etc_path.is_empty(),
            "host.etc_path must be non-empty"
        );
        if let Some(socket) = &self.docker.socket {
            anyhow::ensure!(!socket.is_empty(), "docker.socket must be non-empty when set");
        }
        Ok(())
    }
}
