// Docker container models

use serde::{Deserialize, Serialize};

/// Docker container state; serializes to lowercase JSON (e.g. "running").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Running,
    Created,
    Exited,
    Paused,
    Restarting,
    Removing,
    Dead,
    #[serde(other)]
    Unknown,
}

impl ContainerState {
    /// Parse from Docker API state string (e.g. "running", "exited").
    pub fn from_docker(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "running" => ContainerState::Running,
            "created" => ContainerState::Created,
            "exited" => ContainerState::Exited,
            "paused" => ContainerState::Paused,
            "restarting" => ContainerState::Restarting,
            "removing" => ContainerState::Removing,
            "dead" => ContainerState::Dead,
            _ => ContainerState::Unknown,
        }
    }
}

/// One container as published: identity always, usage only once two
/// consecutive samples of the same container exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerStats {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: ContainerState,
    /// Published ports, e.g. "0.0.0.0:8080->80/tcp" or "6379/tcp".
    #[serde(default)]
    pub ports: Vec<String>,
    /// Creation time, RFC 3339.
    #[serde(default)]
    pub created: Option<String>,
    pub stats: Option<ContainerUsage>,
}

/// Derived per-container readings. I/O fields are bytes per second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerUsage {
    pub cpu_percent: f64,
    pub mem_usage: u64,
    pub mem_limit: u64,
    pub mem_percent: f64,
    pub net_rx: f64,
    pub net_tx: f64,
    pub blk_read: f64,
    pub blk_write: f64,
    pub pids: u64,
}
