// CPU, memory, uptime, system identity and the published snapshot

use serde::{Deserialize, Serialize};

use super::{ContainerStats, DiskStats, NetworkStats, ProcessStat};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuStats {
    pub overall_percent: f64,
    /// One entry per logical core, in core index order.
    pub per_core_percent: Vec<f64>,
    pub frequency_mhz: u64,
    /// Hardware limits; null where the platform does not expose them.
    #[serde(default)]
    pub frequency_min_mhz: Option<u64>,
    #[serde(default)]
    pub frequency_max_mhz: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub percent: f64,
    pub swap_total: u64,
    pub swap_used: u64,
    pub swap_free: u64,
    pub swap_percent: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UptimeStats {
    pub boot_time: String,
    pub uptime_seconds: u64,
    pub uptime_formatted: String,
    pub load_average: Option<LoadAverage>,
}

impl UptimeStats {
    /// "{d}d {h}h {m}m {s}s"
    pub fn format_uptime(secs: u64) -> String {
        format!(
            "{}d {}h {}m {}s",
            secs / 86_400,
            (secs % 86_400) / 3600,
            (secs % 3600) / 60,
            secs % 60
        )
    }
}

/// Static system identity; collected once at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub hostname: String,
    pub os: String,
    pub os_version: String,
    pub architecture: String,
    pub processor: String,
    pub cpu_count: u32,
    pub cpu_count_logical: u32,
}

/// Scheduler cadence at the time a snapshot was published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingMode {
    #[default]
    Active,
    Idle,
}

/// The reader-facing view. Replaced wholesale on every publish; all fields
/// come from the same scheduler cycle (or were carried forward by it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    /// Cycle number of the publish; 0 for the initial snapshot.
    pub sequence: u64,
    pub mode: SamplingMode,
    pub system: SystemInfo,
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    pub uptime: UptimeStats,
    pub network: NetworkStats,
    pub disk: DiskStats,
    pub processes: Vec<ProcessStat>,
    pub docker: Vec<ContainerStats>,
}

impl MetricsSnapshot {
    /// Well-formed snapshot served before the first cycle completes.
    pub fn empty(system: SystemInfo) -> Self {
        let cores = system.cpu_count_logical as usize;
        Self {
            timestamp: now_rfc3339(),
            sequence: 0,
            mode: SamplingMode::Active,
            system,
            cpu: CpuStats {
                overall_percent: 0.0,
                per_core_percent: vec![0.0; cores],
                ..Default::default()
            },
            memory: MemoryStats::default(),
            uptime: UptimeStats::default(),
            network: NetworkStats::default(),
            disk: DiskStats::default(),
            processes: vec![],
            docker: vec![],
        }
    }
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
