// Network models

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceStat {
    pub name: String,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    /// Null until the interface has been seen in two consecutive samples.
    #[serde(default)]
    pub sent_per_sec: Option<f64>,
    #[serde(default)]
    pub recv_per_sec: Option<f64>,
}

/// Host network totals (cumulative counters) and throughput in bytes per second.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub errin: u64,
    pub errout: u64,
    #[serde(default)]
    pub dropin: u64,
    #[serde(default)]
    pub dropout: u64,
    pub sent_per_sec: f64,
    pub recv_per_sec: f64,
    pub interfaces: Vec<InterfaceStat>,
}
