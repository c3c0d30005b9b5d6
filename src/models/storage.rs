// Storage / disk models

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionStat {
    pub device: String,
    /// Model of the underlying disk, from `<sys>/block/*/device/model`.
    #[serde(default)]
    pub model: Option<String>,
    pub mountpoint: String,
    pub fstype: String,
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskStats {
    pub partitions: Vec<PartitionStat>,
}
