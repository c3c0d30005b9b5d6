// Published snapshot models (serialized by the HTTP layer)

mod container;
mod network;
mod process;
mod storage;
mod system;

pub use container::{ContainerState, ContainerStats, ContainerUsage};
pub use network::{InterfaceStat, NetworkStats};
pub use process::ProcessStat;
pub use storage::{DiskStats, PartitionStat};
pub use system::{
    CpuStats, LoadAverage, MemoryStats, MetricsSnapshot, SamplingMode, SystemInfo, UptimeStats,
};

pub(crate) use system::now_rfc3339;
