// Counter sampler: point-in-time cumulative counters from the OS and the container runtime.
// Stateless per call as far as the engine is concerned; the delta baseline lives in the worker.

use crate::docker_repo::DockerRepo;
use crate::models::{ContainerState, PartitionStat, ProcessStat, UptimeStats};
use crate::sysinfo_repo::SysinfoRepo;
use std::future::Future;
use tokio::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("{operation} failed: {message}")]
    Os {
        operation: &'static str,
        message: String,
    },
    #[error("container runtime: {0}")]
    ContainerRuntime(#[from] bollard::errors::Error),
    #[error("sampling task join: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl SampleError {
    pub(crate) fn os(operation: &'static str, message: impl std::fmt::Display) -> Self {
        SampleError::Os {
            operation,
            message: message.to_string(),
        }
    }
}

/// Cumulative CPU ticks of one core. `total` is always `busy + idle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTicks {
    pub busy: u64,
    pub idle: u64,
    pub total: u64,
}

impl CpuTicks {
    pub fn new(busy: u64, idle: u64) -> Self {
        Self {
            busy,
            idle,
            total: busy.saturating_add(idle),
        }
    }
}

impl std::iter::Sum for CpuTicks {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(CpuTicks::default(), |acc, t| CpuTicks {
            busy: acc.busy.saturating_add(t.busy),
            idle: acc.idle.saturating_add(t.idle),
            total: acc.total.saturating_add(t.total),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryCounters {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub swap_total: u64,
    pub swap_used: u64,
    pub swap_free: u64,
}

/// Cumulative counters of one network interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub name: String,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub errin: u64,
    pub errout: u64,
    pub dropin: u64,
    pub dropout: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostCounters {
    pub taken_at: Instant,
    /// Per-core ticks in core index order.
    pub cpu: Vec<CpuTicks>,
    pub cpu_frequency_mhz: u64,
    /// Hardware frequency limits (min, max) in MHz, where the platform exposes them.
    pub cpu_frequency_range_mhz: Option<(u64, u64)>,
    pub memory: MemoryCounters,
    pub interfaces: Vec<InterfaceCounters>,
}

/// Cumulative counters of one running container, as read from a one-shot stats call.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerCounters {
    pub taken_at: Instant,
    /// Container CPU time, nanoseconds.
    pub cpu_usage: u64,
    /// Host CPU time across all cores, nanoseconds.
    pub system_cpu_usage: u64,
    pub online_cpus: u32,
    pub mem_usage: u64,
    pub mem_limit: u64,
    pub net_rx: u64,
    pub net_tx: u64,
    pub blk_read: u64,
    pub blk_write: u64,
    pub pids: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSample {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: ContainerState,
    pub ports: Vec<String>,
    pub created: Option<String>,
    /// None for containers that are not running or whose stats read failed.
    pub counters: Option<ContainerCounters>,
}

/// Which parts of the system a cycle reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleScope {
    pub host: bool,
    pub processes: bool,
    pub partitions: bool,
    pub containers: bool,
}

impl SampleScope {
    pub const ALL: SampleScope = SampleScope {
        host: true,
        processes: true,
        partitions: true,
        containers: true,
    };
}

/// One cycle's raw readings. Parts outside the cycle's scope are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub taken_at: Instant,
    pub host: Option<HostCounters>,
    pub processes: Option<Vec<ProcessStat>>,
    pub partitions: Option<Vec<PartitionStat>>,
    pub containers: Option<Vec<ContainerSample>>,
    pub uptime: UptimeStats,
}

impl RawSample {
    /// A sample holding nothing; used as the baseline before the first cycle.
    pub fn empty(taken_at: Instant) -> Self {
        Self {
            taken_at,
            host: None,
            processes: None,
            partitions: None,
            containers: None,
            uptime: UptimeStats::default(),
        }
    }

    pub fn container(&self, id: &str) -> Option<&ContainerCounters> {
        self.containers
            .as_ref()?
            .iter()
            .find(|c| c.id == id)?
            .counters
            .as_ref()
    }
}

/// Source of raw counters. Implemented by [`SystemSampler`] for real hosts and by
/// fakes in tests.
pub trait Sampler: Send + Sync + 'static {
    fn sample_host(&self) -> impl Future<Output = Result<HostCounters, SampleError>> + Send;

    fn sample_processes(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ProcessStat>, SampleError>> + Send;

    fn sample_partitions(
        &self,
    ) -> impl Future<Output = Result<Vec<PartitionStat>, SampleError>> + Send;

    /// An absent runtime is an empty list. A runtime that is configured but failed to
    /// answer is [`SampleError::ContainerRuntime`].
    fn sample_containers(
        &self,
    ) -> impl Future<Output = Result<Vec<ContainerSample>, SampleError>> + Send;

    fn sample_uptime(&self) -> UptimeStats;
}

/// Reads everything `scope` asks for. Any failure fails the whole sample, except a
/// container runtime error, which leaves `containers` unread for this cycle.
pub async fn sample<S: Sampler>(
    sampler: &S,
    scope: SampleScope,
    process_limit: usize,
) -> Result<RawSample, SampleError> {
    let taken_at = Instant::now();
    let host = if scope.host {
        Some(sampler.sample_host().await?)
    } else {
        None
    };
    let processes = if scope.processes {
        Some(sampler.sample_processes(process_limit).await?)
    } else {
        None
    };
    let partitions = if scope.partitions {
        Some(sampler.sample_partitions().await?)
    } else {
        None
    };
    let containers = if scope.containers {
        match sampler.sample_containers().await {
            Ok(containers) => Some(containers),
            Err(e @ SampleError::ContainerRuntime(_)) => {
                tracing::debug!(error = %e, "containers not read this cycle");
                None
            }
            Err(e) => return Err(e),
        }
    } else {
        None
    };
    Ok(RawSample {
        taken_at,
        host,
        processes,
        partitions,
        containers,
        uptime: sampler.sample_uptime(),
    })
}

/// Production sampler: sysinfo + procfs for the host, bollard for containers.
pub struct SystemSampler {
    sysinfo: SysinfoRepo,
    docker: Option<DockerRepo>,
}

impl SystemSampler {
    /// `docker` is `None` when no container runtime is configured; containers are then always empty.
    pub fn new(sysinfo: SysinfoRepo, docker: Option<DockerRepo>) -> Self {
        Self { sysinfo, docker }
    }
}

impl Sampler for SystemSampler {
    async fn sample_host(&self) -> Result<HostCounters, SampleError> {
        self.sysinfo.get_host_counters().await
    }

    async fn sample_processes(&self, limit: usize) -> Result<Vec<ProcessStat>, SampleError> {
        self.sysinfo.get_processes(limit).await
    }

    async fn sample_partitions(&self) -> Result<Vec<PartitionStat>, SampleError> {
        self.sysinfo.get_partitions().await
    }

    async fn sample_containers(&self) -> Result<Vec<ContainerSample>, SampleError> {
        match &self.docker {
            Some(docker) => docker.sample_containers().await,
            None => Ok(vec![]),
        }
    }

    fn sample_uptime(&self) -> UptimeStats {
        self.sysinfo.get_uptime()
    }
}
