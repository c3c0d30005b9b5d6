// Shared test helpers: a scripted sampler and engine wiring
#![allow(dead_code)]

use hostwatch::activity::ActivityTracker;
use hostwatch::models::*;
use hostwatch::sampler::*;
use hostwatch::store::SnapshotStore;
use hostwatch::worker::{self, WorkerConfig, WorkerDeps};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

/// Sampler whose counters advance by a fixed step on every call:
/// each core gains 50 busy and 50 idle ticks, `eth0` 1000 bytes each way,
/// container `abc123` 100 ns of CPU per 1000 ns of system CPU and 1,000,000 rx bytes.
pub struct FakeSampler {
    pub cores: usize,
    pub host_calls: AtomicU64,
    pub process_calls: AtomicU64,
    pub partition_calls: AtomicU64,
    pub container_calls: AtomicU64,
    pub fail: AtomicBool,
    /// Container listing answers with a runtime error.
    pub fail_containers: AtomicBool,
    /// How long a container read takes.
    pub container_delay: Duration,
    pub containers_in_flight: AtomicBool,
    pub host_times: Mutex<Vec<Instant>>,
    pub partition_times: Mutex<Vec<Instant>>,
}

impl FakeSampler {
    pub fn new(cores: usize) -> Self {
        Self {
            cores,
            host_calls: AtomicU64::new(0),
            process_calls: AtomicU64::new(0),
            partition_calls: AtomicU64::new(0),
            container_calls: AtomicU64::new(0),
            fail: AtomicBool::new(false),
            fail_containers: AtomicBool::new(false),
            container_delay: Duration::ZERO,
            containers_in_flight: AtomicBool::new(false),
            host_times: Mutex::new(Vec::new()),
            partition_times: Mutex::new(Vec::new()),
        }
    }

    /// Container reads that take `delay` each.
    pub fn with_container_delay(cores: usize, delay: Duration) -> Self {
        Self {
            container_delay: delay,
            ..Self::new(cores)
        }
    }

    pub fn host_calls(&self) -> u64 {
        self.host_calls.load(Ordering::SeqCst)
    }

    pub fn container_calls(&self) -> u64 {
        self.container_calls.load(Ordering::SeqCst)
    }

    /// Start times of cycles that read disks but not the host, i.e. idle cycles.
    pub fn idle_cycle_times(&self) -> Vec<Instant> {
        let host = self.host_times.lock().unwrap().clone();
        self.partition_times
            .lock()
            .unwrap()
            .iter()
            .copied()
            .filter(|t| !host.contains(t))
            .collect()
    }
}

impl Sampler for FakeSampler {
    async fn sample_host(&self) -> Result<HostCounters, SampleError> {
        let n = self.host_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.host_times.lock().unwrap().push(Instant::now());
        if self.fail.load(Ordering::SeqCst) {
            return Err(SampleError::Os {
                operation: "read_proc_stat",
                message: "scripted failure".into(),
            });
        }
        Ok(host_counters(Instant::now(), self.cores, n))
    }

    async fn sample_processes(&self, limit: usize) -> Result<Vec<ProcessStat>, SampleError> {
        self.process_calls.fetch_add(1, Ordering::SeqCst);
        Ok((1..=limit.min(3) as u32)
            .map(|pid| ProcessStat {
                pid,
                name: format!("proc{pid}"),
                cpu_percent: 1.0,
                memory_percent: 0.5,
                memory_mb: 12.0,
                status: "running".into(),
            })
            .collect())
    }

    async fn sample_partitions(&self) -> Result<Vec<PartitionStat>, SampleError> {
        self.partition_calls.fetch_add(1, Ordering::SeqCst);
        self.partition_times.lock().unwrap().push(Instant::now());
        Ok(vec![PartitionStat {
            device: "/dev/sda1".into(),
            model: Some("Test SSD".into()),
            mountpoint: "/".into(),
            fstype: "ext4".into(),
            total: 100,
            used: 40,
            free: 60,
            percent: 40.0,
        }])
    }

    async fn sample_containers(&self) -> Result<Vec<ContainerSample>, SampleError> {
        let n = self.container_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.container_delay.is_zero() {
            self.containers_in_flight.store(true, Ordering::SeqCst);
            tokio::time::sleep(self.container_delay).await;
            self.containers_in_flight.store(false, Ordering::SeqCst);
        }
        if self.fail_containers.load(Ordering::SeqCst) {
            return Err(SampleError::ContainerRuntime(
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 500,
                    message: "scripted outage".into(),
                },
            ));
        }
        Ok(vec![
            ContainerSample {
                id: "abc123".into(),
                name: "web".into(),
                image: "nginx:latest".into(),
                status: ContainerState::Running,
                ports: vec!["0.0.0.0:8080->80/tcp".into()],
                created: Some("2026-01-01T00:00:00Z".into()),
                counters: Some(container_counters(Instant::now(), n)),
            },
            ContainerSample {
                id: "def456".into(),
                name: "batch".into(),
                image: "busybox".into(),
                status: ContainerState::Exited,
                ports: vec![],
                created: None,
                counters: None,
            },
        ])
    }

    fn sample_uptime(&self) -> UptimeStats {
        UptimeStats {
            boot_time: "2026-01-01T00:00:00Z".into(),
            uptime_seconds: 90_061,
            uptime_formatted: UptimeStats::format_uptime(90_061),
            load_average: None,
        }
    }
}

/// Host counters after `n` steps.
pub fn host_counters(taken_at: Instant, cores: usize, n: u64) -> HostCounters {
    HostCounters {
        taken_at,
        cpu: vec![CpuTicks::new(n * 50, n * 50); cores],
        cpu_frequency_mhz: 2400,
        cpu_frequency_range_mhz: Some((800, 4200)),
        memory: MemoryCounters {
            total: 1000,
            available: 750,
            used: 250,
            swap_total: 0,
            swap_used: 0,
            swap_free: 0,
        },
        interfaces: vec![InterfaceCounters {
            name: "eth0".into(),
            bytes_sent: n * 1000,
            bytes_recv: n * 1000,
            packets_sent: n,
            packets_recv: n,
            errin: 0,
            errout: 0,
            dropin: n,
            dropout: 0,
        }],
    }
}

/// Container counters after `n` steps.
pub fn container_counters(taken_at: Instant, n: u64) -> ContainerCounters {
    ContainerCounters {
        taken_at,
        cpu_usage: n * 100,
        system_cpu_usage: n * 1000,
        online_cpus: 2,
        mem_usage: 256,
        mem_limit: 1024,
        net_rx: n * 1_000_000,
        net_tx: n * 500_000,
        blk_read: n * 4096,
        blk_write: n * 8192,
        pids: 3,
    }
}

pub fn system_info(cores: u32) -> SystemInfo {
    SystemInfo {
        hostname: "testhost".into(),
        os: "Test Linux".into(),
        os_version: "6.1.0".into(),
        architecture: "x86_64".into(),
        processor: "Test CPU".into(),
        cpu_count: cores,
        cpu_count_logical: cores,
    }
}

/// 1 s active, 30 s idle, idle after 5 s, disk and containers every 5 s while active.
pub fn worker_config() -> WorkerConfig {
    WorkerConfig {
        active_interval: Duration::from_secs(1),
        idle_interval: Duration::from_secs(30),
        idle_timeout: Duration::from_secs(5),
        disk_interval: Duration::from_secs(5),
        container_interval: Duration::from_secs(5),
        process_limit: 10,
    }
}

pub struct Engine {
    pub sampler: Arc<FakeSampler>,
    pub store: Arc<SnapshotStore>,
    pub activity: Arc<ActivityTracker>,
    pub shutdown_tx: oneshot::Sender<()>,
    pub handle: JoinHandle<()>,
}

pub fn spawn_engine(config: WorkerConfig) -> Engine {
    spawn_engine_with(FakeSampler::new(4), config)
}

pub fn spawn_engine_with(sampler: FakeSampler, config: WorkerConfig) -> Engine {
    let sampler = Arc::new(sampler);
    let store = Arc::new(SnapshotStore::new(MetricsSnapshot::empty(system_info(4))));
    let activity = Arc::new(ActivityTracker::new());
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle = worker::spawn(
        WorkerDeps {
            sampler: sampler.clone(),
            store: store.clone(),
            activity: activity.clone(),
            shutdown_rx,
        },
        config,
    );
    Engine {
        sampler,
        store,
        activity,
        shutdown_tx,
        handle,
    }
}
