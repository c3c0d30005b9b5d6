// Adaptive scheduler: the background loop that samples, derives rates and publishes.
//
// Every server process runs its own copy of this worker, with its own activity state and
// its own snapshot. Behind a multi-process server each process samples independently;
// whether to centralize sampling behind one process is a deployment decision left open.

use crate::activity::ActivityTracker;
use crate::config::SamplingConfig;
use crate::delta::{self, DerivedStats, Delta, Subject};
use crate::models::{
    ContainerStats, ContainerUsage, DiskStats, InterfaceStat, MemoryStats, MetricsSnapshot,
    SamplingMode, now_rfc3339,
};
use crate::sampler::{
    self, ContainerCounters, ContainerSample, InterfaceCounters, MemoryCounters, RawSample,
    SampleScope, Sampler,
};
use crate::store::SnapshotStore;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::{Duration, Instant};
use tracing::Instrument;

/// Shortest pause between two cycles, also when a cycle overran its interval.
const MIN_PAUSE: Duration = Duration::from_millis(50);

/// Sampler, shared state and shutdown for the worker.
pub struct WorkerDeps<S> {
    pub sampler: Arc<S>,
    pub store: Arc<SnapshotStore>,
    pub activity: Arc<ActivityTracker>,
    pub shutdown_rx: oneshot::Receiver<()>,
}

/// Worker cadence.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub active_interval: Duration,
    pub idle_interval: Duration,
    pub idle_timeout: Duration,
    /// Disk refresh period while active.
    pub disk_interval: Duration,
    /// Container refresh period while active.
    pub container_interval: Duration,
    pub process_limit: usize,
}

impl From<&SamplingConfig> for WorkerConfig {
    fn from(c: &SamplingConfig) -> Self {
        Self {
            active_interval: c.active_interval(),
            idle_interval: c.idle_interval(),
            idle_timeout: c.idle_timeout(),
            disk_interval: c.disk_interval(),
            container_interval: c.container_interval(),
            process_limit: c.process_limit,
        }
    }
}

impl WorkerConfig {
    fn interval(&self, mode: SamplingMode) -> Duration {
        match mode {
            SamplingMode::Active => self.active_interval,
            SamplingMode::Idle => self.idle_interval,
        }
    }
}

/// Mode for a cycle, given how long no request has been seen.
pub fn next_mode(idle_for: Duration, idle_timeout: Duration) -> SamplingMode {
    if idle_for >= idle_timeout {
        SamplingMode::Idle
    } else {
        SamplingMode::Active
    }
}

/// When disk and containers were last read.
#[derive(Debug, Default)]
struct Cadence {
    last_partitions_at: Option<Instant>,
    last_containers_at: Option<Instant>,
}

impl Cadence {
    fn scope(&self, mode: SamplingMode, now: Instant, config: &WorkerConfig) -> SampleScope {
        let due = |last: Option<Instant>, every: Duration| {
            last.is_none_or(|t| now.saturating_duration_since(t) >= every)
        };
        match mode {
            SamplingMode::Active => SampleScope {
                host: true,
                processes: true,
                partitions: due(self.last_partitions_at, config.disk_interval),
                containers: due(self.last_containers_at, config.container_interval),
            },
            SamplingMode::Idle => SampleScope {
                host: false,
                processes: false,
                partitions: true,
                containers: true,
            },
        }
    }

    /// Only parts actually read count; a part that could not be read is due again.
    fn record(&mut self, sample: &RawSample, at: Instant) {
        if sample.partitions.is_some() {
            self.last_partitions_at = Some(at);
        }
        if sample.containers.is_some() {
            self.last_containers_at = Some(at);
        }
    }
}

/// Build the next snapshot from `prev` and a fresh `sample`, and the baseline for the next cycle.
///
/// Parts the sample did not read are carried forward from `prev`. A rate that could
/// not be derived this cycle keeps its previous value, except for a container seen for
/// the first time or after a counter reset, whose stats are absent.
pub fn compose(
    prev: &MetricsSnapshot,
    baseline: &RawSample,
    sample: &RawSample,
    mode: SamplingMode,
    sequence: u64,
) -> (MetricsSnapshot, RawSample) {
    let mut next = MetricsSnapshot {
        timestamp: now_rfc3339(),
        sequence,
        mode,
        uptime: sample.uptime.clone(),
        ..prev.clone()
    };
    let mut next_baseline = RawSample {
        taken_at: sample.taken_at,
        host: baseline.host.clone(),
        processes: None,
        partitions: None,
        containers: baseline.containers.clone(),
        uptime: sample.uptime.clone(),
    };

    if let Some(host) = &sample.host {
        let rates = match delta::rate(baseline, sample, Subject::Host) {
            Delta::Rates(DerivedStats::Host(r)) => Some(r),
            _ => None,
        };

        if let Some(Delta::Rates(cpu)) = rates.as_ref().map(|r| &r.cpu) {
            next.cpu.overall_percent = cpu.overall_percent;
            next.cpu.per_core_percent = cpu.per_core_percent.clone();
        }
        if next.cpu.per_core_percent.len() != host.cpu.len() {
            next.cpu.per_core_percent = vec![0.0; host.cpu.len()];
        }
        next.cpu.frequency_mhz = host.cpu_frequency_mhz;
        next.cpu.frequency_min_mhz = host.cpu_frequency_range_mhz.map(|(min, _)| min);
        next.cpu.frequency_max_mhz = host.cpu_frequency_range_mhz.map(|(_, max)| max);
        next.memory = memory_stats(&host.memory);

        let network = match rates.as_ref().map(|r| &r.network) {
            Some(Delta::Rates(n)) => Some(n),
            _ => None,
        };
        let interfaces: Vec<InterfaceStat> = host
            .interfaces
            .iter()
            .map(|i| {
                // An interface absent from the baseline has no rate yet.
                let (sent_per_sec, recv_per_sec) = match network {
                    Some(n) => n
                        .interfaces
                        .iter()
                        .find(|r| r.name == i.name)
                        .map_or((None, None), |r| {
                            (Some(r.sent_per_sec), Some(r.recv_per_sec))
                        }),
                    None => prev
                        .network
                        .interfaces
                        .iter()
                        .find(|p| p.name == i.name)
                        .map_or((None, None), |p| (p.sent_per_sec, p.recv_per_sec)),
                };
                InterfaceStat {
                    name: i.name.clone(),
                    bytes_sent: i.bytes_sent,
                    bytes_recv: i.bytes_recv,
                    sent_per_sec,
                    recv_per_sec,
                }
            })
            .collect();
        let sum = |f: fn(&InterfaceCounters) -> u64| {
            host.interfaces.iter().map(f).fold(0u64, u64::saturating_add)
        };
        next.network.bytes_sent = sum(|i| i.bytes_sent);
        next.network.bytes_recv = sum(|i| i.bytes_recv);
        next.network.packets_sent = sum(|i| i.packets_sent);
        next.network.packets_recv = sum(|i| i.packets_recv);
        next.network.errin = sum(|i| i.errin);
        next.network.errout = sum(|i| i.errout);
        next.network.dropin = sum(|i| i.dropin);
        next.network.dropout = sum(|i| i.dropout);
        if let Some(n) = network {
            next.network.sent_per_sec = n.sent_per_sec;
            next.network.recv_per_sec = n.recv_per_sec;
        }
        next.network.interfaces = interfaces;

        // A pair with no positive elapsed time keeps the old baseline.
        let unusable = baseline
            .host
            .as_ref()
            .is_some_and(|b| delta::elapsed_secs(b.taken_at, host.taken_at).is_none());
        if !unusable {
            next_baseline.host = Some(host.clone());
        }
    }

    if let Some(processes) = &sample.processes {
        next.processes = processes.clone();
    }

    if let Some(partitions) = &sample.partitions {
        next.disk = DiskStats {
            partitions: partitions.clone(),
        };
    }

    if let Some(containers) = &sample.containers {
        let mut docker = Vec::with_capacity(containers.len());
        let mut retained = Vec::with_capacity(containers.len());
        for c in containers {
            let derived = delta::rate(baseline, sample, Subject::Container(&c.id));
            let (stats, counters) = match (&c.counters, derived) {
                (Some(curr), Delta::Rates(DerivedStats::Container(r))) => {
                    (Some(container_usage(curr, &r)), Some(curr.clone()))
                }
                (Some(_), Delta::Discard) => (
                    prev.docker
                        .iter()
                        .find(|p| p.id == c.id)
                        .and_then(|p| p.stats.clone()),
                    baseline.container(&c.id).cloned(),
                ),
                (curr, _) => (None, curr.clone()),
            };
            docker.push(ContainerStats {
                id: c.id.clone(),
                name: c.name.clone(),
                image: c.image.clone(),
                status: c.status,
                ports: c.ports.clone(),
                created: c.created.clone(),
                stats,
            });
            retained.push(ContainerSample {
                counters,
                ..c.clone()
            });
        }
        next.docker = docker;
        next_baseline.containers = Some(retained);
    }

    (next, next_baseline)
}

fn memory_stats(m: &MemoryCounters) -> MemoryStats {
    MemoryStats {
        total: m.total,
        available: m.available,
        used: m.used,
        percent: percent(m.used, m.total),
        swap_total: m.swap_total,
        swap_used: m.swap_used,
        swap_free: m.swap_free,
        swap_percent: percent(m.swap_used, m.swap_total),
    }
}

fn container_usage(c: &ContainerCounters, r: &delta::ContainerRates) -> ContainerUsage {
    ContainerUsage {
        cpu_percent: r.cpu_percent,
        mem_usage: c.mem_usage,
        mem_limit: c.mem_limit,
        mem_percent: percent(c.mem_usage, c.mem_limit),
        net_rx: r.net_rx_per_sec,
        net_tx: r.net_tx_per_sec,
        blk_read: r.blk_read_per_sec,
        blk_write: r.blk_write_per_sec,
        pids: c.pids,
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Evaluate the mode and log a transition. Going idle drops any stale wake, then
/// re-checks activity after the flag is raised so a request racing the transition
/// still wakes the worker.
fn observe_mode(
    activity: &ActivityTracker,
    current: SamplingMode,
    idle_timeout: Duration,
) -> SamplingMode {
    let mut next = next_mode(activity.idle_for(), idle_timeout);
    if next == SamplingMode::Idle && current == SamplingMode::Active {
        activity.clear_wake();
        activity.set_idle(true);
        if activity.idle_for() < idle_timeout {
            next = SamplingMode::Active;
        }
    }
    if next == SamplingMode::Active {
        activity.set_idle(false);
    }
    if next != current {
        tracing::info!(
            from = ?current,
            to = ?next,
            idle_for_ms = activity.idle_for().as_millis() as u64,
            "sampling mode changed"
        );
    }
    next
}

/// Spawn the scheduler loop. The first cycle runs immediately; the loop ends only
/// when `shutdown_rx` fires (or its sender is dropped).
pub fn spawn<S: Sampler>(deps: WorkerDeps<S>, config: WorkerConfig) -> tokio::task::JoinHandle<()> {
    let WorkerDeps {
        sampler,
        store,
        activity,
        mut shutdown_rx,
    } = deps;

    let worker_span = tracing::span!(
        tracing::Level::DEBUG,
        "worker",
        active_interval_ms = config.active_interval.as_millis() as u64,
        idle_interval_ms = config.idle_interval.as_millis() as u64,
    );

    tokio::spawn(
        async move {
            let mut baseline = RawSample::empty(Instant::now());
            let mut cadence = Cadence::default();
            let mut mode = SamplingMode::Active;
            let mut sequence: u64 = 0;

            loop {
                let cycle_start = Instant::now();
                mode = observe_mode(&activity, mode, config.idle_timeout);
                let scope = cadence.scope(mode, cycle_start, &config);

                match sampler::sample(sampler.as_ref(), scope, config.process_limit).await {
                    Ok(sample) => {
                        sequence += 1;
                        let (snapshot, next_baseline) =
                            compose(&store.read(), &baseline, &sample, mode, sequence);
                        store.publish(snapshot);
                        baseline = next_baseline;
                        cadence.record(&sample, cycle_start);
                        tracing::debug!(
                            operation = "publish",
                            sequence,
                            ?mode,
                            elapsed_ms = cycle_start.elapsed().as_millis() as u64,
                            "snapshot published"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            operation = "sample",
                            ?mode,
                            "sampling failed; keeping previous snapshot"
                        );
                    }
                }

                mode = observe_mode(&activity, mode, config.idle_timeout);
                let pause = config
                    .interval(mode)
                    .saturating_sub(cycle_start.elapsed())
                    .max(MIN_PAUSE);

                tokio::select! {
                    _ = &mut shutdown_rx => {
                        tracing::debug!("Worker shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(pause) => {}
                    _ = activity.woken(), if mode == SamplingMode::Idle => {
                        tracing::debug!("woken by request");
                    }
                }
            }
        }
        .instrument(worker_span),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WorkerConfig {
        WorkerConfig::from(&SamplingConfig::default())
    }

    fn read_everything(at: Instant) -> RawSample {
        RawSample {
            partitions: Some(vec![]),
            containers: Some(vec![]),
            ..RawSample::empty(at)
        }
    }

    #[test]
    fn next_mode_switches_at_timeout() {
        let timeout = Duration::from_secs(5);
        assert_eq!(next_mode(Duration::from_millis(4999), timeout), SamplingMode::Active);
        assert_eq!(next_mode(Duration::from_secs(5), timeout), SamplingMode::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn active_scope_reads_disk_and_containers_only_when_due() {
        let config = config();
        let mut cadence = Cadence::default();
        let t0 = Instant::now();
        assert_eq!(cadence.scope(SamplingMode::Active, t0, &config), SampleScope::ALL);
        cadence.record(&read_everything(t0), t0);

        let scope = cadence.scope(SamplingMode::Active, t0 + Duration::from_secs(1), &config);
        assert!(scope.host && scope.processes);
        assert!(!scope.partitions && !scope.containers);

        let scope = cadence.scope(SamplingMode::Active, t0 + Duration::from_secs(5), &config);
        assert!(scope.partitions && scope.containers);
    }

    #[tokio::test(start_paused = true)]
    async fn unread_containers_stay_due() {
        let config = config();
        let mut cadence = Cadence::default();
        let t0 = Instant::now();
        let mut sample = read_everything(t0);
        sample.containers = None;
        cadence.record(&sample, t0);

        let scope = cadence.scope(SamplingMode::Active, t0 + Duration::from_secs(1), &config);
        assert!(!scope.partitions);
        assert!(scope.containers);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_scope_skips_host_and_processes() {
        let cadence = Cadence::default();
        let scope = cadence.scope(SamplingMode::Idle, Instant::now(), &config());
        assert!(!scope.host && !scope.processes);
        assert!(scope.partitions && scope.containers);
    }

    #[test]
    fn percent_of_zero_is_zero() {
        assert_eq!(percent(5, 0), 0.0);
        assert_eq!(percent(1, 4), 25.0);
    }
}
