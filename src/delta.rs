// Delta engine: rates and percentages from two raw samples of the same subject.
// Pure functions; no I/O, no clock reads.

use crate::sampler::{ContainerCounters, CpuTicks, HostCounters, InterfaceCounters, RawSample};
use tokio::time::Instant;

/// Outcome of comparing two samples of one subject.
#[derive(Debug, Clone, PartialEq)]
pub enum Delta<T> {
    /// Both samples were usable.
    Rates(T),
    /// Subject is new or a cumulative counter went backwards: no rate this cycle,
    /// the current sample becomes the baseline.
    Rebaseline,
    /// The pair is unusable (elapsed time or tick span not positive): keep the
    /// previously published rate and the previous baseline.
    Discard,
}

impl<T> Delta<T> {
    pub fn rates(self) -> Option<T> {
        match self {
            Delta::Rates(t) => Some(t),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Delta<U> {
        match self {
            Delta::Rates(t) => Delta::Rates(f(t)),
            Delta::Rebaseline => Delta::Rebaseline,
            Delta::Discard => Delta::Discard,
        }
    }
}

/// What a delta is computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject<'a> {
    Host,
    Container(&'a str),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DerivedStats {
    Host(HostRates),
    Container(ContainerRates),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CpuRates {
    pub overall_percent: f64,
    pub per_core_percent: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceRates {
    pub name: String,
    pub sent_per_sec: f64,
    pub recv_per_sec: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkRates {
    pub sent_per_sec: f64,
    pub recv_per_sec: f64,
    pub interfaces: Vec<InterfaceRates>,
}

/// Host rates. CPU and network are judged independently so a bad network
/// counter does not cost the CPU reading.
#[derive(Debug, Clone, PartialEq)]
pub struct HostRates {
    pub cpu: Delta<CpuRates>,
    pub network: Delta<NetworkRates>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerRates {
    pub cpu_percent: f64,
    pub net_rx_per_sec: f64,
    pub net_tx_per_sec: f64,
    pub blk_read_per_sec: f64,
    pub blk_write_per_sec: f64,
}

/// Seconds between two timestamps; None when not strictly positive.
pub fn elapsed_secs(prev: Instant, curr: Instant) -> Option<f64> {
    curr.checked_duration_since(prev)
        .map(|d| d.as_secs_f64())
        .filter(|s| *s > 0.0)
}

/// `100 x Δbusy / Δtotal`, clamped to [0, 100].
pub fn cpu_percent(prev: &CpuTicks, curr: &CpuTicks) -> Delta<f64> {
    if curr.busy < prev.busy || curr.total < prev.total {
        return Delta::Rebaseline;
    }
    let d_total = curr.total - prev.total;
    if d_total == 0 {
        return Delta::Discard;
    }
    let d_busy = curr.busy - prev.busy;
    Delta::Rates((100.0 * d_busy as f64 / d_total as f64).clamp(0.0, 100.0))
}

/// Bytes per second of a cumulative counter; None on counter reset.
pub fn throughput(prev: u64, curr: u64, secs: f64) -> Option<f64> {
    curr.checked_sub(prev).map(|d| d as f64 / secs)
}

/// Overall and per-core CPU percent. The overall figure uses the summed ticks of all cores.
pub fn cpu_rates(prev: &[CpuTicks], curr: &[CpuTicks]) -> Delta<CpuRates> {
    if prev.is_empty() || prev.len() != curr.len() {
        return Delta::Rebaseline;
    }
    let overall = match cpu_percent(
        &prev.iter().copied().sum(),
        &curr.iter().copied().sum(),
    ) {
        Delta::Rates(p) => p,
        Delta::Rebaseline => return Delta::Rebaseline,
        Delta::Discard => return Delta::Discard,
    };
    let mut per_core = Vec::with_capacity(curr.len());
    for (p, c) in prev.iter().zip(curr) {
        match cpu_percent(p, c) {
            Delta::Rates(pct) => per_core.push(pct),
            // offline core: ticks did not move
            Delta::Discard => per_core.push(0.0),
            Delta::Rebaseline => return Delta::Rebaseline,
        }
    }
    Delta::Rates(CpuRates {
        overall_percent: overall,
        per_core_percent: per_core,
    })
}

/// Host throughput over interfaces present in both samples.
pub fn network_rates(
    prev: &[InterfaceCounters],
    curr: &[InterfaceCounters],
    secs: f64,
) -> Delta<NetworkRates> {
    let mut interfaces = Vec::with_capacity(curr.len());
    for c in curr {
        let Some(p) = prev.iter().find(|p| p.name == c.name) else {
            continue;
        };
        let (Some(sent), Some(recv)) = (
            throughput(p.bytes_sent, c.bytes_sent, secs),
            throughput(p.bytes_recv, c.bytes_recv, secs),
        ) else {
            return Delta::Rebaseline;
        };
        interfaces.push(InterfaceRates {
            name: c.name.clone(),
            sent_per_sec: sent,
            recv_per_sec: recv,
        });
    }
    if interfaces.is_empty() && !curr.is_empty() {
        return Delta::Rebaseline;
    }
    Delta::Rates(NetworkRates {
        sent_per_sec: interfaces.iter().map(|i| i.sent_per_sec).sum(),
        recv_per_sec: interfaces.iter().map(|i| i.recv_per_sec).sum(),
        interfaces,
    })
}

pub fn host_rates(prev: &HostCounters, curr: &HostCounters) -> HostRates {
    let Some(secs) = elapsed_secs(prev.taken_at, curr.taken_at) else {
        return HostRates {
            cpu: Delta::Discard,
            network: Delta::Discard,
        };
    };
    HostRates {
        cpu: cpu_rates(&prev.cpu, &curr.cpu),
        network: network_rates(&prev.interfaces, &curr.interfaces, secs),
    }
}

/// Container CPU follows the Docker CLI convention: percent of one core, so a
/// container may reach `100 x online_cpus`.
pub fn container_rates(prev: &ContainerCounters, curr: &ContainerCounters) -> Delta<ContainerRates> {
    let monotonic = [
        (prev.cpu_usage, curr.cpu_usage),
        (prev.system_cpu_usage, curr.system_cpu_usage),
        (prev.net_rx, curr.net_rx),
        (prev.net_tx, curr.net_tx),
        (prev.blk_read, curr.blk_read),
        (prev.blk_write, curr.blk_write),
    ];
    if monotonic.iter().any(|(p, c)| c < p) {
        return Delta::Rebaseline;
    }
    let Some(secs) = elapsed_secs(prev.taken_at, curr.taken_at) else {
        return Delta::Discard;
    };
    let d_system = curr.system_cpu_usage - prev.system_cpu_usage;
    if d_system == 0 {
        return Delta::Discard;
    }
    let online = curr.online_cpus.max(1) as f64;
    let d_cpu = (curr.cpu_usage - prev.cpu_usage) as f64;
    let cpu_percent = (d_cpu / d_system as f64 * online * 100.0).clamp(0.0, 100.0 * online);
    let per_sec = |p: u64, c: u64| (c - p) as f64 / secs;
    Delta::Rates(ContainerRates {
        cpu_percent,
        net_rx_per_sec: per_sec(prev.net_rx, curr.net_rx),
        net_tx_per_sec: per_sec(prev.net_tx, curr.net_tx),
        blk_read_per_sec: per_sec(prev.blk_read, curr.blk_read),
        blk_write_per_sec: per_sec(prev.blk_write, curr.blk_write),
    })
}

/// Rates for `subject` between two raw samples. A subject missing from `prev`
/// yields [`Delta::Rebaseline`], never zeros; a subject missing from `curr`
/// has nothing to report and is likewise [`Delta::Rebaseline`].
pub fn rate(prev: &RawSample, curr: &RawSample, subject: Subject<'_>) -> Delta<DerivedStats> {
    match subject {
        Subject::Host => match (&prev.host, &curr.host) {
            (Some(p), Some(c)) => Delta::Rates(DerivedStats::Host(host_rates(p, c))),
            _ => Delta::Rebaseline,
        },
        Subject::Container(id) => match (prev.container(id), curr.container(id)) {
            (Some(p), Some(c)) => container_rates(p, c).map(DerivedStats::Container),
            _ => Delta::Rebaseline,
        },
    }
}
