// Extract cumulative counters from a raw Docker stats API response.

use crate::sampler::ContainerCounters;
use bollard::models::ContainerStatsResponse;
use tokio::time::Instant;

/// Cumulative counters of one container. None when the response carries no CPU
/// usage (e.g. the container stopped between list and stats).
pub(crate) fn extract_counters(
    s: &ContainerStatsResponse,
    taken_at: Instant,
) -> Option<ContainerCounters> {
    let cpu_stats = s.cpu_stats.as_ref()?;
    let cpu_usage = cpu_stats.cpu_usage.as_ref()?;

    let online_cpus = cpu_stats
        .online_cpus
        .map(|n| n as u32)
        .filter(|n| *n > 0)
        .or_else(|| {
            cpu_usage
                .percpu_usage
                .as_ref()
                .map(|p| p.len() as u32)
                .filter(|n| *n > 0)
        })
        .unwrap_or(1);

    let mem_usage = s.memory_stats.as_ref().and_then(|m| m.usage).unwrap_or(0);
    let mem_limit = s.memory_stats.as_ref().and_then(|m| m.limit).unwrap_or(0);

    let (net_rx, net_tx) = s.networks.as_ref().map_or((0u64, 0u64), |n| {
        n.values().fold((0u64, 0u64), |(rx, tx), v| {
            (
                rx.saturating_add(v.rx_bytes.unwrap_or(0)),
                tx.saturating_add(v.tx_bytes.unwrap_or(0)),
            )
        })
    });

    let (blk_read, blk_write) = s
        .blkio_stats
        .as_ref()
        .and_then(|b| b.io_service_bytes_recursive.as_ref())
        .map_or((0u64, 0u64), |b| {
            let mut read = 0u64;
            let mut write = 0u64;
            for e in b {
                let op = e.op.as_deref().unwrap_or_default();
                if op.eq_ignore_ascii_case("read") {
                    read = read.saturating_add(e.value.unwrap_or(0));
                } else if op.eq_ignore_ascii_case("write") {
                    write = write.saturating_add(e.value.unwrap_or(0));
                }
            }
            (read, write)
        });

    let pids = s.pids_stats.as_ref().and_then(|p| p.current).unwrap_or(0);

    Some(ContainerCounters {
        taken_at,
        cpu_usage: cpu_usage.total_usage.unwrap_or(0),
        system_cpu_usage: cpu_stats.system_cpu_usage.unwrap_or(0),
        online_cpus,
        mem_usage,
        mem_limit,
        net_rx,
        net_tx,
        blk_read,
        blk_write,
        pids,
    })
}
