// Host counters via sysinfo, with procfs and sysfs read directly wherever the host's
// view can differ from the engine's own namespace (per-core ticks, network, uptime,
// and processes and mounts when pointed at a bind-mounted /proc).

mod linux;

use crate::models::{LoadAverage, PartitionStat, ProcessStat, SystemInfo, UptimeStats};
use crate::sampler::{CpuTicks, HostCounters, InterfaceCounters, MemoryCounters, SampleError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use sysinfo::{Disks, Networks, ProcessesToUpdate, System};
use tokio::time::Instant;
use tracing::instrument;

/// Filesystems that never represent real storage.
const VIRTUAL_FS_TYPES: &[&str] = &[
    "squashfs", "tmpfs", "devtmpfs", "proc", "sysfs", "devpts", "cgroup", "overlay", "efivarfs",
    "fuse",
];

/// Interface name prefixes excluded from host network totals.
const EXCLUDED_INTERFACE_PREFIXES: &[&str] = &["lo", "docker", "veth", "br-"];

/// Scale of the synthetic tick counters used where procfs is unavailable.
const SYNTHETIC_TICKS_PER_SAMPLE: u64 = 10_000;

pub struct SysinfoRepo {
    sys: Arc<Mutex<System>>,
    disks: Arc<Mutex<Disks>>,
    networks: Arc<Mutex<Networks>>,
    synthetic_ticks: Arc<Mutex<Vec<CpuTicks>>>,
    process_ticks: Arc<Mutex<ProcessTicks>>,
    proc_path: PathBuf,
    sys_path: PathBuf,
    etc_path: PathBuf,
}

/// CPU time seen at the previous procfs process scan.
#[derive(Debug, Default)]
struct ProcessTicks {
    /// Sum of every core's ticks.
    total: u64,
    per_pid: HashMap<u32, u64>,
}

/// A mounted filesystem with its space, before filtering.
#[derive(Debug, Clone)]
struct MountedFs {
    device: String,
    mountpoint: String,
    fstype: String,
    total: u64,
    free: u64,
}

impl Default for SysinfoRepo {
    fn default() -> Self {
        Self::new("/proc", "/sys", "/etc")
    }
}

impl SysinfoRepo {
    pub fn new(
        proc_path: impl Into<PathBuf>,
        sys_path: impl Into<PathBuf>,
        etc_path: impl Into<PathBuf>,
    ) -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();
        let disks = Disks::new_with_refreshed_list();
        let networks = Networks::new_with_refreshed_list();
        Self {
            sys: Arc::new(Mutex::new(sys)),
            disks: Arc::new(Mutex::new(disks)),
            networks: Arc::new(Mutex::new(networks)),
            synthetic_ticks: Arc::new(Mutex::new(Vec::new())),
            process_ticks: Arc::new(Mutex::new(ProcessTicks::default())),
            proc_path: proc_path.into(),
            sys_path: sys_path.into(),
            etc_path: etc_path.into(),
        }
    }

    /// True when `proc_path` points somewhere other than this process's own procfs,
    /// i.e. at a host bind mount whose processes and mounts sysinfo cannot see.
    fn reads_foreign_procfs(&self) -> bool {
        self.proc_path != Path::new("/proc")
    }

    /// Per-core CPU ticks, memory totals and per-interface byte counters.
    #[instrument(skip(self), fields(repo = "sysinfo", operation = "get_host_counters"))]
    pub async fn get_host_counters(&self) -> Result<HostCounters, SampleError> {
        let sys = self.sys.clone();
        let networks = self.networks.clone();
        let synthetic = self.synthetic_ticks.clone();
        let proc_path = self.proc_path.clone();
        let sys_path = self.sys_path.clone();
        let taken_at = Instant::now();
        tokio::task::spawn_blocking(move || {
            let (cpu, cpu_frequency_mhz, memory) = {
                let mut sys = sys
                    .lock()
                    .map_err(|e| SampleError::os("get_host_counters", format!("sysinfo lock poisoned: {e}")))?;
                sys.refresh_cpu_all();
                sys.refresh_memory();

                let cpu = match linux::read_proc_stat(&proc_path) {
                    Some(ticks) => ticks,
                    None => {
                        let mut acc = synthetic.lock().map_err(|e| {
                            SampleError::os("get_host_counters", format!("tick lock poisoned: {e}"))
                        })?;
                        synthetic_ticks(&sys, &mut acc)
                    }
                };
                if cpu.is_empty() {
                    return Err(SampleError::os("get_host_counters", "no CPU counters available"));
                }
                let frequency = sys.cpus().first().map(|c| c.frequency()).unwrap_or(0);

                let total = sys.total_memory();
                let available = sys.available_memory();
                let memory = MemoryCounters {
                    total,
                    available,
                    used: total.saturating_sub(available),
                    swap_total: sys.total_swap(),
                    swap_used: sys.used_swap(),
                    swap_free: sys.free_swap(),
                };
                (cpu, frequency, memory)
            };

            let mut interfaces = match linux::read_net_counters(&sys_path) {
                Some(interfaces) => interfaces,
                None => {
                    let mut networks = networks.lock().map_err(|e| {
                        SampleError::os("get_host_counters", format!("networks lock poisoned: {e}"))
                    })?;
                    networks.refresh(true);
                    let mut interfaces: Vec<InterfaceCounters> = networks
                        .list()
                        .iter()
                        .map(|(name, data)| InterfaceCounters {
                            name: name.clone(),
                            bytes_sent: data.total_transmitted(),
                            bytes_recv: data.total_received(),
                            packets_sent: data.total_packets_transmitted(),
                            packets_recv: data.total_packets_received(),
                            errin: data.total_errors_on_received(),
                            errout: data.total_errors_on_transmitted(),
                            ..Default::default()
                        })
                        .collect();
                    interfaces.sort_by(|a, b| a.name.cmp(&b.name));
                    interfaces
                }
            };
            interfaces.retain(|i| is_host_interface(&i.name));

            Ok(HostCounters {
                taken_at,
                cpu,
                cpu_frequency_mhz,
                cpu_frequency_range_mhz: linux::read_cpu_frequency_range(&sys_path),
                memory,
                interfaces,
            })
        })
        .await?
    }

    /// Top `limit` processes by CPU. A foreign `proc_path` is scanned directly
    /// (`[pid]/stat` and `statm`); otherwise sysinfo's own accounting is used.
    #[instrument(skip(self), fields(repo = "sysinfo", operation = "get_processes"))]
    pub async fn get_processes(&self, limit: usize) -> Result<Vec<ProcessStat>, SampleError> {
        let sys = self.sys.clone();
        let process_ticks = self.process_ticks.clone();
        let proc_path = self.proc_path.clone();
        let foreign = self.reads_foreign_procfs();
        tokio::task::spawn_blocking(move || {
            if foreign {
                let entries = linux::read_processes(&proc_path).ok_or_else(|| {
                    SampleError::os("get_processes", format!("cannot list {}", proc_path.display()))
                })?;
                let cpu = linux::read_proc_stat(&proc_path).unwrap_or_default();
                let mem_total = linux::read_mem_total(&proc_path).unwrap_or(0);
                let mut prev = process_ticks.lock().map_err(|e| {
                    SampleError::os("get_processes", format!("process tick lock poisoned: {e}"))
                })?;
                let processes = procfs_processes(&entries, &cpu, mem_total, &mut prev);
                return Ok(top_processes(processes, limit));
            }

            let mut sys = sys
                .lock()
                .map_err(|e| SampleError::os("get_processes", format!("sysinfo lock poisoned: {e}")))?;
            sys.refresh_processes(ProcessesToUpdate::All, true);
            let total_memory = sys.total_memory();
            let processes = sys
                .processes()
                .values()
                .map(|p| {
                    let memory = p.memory();
                    ProcessStat {
                        pid: p.pid().as_u32(),
                        name: p.name().to_string_lossy().into_owned(),
                        cpu_percent: p.cpu_usage() as f64,
                        memory_percent: percent_of(memory, total_memory),
                        memory_mb: memory as f64 / 1024.0 / 1024.0,
                        status: p.status().to_string(),
                    }
                })
                .collect();
            Ok(top_processes(processes, limit))
        })
        .await?
    }

    /// Mounted real filesystems; queried fresh, not delta based. With a foreign
    /// `proc_path` the mount table comes from there and space from the matching
    /// sysinfo disk (same device, else same mountpoint).
    #[instrument(skip(self), fields(repo = "sysinfo", operation = "get_partitions"))]
    pub async fn get_partitions(&self) -> Result<Vec<PartitionStat>, SampleError> {
        let disks = self.disks.clone();
        let proc_path = self.proc_path.clone();
        let sys_path = self.sys_path.clone();
        let foreign = self.reads_foreign_procfs();
        tokio::task::spawn_blocking(move || {
            let mut disks = disks
                .lock()
                .map_err(|e| SampleError::os("get_partitions", format!("disks lock poisoned: {e}")))?;
            disks.refresh(true);
            let local: Vec<MountedFs> = disks
                .list()
                .iter()
                .map(|d| MountedFs {
                    device: d.name().to_string_lossy().into_owned(),
                    mountpoint: d.mount_point().to_string_lossy().into_owned(),
                    fstype: d.file_system().to_string_lossy().into_owned(),
                    total: d.total_space(),
                    free: d.available_space(),
                })
                .collect();
            let mounted = match foreign.then(|| linux::read_mounts(&proc_path)).flatten() {
                Some(table) => table
                    .into_iter()
                    .filter_map(|m| {
                        let space = local
                            .iter()
                            .find(|l| l.device == m.device)
                            .or_else(|| local.iter().find(|l| l.mountpoint == m.mountpoint))?;
                        Some(MountedFs {
                            device: m.device,
                            mountpoint: m.mountpoint,
                            fstype: m.fstype,
                            total: space.total,
                            free: space.free,
                        })
                    })
                    .collect(),
                None => local,
            };
            Ok(partition_stats(mounted, &linux::read_block_models(&sys_path)))
        })
        .await?
    }

    /// Boot time, uptime and load average, from `<proc>/uptime` and `<proc>/loadavg`
    /// when present.
    pub fn get_uptime(&self) -> UptimeStats {
        let (uptime_seconds, boot) = match linux::read_uptime(&self.proc_path) {
            Some(secs) => (secs as u64, chrono::Utc::now().timestamp() - secs as i64),
            None => (System::uptime(), System::boot_time() as i64),
        };
        let boot_time = chrono::DateTime::from_timestamp(boot, 0)
            .map(|t| {
                t.with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_default();
        let load_average = linux::read_loadavg(&self.proc_path).or_else(|| {
            if cfg!(windows) {
                return None;
            }
            let l = System::load_average();
            Some(LoadAverage {
                one: l.one,
                five: l.five,
                fifteen: l.fifteen,
            })
        });
        UptimeStats {
            boot_time,
            uptime_seconds,
            uptime_formatted: UptimeStats::format_uptime(uptime_seconds),
            load_average,
        }
    }

    #[instrument(skip(self), fields(repo = "sysinfo", operation = "get_system_info"))]
    pub async fn get_system_info(&self) -> anyhow::Result<SystemInfo> {
        let sys = self.sys.clone();
        let proc_path = self.proc_path.clone();
        let etc_path = self.etc_path.clone();
        tokio::task::spawn_blocking(move || {
            let sys = sys
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo lock poisoned: {}", e))?;
            let hostname = linux::read_hostname(&etc_path)
                .or_else(System::host_name)
                .unwrap_or_default();
            let os = linux::read_os_pretty_name(&etc_path)
                .or_else(System::long_os_version)
                .or_else(System::name)
                .unwrap_or_else(|| std::env::consts::OS.into());
            let processor = linux::read_cpu_model(&proc_path)
                .or_else(|| {
                    sys.cpus()
                        .first()
                        .map(|c| c.brand().trim().to_string())
                        .filter(|s| !s.is_empty())
                })
                .unwrap_or_else(|| "Unknown".into());
            let logical = sys.cpus().len() as u32;
            Ok(SystemInfo {
                hostname,
                os,
                os_version: System::kernel_version().unwrap_or_default(),
                architecture: std::env::consts::ARCH.into(),
                processor,
                cpu_count: System::physical_core_count().map(|n| n as u32).unwrap_or(logical),
                cpu_count_logical: logical,
            })
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }
}

/// Integrates sysinfo's per-core usage into monotonically growing tick counters, so
/// hosts without procfs still feed the same delta math.
fn synthetic_ticks(sys: &System, acc: &mut Vec<CpuTicks>) -> Vec<CpuTicks> {
    let cpus = sys.cpus();
    if acc.len() != cpus.len() {
        *acc = vec![CpuTicks::default(); cpus.len()];
    }
    for (ticks, cpu) in acc.iter_mut().zip(cpus) {
        let usage = (cpu.cpu_usage() as f64 / 100.0).clamp(0.0, 1.0);
        let busy = (usage * SYNTHETIC_TICKS_PER_SAMPLE as f64).round() as u64;
        *ticks = CpuTicks::new(
            ticks.busy + busy,
            ticks.idle + (SYNTHETIC_TICKS_PER_SAMPLE - busy),
        );
    }
    acc.clone()
}

/// Per-process CPU percent over the ticks elapsed since the previous scan, as a
/// share of one core. Processes first seen in this scan report 0.
fn procfs_processes(
    entries: &[linux::ProcEntry],
    cpu: &[CpuTicks],
    mem_total: u64,
    prev: &mut ProcessTicks,
) -> Vec<ProcessStat> {
    let total: u64 = cpu.iter().map(|t| t.total).sum();
    let per_core_span = total.saturating_sub(prev.total) as f64 / cpu.len().max(1) as f64;
    let processes = entries
        .iter()
        .map(|e| {
            let cpu_percent = match prev.per_pid.get(&e.pid) {
                Some(&before) if prev.total > 0 && per_core_span > 0.0 => {
                    e.cpu_ticks.saturating_sub(before) as f64 / per_core_span * 100.0
                }
                _ => 0.0,
            };
            ProcessStat {
                pid: e.pid,
                name: e.name.clone(),
                cpu_percent,
                memory_percent: percent_of(e.rss_bytes, mem_total),
                memory_mb: e.rss_bytes as f64 / 1024.0 / 1024.0,
                status: linux::process_status(e.state).into(),
            }
        })
        .collect();
    prev.total = total;
    prev.per_pid = entries.iter().map(|e| (e.pid, e.cpu_ticks)).collect();
    processes
}

/// Drop virtual and duplicate mounts, attach disk models, root first.
fn partition_stats(
    mounted: Vec<MountedFs>,
    models: &HashMap<String, String>,
) -> Vec<PartitionStat> {
    let mut seen_devices = HashSet::new();
    let mut partitions: Vec<PartitionStat> = mounted
        .into_iter()
        .filter(|m| !is_virtual_mount(&m.fstype, &m.mountpoint))
        .filter(|m| seen_devices.insert(m.device.clone()))
        .map(|m| {
            let used = m.total.saturating_sub(m.free);
            PartitionStat {
                model: linux::model_for(&m.device, models),
                device: m.device,
                mountpoint: m.mountpoint,
                fstype: m.fstype,
                total: m.total,
                used,
                free: m.free,
                percent: percent_of(used, m.total),
            }
        })
        .collect();
    partitions.sort_by(|a, b| {
        (a.mountpoint != "/", &a.mountpoint).cmp(&(b.mountpoint != "/", &b.mountpoint))
    });
    partitions
}

fn is_host_interface(name: &str) -> bool {
    !EXCLUDED_INTERFACE_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

fn is_virtual_mount(fstype: &str, mountpoint: &str) -> bool {
    VIRTUAL_FS_TYPES.iter().any(|t| fstype.contains(t))
        || !mountpoint.starts_with('/')
        || mountpoint.contains("docker")
        || mountpoint.contains("containerd")
}

fn top_processes(mut processes: Vec<ProcessStat>, limit: usize) -> Vec<ProcessStat> {
    processes.sort_by(|a, b| {
        b.cpu_percent
            .total_cmp(&a.cpu_percent)
            .then(b.memory_percent.total_cmp(&a.memory_percent))
    });
    processes.truncate(limit);
    processes
}

fn percent_of(part: u64, whole: u64) -> f64 {
    if whole > 0 {
        part as f64 / whole as f64 * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process(pid: u32, cpu: f64, mem: f64) -> ProcessStat {
        ProcessStat {
            pid,
            name: format!("p{pid}"),
            cpu_percent: cpu,
            memory_percent: mem,
            memory_mb: 0.0,
            status: "Runnable".into(),
        }
    }

    #[test]
    fn host_interface_filter_drops_loopback_and_bridges() {
        assert!(is_host_interface("eth0"));
        assert!(is_host_interface("enp3s0"));
        assert!(!is_host_interface("lo"));
        assert!(!is_host_interface("docker0"));
        assert!(!is_host_interface("veth12ab"));
        assert!(!is_host_interface("br-5f3c"));
    }

    #[test]
    fn virtual_mounts_are_excluded() {
        assert!(!is_virtual_mount("ext4", "/"));
        assert!(!is_virtual_mount("xfs", "/data"));
        assert!(is_virtual_mount("tmpfs", "/run"));
        assert!(is_virtual_mount("overlay", "/"));
        assert!(is_virtual_mount("fuse.sshfs", "/mnt/remote"));
        assert!(is_virtual_mount("ext4", "/var/lib/docker/volumes"));
        assert!(is_virtual_mount("ext4", "C:\\"));
    }

    #[test]
    fn top_processes_sorts_by_cpu_then_memory_and_truncates() {
        let out = top_processes(
            vec![
                process(1, 5.0, 1.0),
                process(2, 50.0, 1.0),
                process(3, 5.0, 9.0),
                process(4, 0.0, 0.0),
            ],
            3,
        );
        let pids: Vec<u32> = out.iter().map(|p| p.pid).collect();
        assert_eq!(pids, vec![2, 3, 1]);
    }

    #[test]
    fn percent_of_zero_whole_is_zero() {
        assert_eq!(percent_of(10, 0), 0.0);
        assert_eq!(percent_of(25, 100), 25.0);
    }

    fn entry(pid: u32, cpu_ticks: u64, rss_bytes: u64) -> linux::ProcEntry {
        linux::ProcEntry {
            pid,
            name: format!("p{pid}"),
            state: 'S',
            cpu_ticks,
            rss_bytes,
        }
    }

    #[test]
    fn procfs_process_cpu_is_a_share_of_one_core() {
        let mut prev = ProcessTicks::default();
        let cpu = vec![CpuTicks::new(50, 50), CpuTicks::new(50, 50)];
        let first = procfs_processes(&[entry(1, 100, 1 << 20)], &cpu, 4 << 20, &mut prev);
        assert_eq!(first[0].cpu_percent, 0.0);
        assert_eq!(first[0].memory_percent, 25.0);
        assert_eq!(first[0].memory_mb, 1.0);
        assert_eq!(first[0].status, "Sleeping");

        // 200 ticks across 2 cores = 100 per core; the process used 50 of them.
        let cpu = vec![CpuTicks::new(100, 100), CpuTicks::new(100, 100)];
        let second = procfs_processes(
            &[entry(1, 150, 1 << 20), entry(2, 500, 0)],
            &cpu,
            4 << 20,
            &mut prev,
        );
        assert_eq!(second[0].cpu_percent, 50.0);
        assert_eq!(second[1].cpu_percent, 0.0, "new pid has no baseline");
    }

    fn mounted(device: &str, mountpoint: &str, fstype: &str) -> MountedFs {
        MountedFs {
            device: device.into(),
            mountpoint: mountpoint.into(),
            fstype: fstype.into(),
            total: 1000,
            free: 250,
        }
    }

    #[test]
    fn partition_stats_filter_dedupe_and_attach_models() {
        let models: HashMap<String, String> =
            [("/dev/sda".to_string(), "Samsung SSD 870".to_string())]
                .into_iter()
                .collect();
        let out = partition_stats(
            vec![
                mounted("/dev/sdb1", "/data", "xfs"),
                mounted("tmpfs", "/run", "tmpfs"),
                mounted("/dev/sda2", "/", "ext4"),
                mounted("/dev/sda2", "/var/lib/snapd", "ext4"),
            ],
            &models,
        );
        let mounts: Vec<&str> = out.iter().map(|p| p.mountpoint.as_str()).collect();
        assert_eq!(mounts, vec!["/", "/data"]);
        assert_eq!(out[0].model.as_deref(), Some("Samsung SSD 870"));
        assert_eq!(out[0].used, 750);
        assert_eq!(out[0].percent, 75.0);
        assert!(out[1].model.is_none());
    }

    #[tokio::test]
    async fn host_counters_report_every_core() {
        let repo = SysinfoRepo::default();
        let first = repo.get_host_counters().await.expect("host counters");
        assert!(!first.cpu.is_empty());
        assert!(first.cpu.iter().all(|t| t.total == t.busy + t.idle));
        let second = repo.get_host_counters().await.expect("host counters");
        assert_eq!(first.cpu.len(), second.cpu.len());
    }
}
