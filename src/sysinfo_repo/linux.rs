// Linux-specific helpers over procfs, sysfs and /etc. Paths are configurable so a
// containerized engine can read the host's bind mounts.

use crate::models::LoadAverage;
use crate::sampler::{CpuTicks, InterfaceCounters};
use std::collections::HashMap;
use std::path::Path;

/// statm reports sizes in pages.
const PAGE_SIZE: u64 = 4096;

/// Per-core tick counters from `<proc>/stat`, in core index order.
pub(super) fn read_proc_stat(proc_path: &Path) -> Option<Vec<CpuTicks>> {
    #[cfg(target_os = "linux")]
    {
        let content = std::fs::read_to_string(proc_path.join("stat")).ok()?;
        let ticks = parse_proc_stat(&content);
        if !ticks.is_empty() {
            return Some(ticks);
        }
    }
    let _ = proc_path;
    None
}

/// Parse the `cpuN` lines of `/proc/stat`. The aggregate `cpu` line is ignored.
/// Busy = user + nice + system + irq + softirq + steal; idle = idle + iowait.
/// guest/guest_nice are already folded into user/nice by the kernel.
pub(super) fn parse_proc_stat(content: &str) -> Vec<CpuTicks> {
    let mut cores: Vec<(usize, CpuTicks)> = content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let label = fields.next()?;
            let index: usize = label.strip_prefix("cpu")?.parse().ok()?;
            let values: Vec<u64> = fields.take(8).map(|v| v.parse().unwrap_or(0)).collect();
            if values.len() < 4 {
                return None;
            }
            let at = |i: usize| values.get(i).copied().unwrap_or(0);
            let idle = at(3) + at(4);
            let busy = at(0) + at(1) + at(2) + at(5) + at(6) + at(7);
            Some((index, CpuTicks::new(busy, idle)))
        })
        .collect();
    cores.sort_by_key(|(index, _)| *index);
    cores.into_iter().map(|(_, ticks)| ticks).collect()
}

/// Read first "model name" from `<proc>/cpuinfo`. Prefer over sysinfo when it returns "cpu0" etc.
pub(super) fn read_cpu_model(proc_path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(proc_path.join("cpuinfo")).ok()?;
    content
        .lines()
        .find(|line| line.starts_with("model name"))
        .and_then(|line| line.split_once(':'))
        .map(|(_, v)| v.trim())
        .filter(|s| !s.is_empty() && *s != "cpu0")
        .map(str::to_string)
}

/// OS pretty name: `os-release` PRETTY_NAME, then `lsb-release` DISTRIB_DESCRIPTION.
pub(super) fn read_os_pretty_name(etc_path: &Path) -> Option<String> {
    read_key(&etc_path.join("os-release"), "PRETTY_NAME=")
        .or_else(|| read_key(&etc_path.join("lsb-release"), "DISTRIB_DESCRIPTION="))
}

/// Hostname from `<etc>/hostname`.
pub(super) fn read_hostname(etc_path: &Path) -> Option<String> {
    let v = std::fs::read_to_string(etc_path.join("hostname")).ok()?;
    let v = v.trim();
    if v.is_empty() {
        return None;
    }
    Some(v.to_string())
}

/// Seconds since boot, the first field of `<proc>/uptime`.
pub(super) fn read_uptime(proc_path: &Path) -> Option<f64> {
    let content = std::fs::read_to_string(proc_path.join("uptime")).ok()?;
    content
        .split_whitespace()
        .next()?
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

pub(super) fn read_loadavg(proc_path: &Path) -> Option<LoadAverage> {
    parse_loadavg(&std::fs::read_to_string(proc_path.join("loadavg")).ok()?)
}

pub(super) fn parse_loadavg(content: &str) -> Option<LoadAverage> {
    let mut fields = content.split_whitespace().map(|v| v.parse::<f64>().ok());
    Some(LoadAverage {
        one: fields.next()??,
        five: fields.next()??,
        fifteen: fields.next()??,
    })
}

/// Total physical memory in bytes from the `MemTotal` line of `<proc>/meminfo`.
pub(super) fn read_mem_total(proc_path: &Path) -> Option<u64> {
    let content = std::fs::read_to_string(proc_path.join("meminfo")).ok()?;
    let kb: u64 = content
        .lines()
        .find_map(|line| line.strip_prefix("MemTotal:"))?
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;
    Some(kb * 1024)
}

/// Per-interface counters from `<sys>/class/net/*/statistics`, sorted by name.
/// `None` when the class directory is missing; interfaces whose byte counters
/// cannot be read are skipped.
pub(super) fn read_net_counters(sys_path: &Path) -> Option<Vec<InterfaceCounters>> {
    let entries = std::fs::read_dir(sys_path.join("class").join("net")).ok()?;
    let mut interfaces: Vec<InterfaceCounters> = entries
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let stats = entry.path().join("statistics");
            let counter = |file: &str| read_u64(&stats.join(file));
            Some(InterfaceCounters {
                bytes_sent: counter("tx_bytes")?,
                bytes_recv: counter("rx_bytes")?,
                packets_sent: counter("tx_packets").unwrap_or(0),
                packets_recv: counter("rx_packets").unwrap_or(0),
                errin: counter("rx_errors").unwrap_or(0),
                errout: counter("tx_errors").unwrap_or(0),
                dropin: counter("rx_dropped").unwrap_or(0),
                dropout: counter("tx_dropped").unwrap_or(0),
                name,
            })
        })
        .collect();
    interfaces.sort_by(|a, b| a.name.cmp(&b.name));
    Some(interfaces)
}

/// Hardware frequency limits of cpu0 in MHz (sysfs reports kHz).
pub(super) fn read_cpu_frequency_range(sys_path: &Path) -> Option<(u64, u64)> {
    let dir = sys_path
        .join("devices")
        .join("system")
        .join("cpu")
        .join("cpu0")
        .join("cpufreq");
    let min = read_u64(&dir.join("cpuinfo_min_freq"))?;
    let max = read_u64(&dir.join("cpuinfo_max_freq"))?;
    Some((min / 1000, max / 1000))
}

/// Device models of whole block devices, keyed by `/dev/<name>`.
pub(super) fn read_block_models(sys_path: &Path) -> HashMap<String, String> {
    let Ok(entries) = std::fs::read_dir(sys_path.join("block")) else {
        return HashMap::new();
    };
    entries
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let model = std::fs::read_to_string(entry.path().join("device").join("model")).ok()?;
            let model = model.trim();
            if model.is_empty() {
                return None;
            }
            Some((
                format!("/dev/{}", entry.file_name().to_string_lossy()),
                model.to_string(),
            ))
        })
        .collect()
}

/// Model of the disk holding `device`: the device itself, else its parent
/// (`/dev/sda1` -> `/dev/sda`, `/dev/nvme0n1p2` -> `/dev/nvme0n1`).
pub(super) fn model_for(device: &str, models: &HashMap<String, String>) -> Option<String> {
    if let Some(m) = models.get(device) {
        return Some(m.clone());
    }
    let parent = device.trim_end_matches(|c: char| c.is_ascii_digit());
    models
        .get(parent)
        .or_else(|| {
            parent
                .strip_suffix('p')
                .filter(|p| p.ends_with(|c: char| c.is_ascii_digit()))
                .and_then(|p| models.get(p))
        })
        .cloned()
}

/// One line of a mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct MountEntry {
    pub device: String,
    pub mountpoint: String,
    pub fstype: String,
}

/// Mount table of the host's init process, falling back to `<proc>/mounts`.
pub(super) fn read_mounts(proc_path: &Path) -> Option<Vec<MountEntry>> {
    let content = std::fs::read_to_string(proc_path.join("1").join("mounts"))
        .or_else(|_| std::fs::read_to_string(proc_path.join("mounts")))
        .ok()?;
    Some(parse_mounts(&content))
}

pub(super) fn parse_mounts(content: &str) -> Vec<MountEntry> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            Some(MountEntry {
                device: unescape_mount_field(fields.next()?),
                mountpoint: unescape_mount_field(fields.next()?),
                fstype: fields.next()?.to_string(),
            })
        })
        .collect()
}

/// Undo the kernel's octal escapes (`\040` for space and friends).
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let escaped = std::str::from_utf8(&bytes[i + 1..i + 4])
                .ok()
                .and_then(|digits| u8::from_str_radix(digits, 8).ok());
            if let Some(v) = escaped {
                out.push(v);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// One process as read from `<proc>/[pid]/stat` and `statm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ProcEntry {
    pub pid: u32,
    pub name: String,
    pub state: char,
    /// utime + stime, in clock ticks.
    pub cpu_ticks: u64,
    pub rss_bytes: u64,
}

/// Every numeric directory under `proc_path`. Processes that exit mid-scan are skipped.
pub(super) fn read_processes(proc_path: &Path) -> Option<Vec<ProcEntry>> {
    let entries = std::fs::read_dir(proc_path).ok()?;
    Some(
        entries
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let pid: u32 = entry.file_name().to_str()?.parse().ok()?;
                let stat = std::fs::read_to_string(entry.path().join("stat")).ok()?;
                let (name, state, cpu_ticks) = parse_pid_stat(&stat)?;
                let rss_pages = std::fs::read_to_string(entry.path().join("statm"))
                    .ok()
                    .and_then(|s| parse_statm_rss(&s))
                    .unwrap_or(0);
                Some(ProcEntry {
                    pid,
                    name,
                    state,
                    cpu_ticks,
                    rss_bytes: rss_pages * PAGE_SIZE,
                })
            })
            .collect(),
    )
}

/// Name, state and utime + stime from a `<proc>/[pid]/stat` line. The name sits
/// in parentheses and may itself contain spaces or parentheses.
pub(super) fn parse_pid_stat(content: &str) -> Option<(String, char, u64)> {
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    let name = content.get(open + 1..close)?.to_string();
    let mut rest = content.get(close + 1..)?.split_whitespace();
    let state = rest.next()?.chars().next()?;
    // Skip ppid pgrp session tty_nr tpgid flags minflt cminflt majflt cmajflt.
    let mut rest = rest.skip(10);
    let utime: u64 = rest.next()?.parse().ok()?;
    let stime: u64 = rest.next()?.parse().ok()?;
    Some((name, state, utime + stime))
}

/// Resident set size in pages, the second field of `statm`.
pub(super) fn parse_statm_rss(content: &str) -> Option<u64> {
    content.split_whitespace().nth(1)?.parse().ok()
}

/// Status label for a procfs state letter, worded like sysinfo's.
pub(super) fn process_status(state: char) -> &'static str {
    match state {
        'R' => "Runnable",
        'S' => "Sleeping",
        'D' => "UninterruptibleDiskSleep",
        'Z' => "Zombie",
        'T' => "Stopped",
        't' => "Tracing",
        'X' | 'x' => "Dead",
        'I' => "Idle",
        'W' => "Waking",
        'P' => "Parked",
        _ => "Unknown",
    }
}

fn read_u64(path: &Path) -> Option<u64> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn read_key(path: &Path, prefix: &str) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    content
        .lines()
        .find_map(|line| line.strip_prefix(prefix))
        .map(|v| v.trim().trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}
