// Snapshot JSON shape: snake_case keys, lowercase enums, absent stats as null

use hostwatch::models::*;

fn container(stats: Option<ContainerUsage>) -> ContainerStats {
    ContainerStats {
        id: "abc123".into(),
        name: "web".into(),
        image: "nginx:latest".into(),
        status: ContainerState::Running,
        ports: vec!["0.0.0.0:8080->80/tcp".into()],
        created: Some("2026-01-01T00:00:00Z".into()),
        stats,
    }
}

#[test]
fn test_container_without_stats_serializes_null_not_zero() {
    let json = serde_json::to_value(container(None)).unwrap();
    assert!(json.get("stats").unwrap().is_null());
    assert_eq!(json["status"], "running");
}

#[test]
fn test_container_usage_fields() {
    let usage = ContainerUsage {
        cpu_percent: 12.5,
        mem_usage: 256,
        mem_limit: 1024,
        mem_percent: 25.0,
        net_rx: 1_000_000.0,
        net_tx: 0.0,
        blk_read: 0.0,
        blk_write: 4096.0,
        pids: 3,
    };
    let json = serde_json::to_value(container(Some(usage))).unwrap();
    assert_eq!(json["stats"]["cpu_percent"], 12.5);
    assert_eq!(json["stats"]["net_rx"], 1_000_000.0);
    assert_eq!(json["stats"]["pids"], 3);
}

#[test]
fn test_container_state_parses_docker_states() {
    assert_eq!(ContainerState::from_docker("running"), ContainerState::Running);
    assert_eq!(ContainerState::from_docker("Exited"), ContainerState::Exited);
    assert_eq!(ContainerState::from_docker("removing"), ContainerState::Removing);
    assert_eq!(ContainerState::from_docker("whatever"), ContainerState::Unknown);
    let back: ContainerState = serde_json::from_str("\"sideways\"").unwrap();
    assert_eq!(back, ContainerState::Unknown);
}

#[test]
fn test_empty_snapshot_is_well_formed() {
    let snapshot = MetricsSnapshot::empty(SystemInfo {
        hostname: "box".into(),
        cpu_count: 4,
        cpu_count_logical: 8,
        ..Default::default()
    });
    assert_eq!(snapshot.sequence, 0);
    assert_eq!(snapshot.mode, SamplingMode::Active);
    assert_eq!(snapshot.cpu.per_core_percent, vec![0.0; 8]);
    assert!(snapshot.docker.is_empty());
    assert!(chrono::DateTime::parse_from_rfc3339(&snapshot.timestamp).is_ok());

    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["mode"], "active");
    assert_eq!(json["system"]["hostname"], "box");
    assert!(json["cpu"]["per_core_percent"].is_array());
    assert!(json["uptime"]["load_average"].is_null());
}

#[test]
fn test_snapshot_json_roundtrip() {
    let mut snapshot = MetricsSnapshot::empty(SystemInfo::default());
    snapshot.mode = SamplingMode::Idle;
    snapshot.docker = vec![container(None)];
    snapshot.network.interfaces = vec![InterfaceStat {
        name: "eth0".into(),
        bytes_sent: 10,
        bytes_recv: 20,
        sent_per_sec: Some(1.5),
        recv_per_sec: Some(2.5),
    }];
    let json = serde_json::to_string(&snapshot).unwrap();
    assert!(json.contains("\"mode\":\"idle\""));
    let back: MetricsSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(back, snapshot);
}

#[test]
fn test_format_uptime() {
    assert_eq!(UptimeStats::format_uptime(0), "0d 0h 0m 0s");
    assert_eq!(UptimeStats::format_uptime(90_061), "1d 1h 1m 1s");
    assert_eq!(UptimeStats::format_uptime(3_599), "0d 0h 59m 59s");
}

#[test]
fn test_container_ports_and_created() {
    let json = serde_json::to_value(container(None)).unwrap();
    assert_eq!(json["ports"][0], "0.0.0.0:8080->80/tcp");
    assert_eq!(json["created"], "2026-01-01T00:00:00Z");

    // Older payloads without the fields still parse.
    let back: ContainerStats = serde_json::from_str(
        r#"{"id":"abc","name":"web","image":"nginx","status":"exited","stats":null}"#,
    )
    .unwrap();
    assert!(back.ports.is_empty());
    assert!(back.created.is_none());
}

#[test]
fn test_network_drop_counters_and_pending_interface_rates() {
    let network = NetworkStats {
        dropin: 7,
        dropout: 3,
        interfaces: vec![InterfaceStat {
            name: "wlan0".into(),
            bytes_sent: 1,
            bytes_recv: 2,
            sent_per_sec: None,
            recv_per_sec: None,
        }],
        ..Default::default()
    };
    let json = serde_json::to_value(&network).unwrap();
    assert_eq!(json["dropin"], 7);
    assert_eq!(json["dropout"], 3);
    // No rate yet is null, never 0.
    assert!(json["interfaces"][0]["sent_per_sec"].is_null());
    assert!(json["interfaces"][0]["recv_per_sec"].is_null());
}

#[test]
fn test_cpu_frequency_limits() {
    let cpu = CpuStats {
        overall_percent: 10.0,
        per_core_percent: vec![10.0],
        frequency_mhz: 2400,
        frequency_min_mhz: Some(800),
        frequency_max_mhz: Some(4200),
    };
    let json = serde_json::to_value(&cpu).unwrap();
    assert_eq!(json["frequency_min_mhz"], 800);
    assert_eq!(json["frequency_max_mhz"], 4200);
    assert!(serde_json::to_value(CpuStats::default()).unwrap()["frequency_max_mhz"].is_null());
}

#[test]
fn test_partition_model() {
    let partition = PartitionStat {
        device: "/dev/nvme0n1p2".into(),
        model: Some("WD Black SN850".into()),
        mountpoint: "/".into(),
        fstype: "ext4".into(),
        total: 100,
        used: 40,
        free: 60,
        percent: 40.0,
    };
    let json = serde_json::to_value(&partition).unwrap();
    assert_eq!(json["model"], "WD Black SN850");
    let unknown = PartitionStat {
        model: None,
        ..partition
    };
    assert!(serde_json::to_value(&unknown).unwrap()["model"].is_null());
}
