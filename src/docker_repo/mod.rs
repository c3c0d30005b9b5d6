// Docker container counters via bollard

mod stats;

use crate::models::ContainerState;
use crate::sampler::{ContainerCounters, ContainerSample, SampleError};
use bollard::Docker;
use bollard::models::PortSummary;
use bollard::query_parameters::{ListContainersOptions, StatsOptions};
use futures_util::StreamExt;
use futures_util::future::join_all;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Rate limit for "runtime unreachable" warnings (the list call fails every cycle while Docker is down).
const UNREACHABLE_WARN_INTERVAL: Duration = Duration::from_secs(60);

/// Consecutive failed list calls reported as errors (previous list kept by the
/// worker) before the runtime is treated as gone and reported as holding nothing.
const OUTAGE_GRACE_CALLS: u32 = 3;

/// Docker's short id length.
const SHORT_ID_LEN: usize = 12;

pub struct DockerRepo {
    docker: Docker,
    last_unreachable_warn: Mutex<Option<Instant>>,
    outage: OutageGrace,
}

/// Counts consecutive list failures.
#[derive(Debug, Default)]
struct OutageGrace {
    failures: AtomicU32,
}

impl OutageGrace {
    /// Record a failed call; true while still within the grace period.
    fn fail(&self) -> bool {
        let failures = self.failures.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        failures <= OUTAGE_GRACE_CALLS
    }

    fn recover(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }
}

impl DockerRepo {
    /// Connect to the local daemon, or to `socket` when given. The daemon is not
    /// contacted until the first sample.
    pub fn connect(socket: Option<&str>) -> anyhow::Result<Self> {
        let docker = match socket {
            Some(path) => Docker::connect_with_unix(path, 120, bollard::API_DEFAULT_VERSION)?,
            None => Docker::connect_with_unix_defaults()?,
        };
        Ok(Self {
            docker,
            last_unreachable_warn: Mutex::new(None),
            outage: OutageGrace::default(),
        })
    }

    /// Every container with its identity; running ones also carry a one-shot counter read.
    /// A container that vanishes between the list call and its stats call is left out.
    ///
    /// A failed list call is returned as [`SampleError::ContainerRuntime`] for the first
    /// few consecutive failures, so the caller can keep what it had. A runtime that stays
    /// unreachable past that yields an empty list.
    #[instrument(skip(self), fields(repo = "docker", operation = "sample_containers"))]
    pub async fn sample_containers(&self) -> Result<Vec<ContainerSample>, SampleError> {
        let options = ListContainersOptions {
            all: true,
            ..Default::default()
        };
        let containers = match self.docker.list_containers(Some(options)).await {
            Ok(c) => {
                self.outage.recover();
                c
            }
            Err(e) => {
                self.warn_unreachable(&e);
                return if self.outage.fail() {
                    Err(SampleError::ContainerRuntime(e))
                } else {
                    Ok(vec![])
                };
            }
        };

        let reads = containers.into_iter().filter_map(|c| {
            let id = c.id.clone()?;
            let name = c
                .names
                .as_ref()
                .and_then(|n| n.first())
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_else(|| "unknown".into());
            let image = c.image.clone().unwrap_or_default();
            let ports = c
                .ports
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(format_port)
                .collect();
            let created = c
                .created
                .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
                .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true));
            let status = c
                .state
                .as_ref()
                .map(|s| ContainerState::from_docker(&s.to_string()))
                .unwrap_or(ContainerState::Unknown);
            Some(async move {
                let counters = if status == ContainerState::Running {
                    match self.read_counters(&id).await {
                        Ok(counters) => counters,
                        Err(e) if is_not_found(&e) => {
                            debug!(container = %name, "container gone before stats read; dropped");
                            return None;
                        }
                        Err(e) => {
                            warn!(container = %name, error = %e, "container stats read failed");
                            None
                        }
                    }
                } else {
                    None
                };
                Some(ContainerSample {
                    id: short_id(&id),
                    name,
                    image,
                    status,
                    ports,
                    created,
                    counters,
                })
            })
        });

        Ok(join_all(reads).await.into_iter().flatten().collect())
    }

    async fn read_counters(
        &self,
        id: &str,
    ) -> Result<Option<ContainerCounters>, bollard::errors::Error> {
        let options = StatsOptions {
            stream: false,
            one_shot: true,
            ..Default::default()
        };
        let taken_at = Instant::now();
        let mut stream = self.docker.stats(id, Some(options));
        match stream.next().await {
            Some(Ok(s)) => Ok(stats::extract_counters(&s, taken_at)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    fn warn_unreachable(&self, e: &bollard::errors::Error) {
        let should_warn = match self.last_unreachable_warn.lock() {
            Ok(mut last) => {
                let due = last.is_none_or(|t| t.elapsed() >= UNREACHABLE_WARN_INTERVAL);
                if due {
                    *last = Some(Instant::now());
                }
                due
            }
            Err(_) => true,
        };
        if should_warn {
            warn!(
                error = %e,
                operation = "list_containers",
                "Docker unreachable; keeping the last container list"
            );
        } else {
            debug!(error = %e, operation = "list_containers", "Docker unreachable");
        }
    }
}

fn is_not_found(e: &bollard::errors::Error) -> bool {
    matches!(
        e,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

/// Docker CLI notation: "0.0.0.0:8080->80/tcp", or "6379/tcp" when unpublished.
fn format_port(p: &PortSummary) -> String {
    let proto = p
        .typ
        .as_ref()
        .map(|t| t.to_string())
        .filter(|t| !t.is_empty())
        .map(|t| format!("/{t}"))
        .unwrap_or_default();
    match (p.public_port, p.ip.as_deref().filter(|ip| !ip.is_empty())) {
        (Some(public), Some(ip)) => format!("{ip}:{public}->{}{proto}", p.private_port),
        (Some(public), None) => format!("{public}->{}{proto}", p.private_port),
        (None, _) => format!("{}{proto}", p.private_port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_keeps_twelve_chars() {
        assert_eq!(
            short_id("4f66ad9a0b2e1c3d5e7f90a1b2c3d4e5f60718293a4b5c6d7e8f9"),
            "4f66ad9a0b2e"
        );
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn ports_use_docker_cli_notation() {
        use bollard::models::PortSummaryTypeEnum;
        let published = PortSummary {
            ip: Some("0.0.0.0".into()),
            private_port: 80,
            public_port: Some(8080),
            typ: Some(PortSummaryTypeEnum::TCP),
        };
        let exposed = PortSummary {
            ip: None,
            private_port: 6379,
            public_port: None,
            typ: Some(PortSummaryTypeEnum::TCP),
        };
        let udp = PortSummary {
            ip: None,
            private_port: 53,
            public_port: Some(5353),
            typ: Some(PortSummaryTypeEnum::UDP),
        };
        assert_eq!(format_port(&published), "0.0.0.0:8080->80/tcp");
        assert_eq!(format_port(&exposed), "6379/tcp");
        assert_eq!(format_port(&udp), "5353->53/udp");
    }

    #[test]
    fn outage_grace_runs_out_and_resets_on_recovery() {
        let grace = OutageGrace::default();
        for _ in 0..OUTAGE_GRACE_CALLS {
            assert!(grace.fail());
        }
        assert!(!grace.fail());
        grace.recover();
        assert!(grace.fail());
    }

    #[test]
    fn only_404_counts_as_vanished() {
        let gone = bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such container".into(),
        };
        let broken = bollard::errors::Error::DockerResponseServerError {
            status_code: 500,
            message: "boom".into(),
        };
        assert!(is_not_found(&gone));
        assert!(!is_not_found(&broken));
    }
}
