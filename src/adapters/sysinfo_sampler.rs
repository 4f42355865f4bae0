//! System Sampler Adapter
//!
//! Implements the `SystemSampler` port on top of `sysinfo`. The `System`
//! handle is kept between samples so CPU usage is measured over the sampling
//! interval.

use std::path::PathBuf;

use parking_lot::Mutex;
use sysinfo::{CpuExt, DiskExt, Pid, ProcessExt, System, SystemExt};
use tracing::{debug, trace};

use crate::domain::ports::{MetricSample, SystemSampler};
use crate::error::{Error, Result};
use crate::health::best_mount;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Samples `cpu_usage`, `memory_usage`, `disk_usage` and `network_connections`.
pub struct SysinfoSampler {
    system: Mutex<System>,
    disk_path: PathBuf,
    pid: Option<Pid>,
}

impl SysinfoSampler {
    pub fn new(disk_path: impl Into<PathBuf>) -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_disks_list();

        let pid = sysinfo::get_current_pid().ok();
        if pid.is_none() {
            debug!("Current pid unavailable, process memory will not be sampled");
        }

        Self {
            system: Mutex::new(system),
            disk_path: disk_path.into(),
            pid,
        }
    }
}

impl std::fmt::Debug for SysinfoSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysinfoSampler")
            .field("disk_path", &self.disk_path)
            .field("pid", &self.pid)
            .finish()
    }
}

impl SystemSampler for SysinfoSampler {
    fn sample(&self) -> Result<Vec<MetricSample>> {
        let mut system = self.system.lock();
        let mut samples = Vec::with_capacity(4);

        system.refresh_cpu();
        samples.push(MetricSample::new(
            "cpu_usage",
            system.global_cpu_info().cpu_usage() as f64,
        ));

        if let Some(pid) = self.pid {
            if system.refresh_process(pid) {
                if let Some(process) = system.process(pid) {
                    samples.push(MetricSample::new(
                        "memory_usage",
                        process.memory() as f64 / BYTES_PER_MB,
                    ));
                }
            }
        }

        system.refresh_disks();
        let disks = system.disks();
        if let Some(disk) = best_mount(&self.disk_path, disks.iter().map(|d| d.mount_point()))
            .map(|i| &disks[i])
        {
            let total = disk.total_space();
            if total > 0 {
                let used = total.saturating_sub(disk.available_space());
                samples.push(
                    MetricSample::new("disk_usage", used as f64 / total as f64 * 100.0)
                        .with_label("mount", disk.mount_point().display().to_string()),
                );
            }
        }
        drop(system);

        if let Some(connections) = tcp_connection_count()? {
            samples.push(MetricSample::new("network_connections", connections as f64));
        }

        trace!(samples = samples.len(), "System sampled");
        Ok(samples)
    }
}

/// Open TCP sockets from `/proc/net/tcp{,6}`; `None` where procfs is absent.
#[cfg(target_os = "linux")]
fn tcp_connection_count() -> Result<Option<usize>> {
    let mut total = 0usize;
    let mut found = false;

    for table in ["/proc/net/tcp", "/proc/net/tcp6"] {
        match std::fs::read_to_string(table) {
            Ok(raw) => {
                found = true;
                total += count_socket_rows(&raw);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(Error::Sampling(format!("failed to read {}: {}", table, e))),
        }
    }

    Ok(found.then_some(total))
}

#[cfg(not(target_os = "linux"))]
fn tcp_connection_count() -> Result<Option<usize>> {
    Ok(None)
}

/// Rows of a procfs socket table, excluding the header line.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn count_socket_rows(raw: &str) -> usize {
    raw.lines().skip(1).filter(|l| !l.trim().is_empty()).count()
}
