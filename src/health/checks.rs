//! Built-in Health Checks
//!
//! ```text
//! system_resources      CPU utilisation, load average per core
//! disk_space            usage of the mount holding `disk_path`
//! memory                RAM and swap utilisation
//! network_connectivity  bounded GET against `network_check_url`
//! process               liveness of the current process
//! data_integrity        every *.json under `data_dir` parses
//! log_rotation          log file and directory sizes
//! ```
//!
//! sysinfo refreshes are blocking, so they run on the blocking pool.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sysinfo::{CpuExt, DiskExt, ProcessExt, ProcessStatus, System, SystemExt};
use tracing::{debug, warn};

use super::registry::HealthCheckRegistry;
use super::status::{CheckOutcome, HealthStatus};
use crate::config::HealthConfig;
use crate::domain::ports::HealthCheck;
use crate::error::{Error, Result};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Gap between the two CPU refreshes needed for a usage reading
const CPU_SAMPLE_GAP: Duration = Duration::from_millis(200);

/// Warning/critical utilisation thresholds in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceThresholds {
    pub warning: f64,
    pub critical: f64,
}

impl ResourceThresholds {
    pub fn new(warning: f64, critical: f64) -> Self {
        Self { warning, critical }
    }

    /// `critical` and above is unhealthy, `warning` and above degraded.
    pub fn classify(&self, percent: f64) -> HealthStatus {
        if percent >= self.critical {
            HealthStatus::Unhealthy
        } else if percent >= self.warning {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

impl Default for ResourceThresholds {
    fn default() -> Self {
        Self::new(80.0, 95.0)
    }
}

impl From<&HealthConfig> for ResourceThresholds {
    fn from(config: &HealthConfig) -> Self {
        Self::new(
            config.resource_warning_percent,
            config.resource_critical_percent,
        )
    }
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::HealthCheck(format!("blocking check failed: {}", e)))
}

// =============================================================================
// System resources
// =============================================================================

/// CPU utilisation and load average.
#[derive(Debug, Clone, Default)]
pub struct SystemResourcesCheck {
    thresholds: ResourceThresholds,
}

impl SystemResourcesCheck {
    pub fn new(thresholds: ResourceThresholds) -> Self {
        Self { thresholds }
    }
}

#[async_trait]
impl HealthCheck for SystemResourcesCheck {
    async fn check(&self) -> Result<CheckOutcome> {
        let (cpu, cores, load) = blocking(|| {
            let mut sys = System::new();
            sys.refresh_cpu();
            std::thread::sleep(CPU_SAMPLE_GAP);
            sys.refresh_cpu();
            let load = sys.load_average();
            (
                sys.global_cpu_info().cpu_usage() as f64,
                sys.cpus().len().max(1),
                load.one,
            )
        })
        .await?;

        let load_per_core = load / cores as f64;
        let status = self.thresholds.classify(cpu);
        let message = match status {
            HealthStatus::Healthy => format!("CPU usage normal ({:.1}%)", cpu),
            _ => format!("CPU usage high ({:.1}%)", cpu),
        };

        Ok(CheckOutcome::new(status, message)
            .with_detail("cpu_percent", cpu)
            .with_detail("cpu_count", cores)
            .with_detail("load_average_1m", load)
            .with_detail("load_per_core", load_per_core))
    }
}

// =============================================================================
// Disk space
// =============================================================================

/// Usage of the filesystem holding a path.
#[derive(Debug, Clone)]
pub struct DiskSpaceCheck {
    path: PathBuf,
    thresholds: ResourceThresholds,
}

impl DiskSpaceCheck {
    pub fn new(path: impl Into<PathBuf>, thresholds: ResourceThresholds) -> Self {
        Self {
            path: path.into(),
            thresholds,
        }
    }
}

/// Index of the mount point that is the longest prefix of `path`.
pub(crate) fn best_mount<'a>(path: &Path, mounts: impl IntoIterator<Item = &'a Path>) -> Option<usize> {
    mounts
        .into_iter()
        .enumerate()
        .filter(|(_, m)| path.starts_with(m))
        .max_by_key(|(_, m)| m.as_os_str().len())
        .map(|(i, _)| i)
}

#[async_trait]
impl HealthCheck for DiskSpaceCheck {
    async fn check(&self) -> Result<CheckOutcome> {
        let path = self.path.clone();
        let usage = blocking(move || {
            let mut sys = System::new();
            sys.refresh_disks_list();
            let disks = sys.disks();
            best_mount(&path, disks.iter().map(|d| d.mount_point())).map(|i| {
                let disk = &disks[i];
                (
                    disk.mount_point().display().to_string(),
                    disk.total_space(),
                    disk.available_space(),
                )
            })
        })
        .await?;

        let (mount, total, available) = usage.ok_or_else(|| {
            Error::HealthCheck(format!("no filesystem found for {}", self.path.display()))
        })?;

        let used_percent = percent(total.saturating_sub(available), total);
        let status = self.thresholds.classify(used_percent);
        let message = match status {
            HealthStatus::Healthy => format!("Disk usage normal ({:.1}%)", used_percent),
            HealthStatus::Degraded => format!("Disk space low ({:.1}% used)", used_percent),
            _ => format!("Disk space critical ({:.1}% used)", used_percent),
        };

        Ok(CheckOutcome::new(status, message)
            .with_detail("mount_point", mount)
            .with_detail("used_percent", used_percent)
            .with_detail("free_gb", available as f64 / BYTES_PER_GB)
            .with_detail("total_gb", total as f64 / BYTES_PER_GB))
    }
}

// =============================================================================
// Memory
// =============================================================================

/// RAM and swap utilisation.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheck {
    thresholds: ResourceThresholds,
}

impl MemoryCheck {
    pub fn new(thresholds: ResourceThresholds) -> Self {
        Self { thresholds }
    }
}

#[async_trait]
impl HealthCheck for MemoryCheck {
    async fn check(&self) -> Result<CheckOutcome> {
        let (used, total, swap_used, swap_total) = blocking(|| {
            let mut sys = System::new();
            sys.refresh_memory();
            (
                sys.used_memory(),
                sys.total_memory(),
                sys.used_swap(),
                sys.total_swap(),
            )
        })
        .await?;

        let memory_percent = percent(used, total);
        let swap_percent = percent(swap_used, swap_total);
        let status = HealthStatus::worst([
            self.thresholds.classify(memory_percent),
            self.thresholds.classify(swap_percent),
        ]);
        let message = match status {
            HealthStatus::Healthy => format!("Memory usage normal ({:.1}%)", memory_percent),
            _ => format!(
                "Memory pressure (memory {:.1}%, swap {:.1}%)",
                memory_percent, swap_percent
            ),
        };

        Ok(CheckOutcome::new(status, message)
            .with_detail("memory_percent", memory_percent)
            .with_detail("swap_percent", swap_percent)
            .with_detail("available_gb", total.saturating_sub(used) as f64 / BYTES_PER_GB))
    }
}

// =============================================================================
// Network connectivity
// =============================================================================

/// Bounded HTTP request against an external endpoint.
#[derive(Debug, Clone)]
pub struct NetworkConnectivityCheck {
    client: reqwest::Client,
    url: String,
}

impl NetworkConnectivityCheck {
    /// Build a check whose requests give up after `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl HealthCheck for NetworkConnectivityCheck {
    async fn check(&self) -> Result<CheckOutcome> {
        match self.client.get(&self.url).send().await {
            Ok(response) if response.status().is_success() => {
                Ok(CheckOutcome::healthy("Network connectivity OK")
                    .with_detail("status_code", response.status().as_u16()))
            }
            Ok(response) => Ok(CheckOutcome::degraded(format!(
                "Network check returned HTTP {}",
                response.status()
            ))
            .with_detail("status_code", response.status().as_u16())),
            Err(e) => Ok(CheckOutcome::unhealthy(format!(
                "Network connectivity failed: {}",
                e
            ))
            .with_detail("url", &self.url)),
        }
    }
}

// =============================================================================
// Process
// =============================================================================

/// Liveness and footprint of the current process.
#[derive(Debug, Clone, Default)]
pub struct ProcessCheck;

#[async_trait]
impl HealthCheck for ProcessCheck {
    async fn check(&self) -> Result<CheckOutcome> {
        let pid = sysinfo::get_current_pid().map_err(|e| Error::HealthCheck(e.to_string()))?;

        let snapshot = blocking(move || {
            let mut sys = System::new();
            sys.refresh_process(pid);
            sys.process(pid)
                .map(|p| (p.status(), p.memory(), p.cpu_usage(), p.run_time()))
        })
        .await?;

        let Some((status, memory, cpu, run_time)) = snapshot else {
            return Ok(CheckOutcome::unhealthy("Current process not found"));
        };

        let outcome = match status {
            ProcessStatus::Zombie | ProcessStatus::Dead => {
                CheckOutcome::unhealthy(format!("Process is {}", status))
            }
            _ => CheckOutcome::healthy("Process running normally"),
        };

        Ok(outcome
            .with_detail("pid", pid.to_string())
            .with_detail("state", status.to_string())
            .with_detail("memory_mb", memory as f64 / BYTES_PER_MB)
            .with_detail("cpu_percent", cpu)
            .with_detail("uptime_seconds", run_time))
    }
}

// =============================================================================
// Data integrity
// =============================================================================

/// Every `*.json` file directly under a directory must parse.
#[derive(Debug, Clone)]
pub struct DataIntegrityCheck {
    data_dir: PathBuf,
}

impl DataIntegrityCheck {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

#[async_trait]
impl HealthCheck for DataIntegrityCheck {
    async fn check(&self) -> Result<CheckOutcome> {
        let mut entries = match tokio::fs::read_dir(&self.data_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CheckOutcome::degraded(format!(
                    "Data directory {} does not exist",
                    self.data_dir.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let mut checked = 0usize;
        let mut corrupt = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            checked += 1;
            let raw = tokio::fs::read(&path).await?;
            if let Err(e) = serde_json::from_slice::<serde_json::Value>(&raw) {
                warn!(file = %path.display(), "Corrupt data file: {}", e);
                corrupt.push(path.display().to_string());
            }
        }

        corrupt.sort();
        let outcome = if corrupt.is_empty() {
            CheckOutcome::healthy(format!("{} data files valid", checked))
        } else {
            CheckOutcome::unhealthy(format!("{} corrupt data files", corrupt.len()))
                .with_detail("corrupt_files", &corrupt)
        };

        Ok(outcome.with_detail("files_checked", checked))
    }
}

// =============================================================================
// Log rotation
// =============================================================================

/// Flags oversized log files and an oversized log directory.
#[derive(Debug, Clone)]
pub struct LogRotationCheck {
    log_dir: PathBuf,
    max_file_bytes: u64,
    max_total_bytes: u64,
}

impl LogRotationCheck {
    pub fn new(log_dir: impl Into<PathBuf>, max_file_bytes: u64, max_total_bytes: u64) -> Self {
        Self {
            log_dir: log_dir.into(),
            max_file_bytes,
            max_total_bytes,
        }
    }
}

#[async_trait]
impl HealthCheck for LogRotationCheck {
    async fn check(&self) -> Result<CheckOutcome> {
        let mut entries = match tokio::fs::read_dir(&self.log_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CheckOutcome::healthy("No log directory"));
            }
            Err(e) => return Err(e.into()),
        };

        let mut total = 0u64;
        let mut files = 0usize;
        let mut oversized = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            files += 1;
            total += metadata.len();
            if metadata.len() > self.max_file_bytes {
                oversized.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        oversized.sort();
        let outcome = if total > self.max_total_bytes {
            CheckOutcome::unhealthy(format!(
                "Log directory too large ({:.1} MB)",
                total as f64 / BYTES_PER_MB
            ))
        } else if !oversized.is_empty() {
            CheckOutcome::degraded(format!("{} log files need rotation", oversized.len()))
                .with_detail("large_files", &oversized)
        } else {
            CheckOutcome::healthy("Log rotation OK")
        };

        Ok(outcome
            .with_detail("log_files", files)
            .with_detail("total_size_mb", total as f64 / BYTES_PER_MB))
    }
}

// =============================================================================
// Registration
// =============================================================================

/// Register every built-in check under its canonical name.
///
/// The network check is skipped when its HTTP client cannot be built.
pub fn register_builtin_checks(registry: &HealthCheckRegistry, config: &HealthConfig) {
    let thresholds = ResourceThresholds::from(config);

    registry.register("system_resources", SystemResourcesCheck::new(thresholds));
    registry.register(
        "disk_space",
        DiskSpaceCheck::new(config.disk_path.clone(), thresholds),
    );
    registry.register("memory", MemoryCheck::new(thresholds));

    match NetworkConnectivityCheck::new(&config.network_check_url, config.network_timeout()) {
        Ok(check) => registry.register("network_connectivity", check),
        Err(e) => warn!("Skipping network connectivity check: {}", e),
    }

    registry.register("process", ProcessCheck);
    registry.register("data_integrity", DataIntegrityCheck::new(config.data_dir.clone()));
    registry.register(
        "log_rotation",
        LogRotationCheck::new(
            config.log_dir.clone(),
            config.max_log_file_bytes,
            config.max_log_dir_bytes,
        ),
    );

    debug!(checks = registry.len(), "Built-in health checks registered");
}
