//! Health Checks
//!
//! Named checks, run on demand by the host, with the latest result per check
//! retained for aggregation.

mod checks;
mod registry;
mod status;

pub use checks::{
    register_builtin_checks, DataIntegrityCheck, DiskSpaceCheck, LogRotationCheck, MemoryCheck,
    NetworkConnectivityCheck, ProcessCheck, ResourceThresholds, SystemResourcesCheck,
};
pub(crate) use checks::best_mount;
pub use registry::{FnCheck, HealthCheckRegistry, DEFAULT_CHECK_TIMEOUT};
pub use status::{CheckOutcome, HealthCheckResult, HealthStatus, HealthSummary};
