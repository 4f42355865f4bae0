//! Health Check Registry
//!
//! Name → check registry. Running a check is the single fault boundary of the
//! health subsystem: an `Err`, a panic or a timeout inside a check all become
//! an `unhealthy` result and never reach the caller.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::RwLock;
use tracing::{debug, instrument, warn};

use super::checks::register_builtin_checks;
use super::status::{CheckOutcome, HealthCheckResult, HealthStatus, HealthSummary};
use crate::adapters::Notifier;
use crate::config::HealthConfig;
use crate::domain::events::{NotificationCategory, NotificationSeverity};
use crate::domain::ports::HealthCheck;
use crate::error::Result;

/// Upper bound on a single check when none is configured
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Adapter turning a plain function into a [`HealthCheck`].
pub struct FnCheck<F>(F);

#[async_trait]
impl<F> HealthCheck for FnCheck<F>
where
    F: Fn() -> Result<CheckOutcome> + Send + Sync,
{
    async fn check(&self) -> Result<CheckOutcome> {
        (self.0)()
    }
}

/// Registry of named health checks and their latest results.
pub struct HealthCheckRegistry {
    checks: RwLock<Vec<(String, Arc<dyn HealthCheck>)>>,
    results: DashMap<String, HealthCheckResult>,
    notifier: Notifier,
    check_timeout: Duration,
}

impl HealthCheckRegistry {
    /// Create an empty registry.
    pub fn new(notifier: Notifier, check_timeout: Duration) -> Self {
        let check_timeout = if check_timeout.is_zero() {
            DEFAULT_CHECK_TIMEOUT
        } else {
            check_timeout
        };

        Self {
            checks: RwLock::new(Vec::new()),
            results: DashMap::new(),
            notifier,
            check_timeout,
        }
    }

    /// Create a registry with the built-in checks pre-registered.
    pub fn with_builtin_checks(config: &HealthConfig, notifier: Notifier) -> Self {
        let registry = Self::new(notifier, config.check_timeout());
        register_builtin_checks(&registry, config);
        registry
    }

    /// Register a check. Re-registering a name replaces the check in place,
    /// keeping its position in the run order.
    pub fn register(&self, name: impl Into<String>, check: impl HealthCheck + 'static) {
        self.register_arc(name, Arc::new(check));
    }

    pub fn register_arc(&self, name: impl Into<String>, check: Arc<dyn HealthCheck>) {
        let name = name.into();
        let mut checks = self.checks.write();

        match checks.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = check,
            None => checks.push((name.clone(), check)),
        }
        debug!(check = %name, "Health check registered");
    }

    /// Register a synchronous check function.
    pub fn register_fn<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn() -> Result<CheckOutcome> + Send + Sync + 'static,
    {
        self.register(name, FnCheck(f));
    }

    /// Remove a check and its last result.
    pub fn unregister(&self, name: &str) -> bool {
        let mut checks = self.checks.write();
        let before = checks.len();
        checks.retain(|(n, _)| n != name);
        self.results.remove(name);
        checks.len() != before
    }

    /// Registered names in run order.
    pub fn check_names(&self) -> Vec<String> {
        self.checks.read().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.checks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.read().is_empty()
    }

    // -------------------------------------------------------------------------
    // Running
    // -------------------------------------------------------------------------

    /// Run one check by name. `None` if no such check is registered.
    ///
    /// May block on network or file I/O for up to the configured timeout.
    #[instrument(skip(self))]
    pub async fn run(&self, name: &str) -> Option<HealthCheckResult> {
        let check = self
            .checks
            .read()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| Arc::clone(c))?;

        Some(self.execute(name, check).await)
    }

    /// Run every check sequentially in registration order.
    pub async fn run_all(&self) -> Vec<HealthCheckResult> {
        let checks: Vec<(String, Arc<dyn HealthCheck>)> = self
            .checks
            .read()
            .iter()
            .map(|(n, c)| (n.clone(), Arc::clone(c)))
            .collect();

        let mut results = Vec::with_capacity(checks.len());
        for (name, check) in checks {
            results.push(self.execute(&name, check).await);
        }
        results
    }

    async fn execute(&self, name: &str, check: Arc<dyn HealthCheck>) -> HealthCheckResult {
        let start = Instant::now();

        let guarded = AssertUnwindSafe(check.check()).catch_unwind();
        let outcome = match tokio::time::timeout(self.check_timeout, guarded).await {
            Ok(Ok(Ok(outcome))) => outcome,
            Ok(Ok(Err(e))) => CheckOutcome::unhealthy(format!("Health check failed: {}", e)),
            Ok(Err(panic)) => CheckOutcome::unhealthy(format!(
                "Health check panicked: {}",
                panic_message(panic.as_ref())
            )),
            Err(_) => CheckOutcome::unhealthy(format!(
                "Health check timed out after {:?}",
                self.check_timeout
            )),
        };

        let result = HealthCheckResult::from_outcome(name, outcome, start.elapsed());
        self.record(result.clone());
        result
    }

    fn record(&self, result: HealthCheckResult) {
        let severity = match result.status {
            HealthStatus::Degraded => Some(NotificationSeverity::Normal),
            HealthStatus::Unhealthy => Some(NotificationSeverity::High),
            HealthStatus::Healthy | HealthStatus::Unknown => None,
        };

        if let Some(severity) = severity {
            warn!(
                check = %result.name,
                status = %result.status,
                "Health check reported: {}",
                result.message
            );
            self.notifier.notify(
                NotificationCategory::HealthCheckFailed,
                serde_json::json!({
                    "check": &result.name,
                    "status": result.status,
                    "message": &result.message,
                    "details": &result.details,
                }),
                severity,
                "health_registry",
            );
        } else {
            debug!(check = %result.name, duration_ms = result.duration_ms, "Health check passed");
        }

        self.results.insert(result.name.clone(), result);
    }

    // -------------------------------------------------------------------------
    // Results
    // -------------------------------------------------------------------------

    /// Latest result for `name`.
    pub fn latest(&self, name: &str) -> Option<HealthCheckResult> {
        self.results.get(name).map(|r| r.clone())
    }

    /// Latest result of every check that has run, in registration order.
    pub fn results(&self) -> Vec<HealthCheckResult> {
        self.checks
            .read()
            .iter()
            .filter_map(|(name, _)| self.latest(name))
            .collect()
    }

    /// Worst latest status; `Unknown` before any check has run.
    pub fn overall_status(&self) -> HealthStatus {
        HealthStatus::worst(self.results.iter().map(|r| r.status))
    }

    pub fn summary(&self) -> HealthSummary {
        HealthSummary::from_results(self.results())
    }
}

impl std::fmt::Debug for HealthCheckRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthCheckRegistry")
            .field("checks", &self.check_names())
            .field("check_timeout", &self.check_timeout)
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn registry() -> HealthCheckRegistry {
        HealthCheckRegistry::new(Notifier::disabled(), Duration::from_secs(5))
    }

    struct SlowCheck;

    #[async_trait]
    impl HealthCheck for SlowCheck {
        async fn check(&self) -> Result<CheckOutcome> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(CheckOutcome::healthy("eventually"))
        }
    }

    struct PanickingCheck;

    #[async_trait]
    impl HealthCheck for PanickingCheck {
        async fn check(&self) -> Result<CheckOutcome> {
            panic!("index out of bounds")
        }
    }

    #[tokio::test]
    async fn test_overall_unknown_before_runs() {
        let registry = registry();
        registry.register_fn("ok", || Ok(CheckOutcome::healthy("fine")));

        assert_eq!(registry.overall_status(), HealthStatus::Unknown);
        assert!(registry.results().is_empty());
    }

    #[tokio::test]
    async fn test_run_records_latest_result() {
        let registry = registry();
        registry.register_fn("ok", || {
            Ok(CheckOutcome::healthy("fine").with_detail("checked", 3))
        });

        let result = registry.run("ok").await.unwrap();
        assert_eq!(result.status, HealthStatus::Healthy);
        assert_eq!(result.message, "fine");
        assert_eq!(registry.latest("ok").unwrap().status, HealthStatus::Healthy);
        assert_eq!(registry.overall_status(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_run_unknown_name() {
        let registry = registry();
        assert!(registry.run("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_error_becomes_unhealthy() {
        let registry = registry();
        registry.register_fn("db", || Err(Error::HealthCheck("connection refused".into())));

        let result = registry.run("db").await.unwrap();
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.message.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_panic_becomes_unhealthy() {
        let registry = registry();
        registry.register("panicky", PanickingCheck);

        let result = registry.run("panicky").await.unwrap();
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.message.contains("index out of bounds"));
    }

    #[tokio::test]
    async fn test_timeout_becomes_unhealthy() {
        let registry = HealthCheckRegistry::new(Notifier::disabled(), Duration::from_millis(20));
        registry.register("slow", SlowCheck);

        let result = registry.run("slow").await.unwrap();
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_run_all_in_registration_order_and_worst_status() {
        let registry = registry();
        registry.register_fn("c", || Ok(CheckOutcome::healthy("ok")));
        registry.register_fn("a", || Ok(CheckOutcome::degraded("slow")));
        registry.register_fn("b", || Ok(CheckOutcome::healthy("ok")));

        let results = registry.run_all().await;
        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
        assert_eq!(registry.overall_status(), HealthStatus::Degraded);

        registry.register_fn("a", || Ok(CheckOutcome::unhealthy("down")));
        registry.run_all().await;
        assert_eq!(registry.check_names(), vec!["c", "a", "b"]);
        assert_eq!(registry.overall_status(), HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_failures_publish_notifications() {
        let (notifier, mut rx) = Notifier::channel(8);
        let registry = HealthCheckRegistry::new(notifier, Duration::from_secs(5));
        registry.register_fn("ok", || Ok(CheckOutcome::healthy("fine")));
        registry.register_fn("slow", || Ok(CheckOutcome::degraded("slow")));
        registry.register_fn("down", || Ok(CheckOutcome::unhealthy("down")));

        registry.run_all().await;

        let first = rx.try_recv().unwrap();
        assert_eq!(first.category, NotificationCategory::HealthCheckFailed);
        assert_eq!(first.severity, NotificationSeverity::Normal);
        assert_eq!(first.payload["check"], "slow");

        let second = rx.try_recv().unwrap();
        assert_eq!(second.severity, NotificationSeverity::High);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregister() {
        let registry = registry();
        registry.register_fn("tmp", || Ok(CheckOutcome::unhealthy("bad")));
        registry.run("tmp").await;

        assert!(registry.unregister("tmp"));
        assert!(!registry.unregister("tmp"));
        assert!(registry.latest("tmp").is_none());
        assert_eq!(registry.overall_status(), HealthStatus::Unknown);
    }

    #[tokio::test]
    async fn test_summary() {
        let registry = registry();
        registry.register_fn("a", || Ok(CheckOutcome::healthy("ok")));
        registry.register_fn("b", || Ok(CheckOutcome::unhealthy("down")));
        registry.run_all().await;

        let summary = registry.summary();
        assert_eq!(summary.total_checks, 2);
        assert_eq!(summary.unhealthy, 1);
        assert_eq!(summary.overall_status, HealthStatus::Unhealthy);
    }
}
