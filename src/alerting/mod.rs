//! Alerting
//!
//! Threshold rules over metric series, fired alerts and the engine that ties
//! them together.

mod alert;
mod engine;
mod rule;

pub use alert::{Alert, AlertStats};
pub use engine::{AlertEngine, DEFAULT_HISTORY_LIMIT};
pub use rule::{default_rules, AlertRule, AlertSeverity, Operator};
