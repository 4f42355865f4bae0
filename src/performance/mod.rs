//! Performance Analysis
//!
//! Baselines, scoring, violations and recommendations over the live metric
//! windows, plus the background report loop.

mod analyzer;
mod baseline;

pub use analyzer::{
    MetricPerformance, PerformanceAnalyzer, PerformanceReport, Recommendation, Violation,
    DEFAULT_ANALYSIS_WINDOW, DEFAULT_REPORT_HISTORY,
};
pub use baseline::{default_baselines, parse_baselines, PerformanceBaseline, ViolationSeverity};
