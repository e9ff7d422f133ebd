//! Budget and regression monitoring for metric series: live page timings,
//! build output sizes and Lighthouse scores.

pub mod bundle;
pub mod config;
pub mod dashboard;
pub mod history;
pub mod report;
pub mod runner;
pub mod series;
pub mod sources;
pub mod types;

pub use config::{Direction, RegressionThresholds, SeriesConfig, SeverityScale};
pub use history::History;
pub use report::MonitorReport;
pub use series::MetricSeriesMonitor;
pub use sources::{HttpProbeSource, LighthouseReportSource, Measurement, MeasurementError};
pub use types::{Evaluation, MetricSample, Regression, RegressionLevel, Severity, Status, Violation};
