//! Monthly epidemiological indicators over the case table.
//!
//! Every indicator is evaluated on the *last complete month*: month groups are
//! ordered newest first and the newest one is discarded because it is still
//! accumulating notifications.

pub mod engine;
pub mod result;
pub mod window;

pub use engine::MetricsEngine;
pub use result::{GrowthRate, Indicator, MetricResult, MetricsReport, MonthlyRate};
pub use window::YearMonth;
