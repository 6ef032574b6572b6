pub mod recorder;
pub mod report;

pub use recorder::OrchestratorMetrics;
pub use report::MetricsSnapshot;
