/// Experiment settings and the optimizing metric
pub mod settings;

/// Multi-class evaluation metrics
pub mod metrics;

/// The time-boxed model search
pub mod experiment;

pub use experiment::{ExperimentResult, MulticlassExperiment, RunDetail, RunSummary};
pub use metrics::MulticlassMetrics;
pub use settings::{ExperimentSettings, MulticlassMetric};
