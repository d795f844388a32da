use burn::config::Config;
use serde::{Deserialize, Serialize};

use crate::{
    error::{self, Error},
    featurize::{TextFeaturizer, HASH_BITS},
    models::MulticlassTrainer,
};

use super::metrics::MulticlassMetrics;

/// The metric an experiment optimizes when comparing runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MulticlassMetric {
    /// Mean of the per-class accuracies
    MacroAccuracy,

    /// Fraction of rows predicted correctly
    MicroAccuracy,

    /// Mean negative log-likelihood of the true class
    LogLoss,

    /// Relative improvement of the log-loss over the class prior
    LogLossReduction,
}

impl MulticlassMetric {
    /// Read this metric from a set of evaluation results
    pub fn value(&self, metrics: &MulticlassMetrics) -> f64 {
        match self {
            MulticlassMetric::MacroAccuracy => metrics.macro_accuracy,
            MulticlassMetric::MicroAccuracy => metrics.micro_accuracy,
            MulticlassMetric::LogLoss => metrics.log_loss,
            MulticlassMetric::LogLossReduction => metrics.log_loss_reduction,
        }
    }

    /// Whether `candidate` beats `incumbent` on this metric
    pub fn is_better(&self, candidate: &MulticlassMetrics, incumbent: &MulticlassMetrics) -> bool {
        let (candidate, incumbent) = (self.value(candidate), self.value(incumbent));

        match self {
            MulticlassMetric::LogLoss => candidate < incumbent,
            _ => candidate > incumbent,
        }
    }
}

/// Define configuration struct for an AutoML experiment
#[derive(Config, Debug)]
pub struct ExperimentSettings {
    /// Wall-clock budget; no trial starts once it is spent
    pub max_experiment_time_secs: u64,

    /// Metric used to pick the best run
    #[config(default = "MulticlassMetric::MacroAccuracy")]
    pub optimizing_metric: MulticlassMetric,

    /// Trainers the experiment may try
    #[config(default = "MulticlassTrainer::ALL.to_vec()")]
    pub trainers: Vec<MulticlassTrainer>,

    /// Number of folds when cross-validating
    #[config(default = 5)]
    pub cross_validation_folds: usize,

    /// Above this many rows a 90/10 holdout split replaces cross-validation
    #[config(default = 15000)]
    pub cross_validation_row_limit: usize,

    /// Seed for shuffling, fold assignment and weight initialization
    #[config(default = 42)]
    pub seed: u64,

    /// Text featurization
    #[config(default = "TextFeaturizer::new()")]
    pub featurizer: TextFeaturizer,
}

impl ExperimentSettings {
    /// Remove a trainer from the candidates
    pub fn remove_trainer(&mut self, trainer: MulticlassTrainer) {
        self.trainers.retain(|t| *t != trainer);
    }

    /// Reject settings the experiment cannot run with
    pub fn validate(&self) -> error::Result<()> {
        if self.trainers.is_empty() {
            return Err(Error::InvalidSettings(
                "at least one trainer must be allowed".to_string(),
            ));
        }

        if self.cross_validation_folds < 2 {
            return Err(Error::InvalidSettings(format!(
                "cross-validation needs at least 2 folds, got {}",
                self.cross_validation_folds
            )));
        }

        if !HASH_BITS.contains(&self.featurizer.hash_bits) {
            return Err(Error::InvalidSettings(format!(
                "hash_bits must be within {HASH_BITS:?}, got {}",
                self.featurizer.hash_bits
            )));
        }

        Ok(())
    }
}
